//! On-disk record format: `"{expiresAtEpochSeconds}|{payload}"`.
//!
//! An epoch of `0` means the record never expires. There is no trailing
//! newline; the payload runs to the end of the file.

use chrono::{DateTime, Utc};

use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;

const SEPARATOR: u8 = b'|';

/// A parsed cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    /// Expiry instant, `None` for never.
    pub expires_at: Option<DateTime<Utc>>,
    /// Encoded payload.
    pub payload: &'a [u8],
}

/// Parse file contents.
///
/// A missing separator or a non-numeric expiry field means the file is
/// corrupt and yields a codec error.
pub fn parse(bytes: &[u8]) -> CacheResult<Record<'_>> {
    let split = bytes
        .iter()
        .position(|b| *b == SEPARATOR)
        .ok_or_else(|| CacheError::codec("Cache record has no expiry separator"))?;
    let (head, rest) = bytes.split_at(split);

    if head.is_empty() || !head.iter().all(u8::is_ascii_digit) {
        return Err(CacheError::codec(format!(
            "Cache record has a malformed expiry field: {:?}",
            String::from_utf8_lossy(head)
        )));
    }
    let epoch: i64 = std::str::from_utf8(head)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CacheError::codec("Cache record expiry is out of range"))?;

    let expires_at = match epoch {
        0 => None,
        secs => Some(
            DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| CacheError::codec(format!("Cache record expiry {secs} is out of range")))?,
        ),
    };

    Ok(Record {
        expires_at,
        payload: &rest[1..],
    })
}

/// Render file contents.
///
/// Sub-second precision is rounded up so an entry never expires early.
pub fn render(expires_at: Option<DateTime<Utc>>, payload: &[u8]) -> Vec<u8> {
    let epoch = expires_at.map_or(0, |at| {
        let secs = at.timestamp();
        let secs = if at.timestamp_subsec_nanos() > 0 { secs + 1 } else { secs };
        secs.max(1)
    });
    let head = epoch.to_string();
    let mut out = Vec::with_capacity(head.len() + 1 + payload.len());
    out.extend_from_slice(head.as_bytes());
    out.push(SEPARATOR);
    out.extend_from_slice(payload);
    out
}
