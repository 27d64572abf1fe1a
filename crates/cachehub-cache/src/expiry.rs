//! TTL resolution.
//!
//! Turns a [`Ttl`] into an absolute expiry instant, and derives the relative
//! seconds that remote wire protocols expect.

use std::time::Duration;

use chrono::{DateTime, Months, Utc};

use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;
use cachehub_core::types::Ttl;

/// Expiry as sent to a backend that takes relative seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteExpiry {
    /// Store without an expiry.
    Persist,
    /// Expire after this many seconds (at least one).
    Seconds(u64),
    /// The requested instant is not in the future.
    AlreadyExpired,
}

/// Resolve `ttl` against `now`.
///
/// Returns `None` for "never expires".
pub fn resolve(ttl: &Ttl, now: DateTime<Utc>) -> CacheResult<Option<DateTime<Utc>>> {
    match ttl {
        Ttl::Never => Ok(None),
        Ttl::After(duration) => add_duration(now, *duration).map(Some),
        Ttl::At(instant) => Ok(Some(*instant)),
        Ttl::Phrase(phrase) => parse_phrase(phrase, now),
    }
}

/// Resolve `ttl` for a backend that only understands relative seconds.
///
/// "Never" is replaced by `default` so the wire protocol never sees an
/// unintended infinite TTL; a zero `default` means the backend's own
/// no-expiry.
pub fn remote_expiry(ttl: &Ttl, now: DateTime<Utc>, default: Duration) -> CacheResult<RemoteExpiry> {
    let instant = match resolve(ttl, now)? {
        Some(instant) => instant,
        None if default.is_zero() => return Ok(RemoteExpiry::Persist),
        None => add_duration(now, default)?,
    };
    let remaining = (instant - now).num_milliseconds();
    if remaining <= 0 {
        return Ok(RemoteExpiry::AlreadyExpired);
    }
    // round up so sub-second remainders still get a live entry
    let secs = (remaining as u64).div_ceil(1000);
    Ok(RemoteExpiry::Seconds(secs))
}

/// Whether an entry with `expires_at` is still live at `now`.
pub fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_none_or(|at| at > now)
}

fn add_duration(now: DateTime<Utc>, duration: Duration) -> CacheResult<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| CacheError::invalid_ttl(format!("TTL {duration:?} is out of range")))
}

/// Parse a relative phrase such as `"+1 hour"`, `"2 days 6 hours"`, `"90"`,
/// `"-5 minutes"`, `"never"`, or an RFC 3339 timestamp.
fn parse_phrase(phrase: &str, now: DateTime<Utc>) -> CacheResult<Option<DateTime<Utc>>> {
    let text = phrase.trim();
    let lowered = text.to_ascii_lowercase();
    if matches!(lowered.as_str(), "" | "0" | "never" | "none") {
        return Ok(None);
    }
    if lowered == "now" {
        return Ok(Some(now));
    }
    if let Ok(absolute) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(absolute.with_timezone(&Utc)));
    }

    let (negative, body) = match lowered.as_bytes()[0] {
        b'+' => (false, lowered[1..].trim_start()),
        b'-' => (true, lowered[1..].trim_start()),
        _ => (false, lowered.as_str()),
    };

    if let Ok(secs) = body.parse::<u64>() {
        let secs = i64::try_from(secs).map_err(|_| invalid(phrase))?;
        return shift(now, secs, Unit::Second, negative).map(Some);
    }

    let tokens = split_tokens(body);
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(invalid(phrase));
    }

    let mut instant = now;
    for pair in tokens.chunks(2) {
        let amount: i64 = pair[0].parse().map_err(|_| invalid(phrase))?;
        let unit = Unit::parse(pair[1]).ok_or_else(|| invalid(phrase))?;
        instant = shift(instant, amount, unit, negative)?;
    }
    Ok(Some(instant))
}

/// Split `"2days 6 hours"` into `["2", "days", "6", "hours"]`.
fn split_tokens(body: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for word in body.split_whitespace() {
        let split = word
            .find(|c: char| !c.is_ascii_digit())
            .filter(|&i| i > 0)
            .unwrap_or(word.len());
        let (digits, rest) = word.split_at(split);
        tokens.push(digits);
        if !rest.is_empty() {
            tokens.push(rest);
        }
    }
    tokens
}

fn invalid(phrase: &str) -> CacheError {
    CacheError::invalid_ttl(format!("Cannot interpret TTL phrase '{phrase}'"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn parse(word: &str) -> Option<Self> {
        let unit = match word.trim_end_matches(',') {
            "s" | "sec" | "secs" | "second" | "seconds" => Self::Second,
            "m" | "min" | "mins" | "minute" | "minutes" => Self::Minute,
            "h" | "hr" | "hrs" | "hour" | "hours" => Self::Hour,
            "d" | "day" | "days" => Self::Day,
            "w" | "week" | "weeks" => Self::Week,
            "month" | "months" => Self::Month,
            "y" | "year" | "years" => Self::Year,
            _ => return None,
        };
        Some(unit)
    }

    fn seconds(self) -> Option<i64> {
        match self {
            Self::Second => Some(1),
            Self::Minute => Some(60),
            Self::Hour => Some(3_600),
            Self::Day => Some(86_400),
            Self::Week => Some(604_800),
            Self::Month | Self::Year => None,
        }
    }
}

fn shift(from: DateTime<Utc>, amount: i64, unit: Unit, negative: bool) -> CacheResult<DateTime<Utc>> {
    let out_of_range = || CacheError::invalid_ttl(format!("TTL of {amount} {unit:?} is out of range"));
    match unit.seconds() {
        Some(per_unit) => {
            let secs = amount.checked_mul(per_unit).ok_or_else(out_of_range)?;
            let delta = chrono::Duration::try_seconds(if negative { -secs } else { secs })
                .ok_or_else(out_of_range)?;
            from.checked_add_signed(delta).ok_or_else(out_of_range)
        }
        None => {
            let months = if unit == Unit::Year { amount.checked_mul(12) } else { Some(amount) };
            let months = months
                .and_then(|m| u32::try_from(m).ok())
                .map(Months::new)
                .ok_or_else(out_of_range)?;
            let shifted = if negative {
                from.checked_sub_months(months)
            } else {
                from.checked_add_months(months)
            };
            shifted.ok_or_else(out_of_range)
        }
    }
}
