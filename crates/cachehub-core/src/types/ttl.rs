//! Time-to-live input types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How long a cache entry should live.
///
/// Engines resolve a `Ttl` into an absolute expiry instant (or no expiry)
/// at write time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ttl {
    /// The entry never expires (remote engines substitute their default TTL).
    #[default]
    Never,
    /// The entry expires this long after the write.
    After(Duration),
    /// The entry expires at this instant.
    At(DateTime<Utc>),
    /// A relative phrase such as `"+1 hour"` or `"2 days 6 hours"`, parsed
    /// against the write time.
    Phrase(String),
}

impl Ttl {
    /// A TTL of `secs` seconds from now.
    pub fn seconds(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    /// A relative-duration phrase.
    pub fn phrase(phrase: impl Into<String>) -> Self {
        Self::Phrase(phrase.into())
    }

    /// Whether this TTL means "no expiry".
    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

impl From<Duration> for Ttl {
    fn from(value: Duration) -> Self {
        Self::After(value)
    }
}

impl From<DateTime<Utc>> for Ttl {
    fn from(value: DateTime<Utc>) -> Self {
        Self::At(value)
    }
}

impl From<&str> for Ttl {
    fn from(value: &str) -> Self {
        Self::Phrase(value.to_string())
    }
}

impl From<Option<Duration>> for Ttl {
    /// `None` means no expiry.
    fn from(value: Option<Duration>) -> Self {
        value.map_or(Self::Never, Self::After)
    }
}
