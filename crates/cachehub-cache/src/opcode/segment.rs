//! Process-shared key/value segment capability.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use cachehub_core::config::engine::AdminCredentials;
use cachehub_core::traits::clock::{Clock, SystemClock};

use crate::codec;
use crate::expiry;

/// Failure reported by a segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    /// Arithmetic on a value that is not plain decimal text.
    #[error("stored value is not numeric")]
    NotNumeric,
    /// Key enumeration refused the supplied credentials.
    #[error("administrator credentials rejected")]
    AccessDenied,
    /// The result does not fit in an `i64`.
    #[error("counter overflow")]
    Overflow,
}

/// A key/value store shared by every engine in the process, with native TTL.
///
/// Implementations are synchronous and must be safe to call from any task.
pub trait SharedSegment: Send + Sync + std::fmt::Debug + 'static {
    /// Data of a live key.
    fn fetch(&self, key: &str) -> Option<Vec<u8>>;

    /// Whether a live key exists.
    fn exists(&self, key: &str) -> bool;

    /// Store unconditionally. `ttl` of `None` never expires.
    fn store(&self, key: &str, data: Vec<u8>, ttl: Option<Duration>) -> bool;

    /// Store only if no live key exists.
    fn add(&self, key: &str, data: Vec<u8>, ttl: Option<Duration>) -> bool;

    /// Delete a key; `false` if it was absent.
    fn delete(&self, key: &str) -> bool;

    /// Add `delta` to a live integer key, keeping its TTL. `Ok(None)` if absent.
    fn adjust(&self, key: &str, delta: i64) -> Result<Option<i64>, SegmentError>;

    /// Enumerate live keys.
    fn keys(&self, credentials: Option<&AdminCredentials>) -> Result<Vec<String>, SegmentError>;
}

#[derive(Debug, Clone)]
struct Slot {
    data: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process segment backed by a concurrent map.
///
/// Clones share the same storage. When `admin` is set, key enumeration
/// requires matching credentials.
#[derive(Debug, Clone)]
pub struct LocalSegment {
    slots: Arc<DashMap<String, Slot>>,
    admin: Option<AdminCredentials>,
    clock: Arc<dyn Clock>,
}

impl Default for LocalSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSegment {
    /// Create an empty segment with open key enumeration.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            admin: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Require `admin` for key enumeration.
    pub fn with_admin(mut self, admin: AdminCredentials) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn slot(&self, data: Vec<u8>, ttl: Option<Duration>) -> Slot {
        let now = self.clock.now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));
        Slot { data, expires_at }
    }
}

impl SharedSegment for LocalSegment {
    fn fetch(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let found = self
            .slots
            .get(key)
            .map(|slot| expiry::is_live(slot.expires_at, now).then(|| slot.data.clone()));
        if let Some(None) = found {
            self.slots
                .remove_if(key, |_, slot| !expiry::is_live(slot.expires_at, now));
        }
        found.flatten()
    }

    fn exists(&self, key: &str) -> bool {
        self.fetch(key).is_some()
    }

    fn store(&self, key: &str, data: Vec<u8>, ttl: Option<Duration>) -> bool {
        self.slots.insert(key.to_string(), self.slot(data, ttl));
        true
    }

    fn add(&self, key: &str, data: Vec<u8>, ttl: Option<Duration>) -> bool {
        let now = self.clock.now();
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if expiry::is_live(occupied.get().expires_at, now) {
                    return false;
                }
                occupied.insert(self.slot(data, ttl));
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.slot(data, ttl));
                true
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.slots
            .remove(key)
            .is_some_and(|(_, slot)| expiry::is_live(slot.expires_at, now))
    }

    fn adjust(&self, key: &str, delta: i64) -> Result<Option<i64>, SegmentError> {
        let now = self.clock.now();
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Ok(None);
        };
        if !expiry::is_live(slot.expires_at, now) {
            drop(slot);
            self.slots
                .remove_if(key, |_, slot| !expiry::is_live(slot.expires_at, now));
            return Ok(None);
        }
        let current = codec::parse_integer(&slot.data).ok_or(SegmentError::NotNumeric)?;
        let next = current.checked_add(delta).ok_or(SegmentError::Overflow)?;
        slot.data = next.to_string().into_bytes();
        Ok(Some(next))
    }

    fn keys(&self, credentials: Option<&AdminCredentials>) -> Result<Vec<String>, SegmentError> {
        if let Some(admin) = &self.admin {
            if credentials != Some(admin) {
                return Err(SegmentError::AccessDenied);
            }
        }
        let now = self.clock.now();
        Ok(self
            .slots
            .iter()
            .filter(|slot| expiry::is_live(slot.expires_at, now))
            .map(|slot| slot.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use cachehub_core::traits::clock::ManualClock;

    use super::*;

    #[test]
    fn test_native_ttl() {
        let clock = Arc::new(ManualClock::starting_now());
        let segment = LocalSegment::new().with_clock(clock.clone());

        segment.store("a", b"1".to_vec(), Some(Duration::from_secs(10)));
        assert!(segment.exists("a"));
        clock.advance(Duration::from_secs(11));
        assert_eq!(segment.fetch("a"), None);
        assert!(segment.add("a", b"2".to_vec(), None));
        assert!(!segment.add("a", b"3".to_vec(), None));
    }

    #[test]
    fn test_adjust() {
        let segment = LocalSegment::new();
        assert_eq!(segment.adjust("n", 1), Ok(None));
        segment.store("n", b"41".to_vec(), None);
        assert_eq!(segment.adjust("n", 1), Ok(Some(42)));
        segment.store("s", b"\"text\"".to_vec(), None);
        assert_eq!(segment.adjust("s", 1), Err(SegmentError::NotNumeric));
    }

    #[test]
    fn test_keys_require_admin_when_configured() {
        let admin = AdminCredentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        let segment = LocalSegment::new().with_admin(admin.clone());
        segment.store("k", Vec::new(), None);

        assert_eq!(segment.keys(None), Err(SegmentError::AccessDenied));
        assert_eq!(segment.keys(Some(&admin)).unwrap(), vec!["k".to_string()]);
    }
}
