//! In-process storage engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use cachehub_core::config::engine::MemoryEngineConfig;
use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;
use cachehub_core::traits::clock::{Clock, SystemClock};
use cachehub_core::traits::engine::{EngineCapabilities, StorageEngine};
use cachehub_core::types::{SerializationMode, Ttl, Value};

use crate::codec::{self, ValueCodec};
use crate::expiry;
use crate::keys::KeyCodec;

/// Stored form of a value.
#[derive(Debug, Clone)]
enum Payload {
    /// Kept as-is (passthrough mode).
    Native(Value),
    /// Passed through the value codec.
    Encoded(Vec<u8>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: Payload,
    expires_at: Option<DateTime<Utc>>,
    written_at: DateTime<Utc>,
}

impl MemoryEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        expiry::is_live(self.expires_at, now)
    }
}

/// Storage engine backed by a map owned by this instance.
///
/// Entries expire lazily: an expired entry is dropped the next time it is
/// read. Counters update under the map's per-key entry lock.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    /// Entries keyed by physical key.
    entries: Arc<DashMap<String, MemoryEntry>>,
    /// Key namespacing.
    keys: KeyCodec,
    /// Value codec for non-passthrough modes.
    codec: ValueCodec,
    /// Serialization policy.
    mode: SerializationMode,
    /// Expiry applied to counters created from nothing.
    default_ttl: Duration,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl MemoryEngine {
    /// Create a memory engine for the storage `name`.
    pub fn new(name: &str, config: &MemoryEngineConfig) -> CacheResult<Self> {
        let keys = KeyCodec::new(config.prefix.as_deref().unwrap_or(name))?;
        Ok(Self {
            entries: Arc::new(DashMap::new()),
            keys,
            codec: ValueCodec::from_config(&config.codec),
            mode: config.serialization.unwrap_or(SerializationMode::Passthrough),
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn encode(&self, value: &Value) -> CacheResult<Payload> {
        match self.mode {
            SerializationMode::Passthrough => Ok(Payload::Native(value.clone())),
            mode => self.codec.encode_stored(mode, value).map(Payload::Encoded),
        }
    }

    fn decode(&self, payload: Payload) -> CacheResult<Value> {
        match payload {
            Payload::Native(value) => Ok(value),
            Payload::Encoded(bytes) => self.codec.decode_stored(self.mode, &bytes),
        }
    }

    /// Fetch the payload of a live entry, dropping it if it has expired.
    fn live_payload(&self, full_key: &str, now: DateTime<Utc>) -> Option<Payload> {
        let found = self
            .entries
            .get(full_key)
            .map(|entry| entry.is_live(now).then(|| entry.payload.clone()));
        match found {
            Some(Some(payload)) => Some(payload),
            Some(None) => {
                self.entries.remove_if(full_key, |_, entry| !entry.is_live(now));
                debug!(key = full_key, "Dropped expired entry");
                None
            }
            None => None,
        }
    }

    fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let full_key = self.keys.physical_key(key);
        let now = self.clock.now();

        match self.entries.entry(full_key) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let current = codec::counter_value(&self.decode(occupied.get().payload.clone())?)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::codec(format!("Counter '{key}' would overflow")))?;
                let payload = self.encode(&Value::from(next))?;
                let entry = occupied.get_mut();
                entry.payload = payload;
                entry.written_at = now;
                Ok(Some(next))
            }
            Entry::Occupied(mut occupied) => {
                let entry = self.fresh_counter(delta, now)?;
                occupied.insert(entry);
                Ok(Some(delta))
            }
            Entry::Vacant(vacant) => {
                let entry = self.fresh_counter(delta, now)?;
                vacant.insert(entry);
                Ok(Some(delta))
            }
        }
    }

    fn fresh_counter(&self, value: i64, now: DateTime<Utc>) -> CacheResult<MemoryEntry> {
        let expires_at = expiry::resolve(&Ttl::from(Some(self.default_ttl).filter(|d| !d.is_zero())), now)?;
        Ok(MemoryEntry {
            payload: self.encode(&Value::from(value))?,
            expires_at,
            written_at: now,
        })
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn kind(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_native_exists: true,
            supports_flush_age: true,
            serialization: self.mode,
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let full_key = self.keys.physical_key(key);
        match self.live_payload(&full_key, self.clock.now()) {
            Some(payload) => self.decode(payload).map(Some),
            None => Ok(None),
        }
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.keys.physical_key(key);
        Ok(self.live_payload(&full_key, self.clock.now()).is_some())
    }

    async fn set(&self, key: &str, value: &Value, ttl: Ttl) -> bool {
        let now = self.clock.now();
        let expires_at = match expiry::resolve(&ttl, now) {
            Ok(at) => at,
            Err(e) => {
                warn!(key, error = %e, "Rejected cache write");
                return false;
            }
        };
        let payload = match self.encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache value");
                return false;
            }
        };
        self.entries.insert(
            self.keys.physical_key(key),
            MemoryEntry {
                payload,
                expires_at,
                written_at: now,
            },
        );
        true
    }

    async fn remove(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .remove(&self.keys.physical_key(key))
            .is_some_and(|(_, entry)| entry.is_live(now))
    }

    async fn increment(&self, key: &str, step: i64) -> CacheResult<Option<i64>> {
        self.adjust(key, step)
    }

    async fn decrement(&self, key: &str, step: i64) -> CacheResult<Option<i64>> {
        let delta = step
            .checked_neg()
            .ok_or_else(|| CacheError::codec(format!("Cannot decrement by {step}")))?;
        self.adjust(key, delta)
    }

    async fn flush(&self, older_than: Option<DateTime<Utc>>) -> bool {
        let before = self.entries.len();
        match older_than {
            Some(cutoff) => self.entries.retain(|_, entry| entry.written_at >= cutoff),
            None => self.entries.clear(),
        }
        debug!(
            prefix = self.keys.prefix(),
            removed = before.saturating_sub(self.entries.len()),
            "Flushed memory engine"
        );
        true
    }
}
