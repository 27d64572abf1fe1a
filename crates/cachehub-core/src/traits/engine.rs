//! Storage engine trait for pluggable cache backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::result::CacheResult;
use crate::types::{SerializationMode, Ttl, Value};

/// Static facts about an engine, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineCapabilities {
    /// The backend has a dedicated existence check. When `false`, `has` is
    /// answered with a fetch.
    pub supports_native_exists: bool,
    /// `flush` honours the `older_than` cutoff.
    pub supports_flush_age: bool,
    /// Which values pass through the value codec.
    pub serialization: SerializationMode,
}

/// Trait for cache backends (memory, filesystem, Memcached, Redis,
/// shared-segment caches).
///
/// Every engine namespaces its keys with its own prefix and enforces TTLs,
/// lazily if the backend cannot expire entries itself. Transient backend
/// failures never surface as errors: writes report `false` and reads report a
/// miss. Errors are reserved for payloads that cannot be decoded.
#[async_trait]
pub trait StorageEngine: Send + Sync + std::fmt::Debug + 'static {
    /// Short backend name (e.g., `"memory"`, `"redis"`).
    fn kind(&self) -> &str;

    /// Capabilities of this engine.
    fn capabilities(&self) -> EngineCapabilities;

    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Check whether a key holds a live entry. Agrees with [`get`](Self::get).
    async fn has(&self, key: &str) -> CacheResult<bool>;

    /// Write a value, replacing any existing entry. Returns `false` on failure.
    async fn set(&self, key: &str, value: &Value, ttl: Ttl) -> bool;

    /// Delete a key. Returns whether an entry was removed.
    async fn remove(&self, key: &str) -> bool;

    /// Add `step` to an integer entry, treating a missing key as zero.
    /// Returns the new value, or `None` if the backend failed.
    async fn increment(&self, key: &str, step: i64) -> CacheResult<Option<i64>>;

    /// Subtract `step` from an integer entry, treating a missing key as zero.
    async fn decrement(&self, key: &str, step: i64) -> CacheResult<Option<i64>>;

    /// Remove every entry in this engine's namespace, or only the entries last
    /// written before `older_than` when the engine supports age filtering.
    async fn flush(&self, older_than: Option<DateTime<Utc>>) -> bool;
}
