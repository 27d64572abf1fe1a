//! Redis storage engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::RedisError;
use tracing::{debug, warn};

use cachehub_core::config::engine::RedisEngineConfig;
use cachehub_core::error::{CacheError, ErrorKind};
use cachehub_core::result::CacheResult;
use cachehub_core::traits::clock::{Clock, SystemClock};
use cachehub_core::traits::engine::{EngineCapabilities, StorageEngine};
use cachehub_core::types::{SerializationMode, Ttl, Value};

use super::client::RedisClient;
use crate::codec::ValueCodec;
use crate::expiry::{self, RemoteExpiry};
use crate::keys::KeyCodec;

/// Keys requested per `SCAN` round trip during a flush.
const SCAN_BATCH: usize = 500;

/// Redis-backed storage engine.
#[derive(Debug, Clone)]
pub struct RedisEngine {
    /// Redis client.
    client: RedisClient,
    /// Key namespacing.
    keys: KeyCodec,
    /// Payload codec.
    codec: ValueCodec,
    /// Serialization policy.
    mode: SerializationMode,
    /// TTL used when a write asks for no expiry.
    default_ttl: Duration,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl RedisEngine {
    /// Connect the engine for storage `name`.
    pub async fn connect(name: &str, config: &RedisEngineConfig) -> CacheResult<Self> {
        let mode = config.serialization.unwrap_or(SerializationMode::NonPrimitive);
        if mode == SerializationMode::Passthrough {
            return Err(CacheError::configuration(
                "Passthrough serialization is only available to the memory engine",
            ));
        }
        let codec = ValueCodec::from_config(&config.codec);
        codec.check_native_counters(mode)?;
        let keys = KeyCodec::new(config.prefix.as_deref().unwrap_or(name))?;
        let client = RedisClient::connect(name, config).await?;
        Ok(Self {
            client,
            keys,
            codec,
            mode,
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Map a Redis error to a CacheError.
    fn map_err(e: RedisError) -> CacheError {
        CacheError::with_source(ErrorKind::Backend, format!("Redis error: {e}"), e)
    }

    async fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let full_key = self.keys.physical_key(key);

        // seed missing counters so they carry the default TTL
        if !self.default_ttl.is_zero() {
            let seeded: Result<Option<String>, _> = self
                .client
                .query(
                    redis::cmd("SET")
                        .arg(&full_key)
                        .arg(0)
                        .arg("EX")
                        .arg(self.default_ttl.as_secs().max(1))
                        .arg("NX"),
                )
                .await;
            if let Err(e) = seeded {
                warn!(key, error = %e, "Redis counter seed failed");
                return Ok(None);
            }
        }

        match self
            .client
            .query::<i64>(redis::cmd("INCRBY").arg(&full_key).arg(delta))
            .await
        {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.to_string().contains("not an integer") => Err(CacheError::with_source(
                ErrorKind::Codec,
                format!("Stored value of '{key}' is not an integer"),
                e,
            )),
            Err(e) => {
                warn!(key, error = %e, "Redis counter update failed");
                Ok(None)
            }
        }
    }

    async fn delete_namespace(&self) -> CacheResult<u64> {
        let pattern = format!("{}:*", escape_glob(self.keys.prefix()));
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .client
                .query(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH),
                )
                .await
                .map_err(Self::map_err)?;
            if !batch.is_empty() {
                let removed: u64 = self
                    .client
                    .query(redis::cmd("DEL").arg(&batch))
                    .await
                    .map_err(Self::map_err)?;
                deleted += removed;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(deleted)
    }
}

/// Escape Redis glob metacharacters.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl StorageEngine for RedisEngine {
    fn kind(&self) -> &str {
        "redis"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_native_exists: true,
            supports_flush_age: false,
            serialization: self.mode,
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let full_key = self.keys.physical_key(key);
        match self
            .client
            .query::<Option<Vec<u8>>>(redis::cmd("GET").arg(&full_key))
            .await
        {
            Ok(Some(bytes)) => self.codec.decode_stored(self.mode, &bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(key, error = %e, "Redis get failed");
                Ok(None)
            }
        }
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.keys.physical_key(key);
        match self.client.query::<bool>(redis::cmd("EXISTS").arg(&full_key)).await {
            Ok(exists) => Ok(exists),
            Err(e) => {
                warn!(key, error = %e, "Redis exists failed");
                Ok(false)
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Ttl) -> bool {
        let full_key = self.keys.physical_key(key);
        let expiry = match expiry::remote_expiry(&ttl, self.clock.now(), self.default_ttl) {
            Ok(expiry) => expiry,
            Err(e) => {
                warn!(key, error = %e, "Rejected cache write");
                return false;
            }
        };
        if expiry == RemoteExpiry::AlreadyExpired {
            self.remove(key).await;
            return true;
        }
        let payload = match self.codec.encode_stored(self.mode, value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache value");
                return false;
            }
        };

        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(payload);
        if let RemoteExpiry::Seconds(secs) = expiry {
            cmd.arg("EX").arg(secs);
        }
        match self.client.query::<()>(&cmd).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Redis set failed");
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> bool {
        let full_key = self.keys.physical_key(key);
        match self.client.query::<u64>(redis::cmd("DEL").arg(&full_key)).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                warn!(key, error = %e, "Redis delete failed");
                false
            }
        }
    }

    async fn increment(&self, key: &str, step: i64) -> CacheResult<Option<i64>> {
        self.adjust(key, step).await
    }

    async fn decrement(&self, key: &str, step: i64) -> CacheResult<Option<i64>> {
        let delta = step
            .checked_neg()
            .ok_or_else(|| CacheError::codec(format!("Cannot decrement by {step}")))?;
        self.adjust(key, delta).await
    }

    async fn flush(&self, older_than: Option<DateTime<Utc>>) -> bool {
        if older_than.is_some() {
            debug!(prefix = self.keys.prefix(), "Redis flush ignores the age filter");
        }
        match self.delete_namespace().await {
            Ok(deleted) => {
                debug!(prefix = self.keys.prefix(), deleted, "Flushed Redis namespace");
                true
            }
            Err(e) => {
                warn!(prefix = self.keys.prefix(), error = %e, "Redis flush failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use cachehub_core::config::engine::{CodecConfig, ValueFormat};

    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("plain"), "plain");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }

    fn live_config() -> RedisEngineConfig {
        let server = std::env::var("CACHEHUB_TEST_REDIS").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
        RedisEngineConfig {
            servers: vec![server],
            database: 15,
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore = "needs a running Redis server"]
    async fn test_round_trip_against_server() {
        let engine = RedisEngine::connect("cachehub_test", &live_config()).await.unwrap();
        engine.flush(None).await;

        assert!(engine.set("doc", &json!({"a": [1, 2]}), Ttl::seconds(60)).await);
        assert_eq!(engine.get("doc").await.unwrap(), Some(json!({"a": [1, 2]})));
        assert!(engine.has("doc").await.unwrap());

        assert!(engine.set("n", &json!(10), Ttl::Never).await);
        assert_eq!(engine.increment("n", 5).await.unwrap(), Some(15));
        assert_eq!(engine.decrement("n", 20).await.unwrap(), Some(-5));
        assert_eq!(engine.increment("fresh", 3).await.unwrap(), Some(3));

        assert!(engine.flush(None).await);
        assert!(!engine.has("doc").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "needs a running Redis server"]
    async fn test_flush_leaves_other_prefixes() {
        let a = RedisEngine::connect("cachehub_a", &live_config()).await.unwrap();
        let b = RedisEngine::connect("cachehub_b", &live_config()).await.unwrap();
        a.set("k", &json!("a"), Ttl::seconds(60)).await;
        b.set("k", &json!("b"), Ttl::seconds(60)).await;

        assert!(a.flush(None).await);
        assert_eq!(a.get("k").await.unwrap(), None);
        assert_eq!(b.get("k").await.unwrap(), Some(json!("b")));
        b.flush(None).await;
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = RedisEngineConfig {
            servers: vec![address],
            timeout_ms: 300,
            ..Default::default()
        };
        let err = RedisEngine::connect("down", &config).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::EngineUnavailable);
    }

    #[tokio::test]
    async fn test_encoded_counters_are_rejected_before_connecting() {
        for (format, compress) in [(ValueFormat::Msgpack, false), (ValueFormat::Json, true)] {
            let config = RedisEngineConfig {
                servers: vec!["127.0.0.1:1".to_string()],
                serialization: Some(SerializationMode::Always),
                codec: CodecConfig { format, compress },
                ..Default::default()
            };
            let err = RedisEngine::connect("packed", &config).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Configuration, "{format:?}/{compress}");
        }
    }

    #[tokio::test]
    #[ignore = "needs a running Redis server"]
    async fn test_counters_read_back_as_integers() {
        let config = RedisEngineConfig {
            serialization: Some(SerializationMode::NonPrimitive),
            codec: CodecConfig {
                format: ValueFormat::Msgpack,
                compress: true,
            },
            ..live_config()
        };
        let engine = RedisEngine::connect("cachehub_counters", &config).await.unwrap();
        engine.flush(None).await;
        assert_eq!(engine.increment("n", 3).await.unwrap(), Some(3));
        assert_eq!(engine.get("n").await.unwrap(), Some(json!(3)));
        assert_eq!(engine.decrement("n", 45).await.unwrap(), Some(-42));
        assert_eq!(engine.get("n").await.unwrap(), Some(json!(-42)));
        engine.flush(None).await;
    }
}
