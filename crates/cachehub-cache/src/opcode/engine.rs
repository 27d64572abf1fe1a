//! Storage engine over a shared segment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use cachehub_core::config::engine::{AdminCredentials, OpcodeEngineConfig};
use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;
use cachehub_core::traits::clock::{Clock, SystemClock};
use cachehub_core::traits::engine::{EngineCapabilities, StorageEngine};
use cachehub_core::types::{SerializationMode, Ttl, Value};

use super::segment::{SegmentError, SharedSegment};
use crate::codec::ValueCodec;
use crate::expiry::{self, RemoteExpiry};
use crate::keys::KeyCodec;

/// Which opcode cache the engine imitates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpcodeFlavor {
    /// APC user cache.
    Apc,
    /// Wincache user cache.
    Wincache,
    /// Xcache variable cache.
    Xcache,
}

impl OpcodeFlavor {
    /// Name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Apc => "apc",
            Self::Wincache => "wincache",
            Self::Xcache => "xcache",
        }
    }

    /// Whether listing keys needs administrator credentials.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, Self::Xcache)
    }
}

/// Storage engine adapting a [`SharedSegment`].
#[derive(Debug, Clone)]
pub struct OpcodeCacheEngine {
    flavor: OpcodeFlavor,
    segment: Arc<dyn SharedSegment>,
    keys: KeyCodec,
    codec: ValueCodec,
    mode: SerializationMode,
    default_ttl: Duration,
    credentials: Option<AdminCredentials>,
    clock: Arc<dyn Clock>,
}

impl OpcodeCacheEngine {
    /// Create an engine for storage `name` over `segment`.
    pub fn new(
        flavor: OpcodeFlavor,
        name: &str,
        config: &OpcodeEngineConfig,
        segment: Option<Arc<dyn SharedSegment>>,
    ) -> CacheResult<Self> {
        let segment = segment.ok_or_else(|| {
            CacheError::engine_unavailable(format!(
                "No shared segment available for {} storage '{name}'",
                flavor.name()
            ))
        })?;
        let mode = config.serialization.unwrap_or(SerializationMode::NonPrimitive);
        if mode == SerializationMode::Passthrough {
            return Err(CacheError::configuration(
                "Passthrough serialization is only available to the memory engine",
            ));
        }
        let codec = ValueCodec::from_config(&config.codec);
        codec.check_native_counters(mode)?;
        if flavor.requires_credentials() && config.credentials.is_none() {
            warn!(storage = name, "No xcache credentials configured; flush will fail");
        }
        info!(storage = name, flavor = flavor.name(), "Shared-segment engine ready");
        Ok(Self {
            flavor,
            segment,
            keys: KeyCodec::new(config.prefix.as_deref().unwrap_or(name))?,
            codec,
            mode,
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            credentials: config.credentials.clone(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The imitated cache.
    pub fn flavor(&self) -> OpcodeFlavor {
        self.flavor
    }

    fn expiry(&self, ttl: &Ttl) -> CacheResult<RemoteExpiry> {
        expiry::remote_expiry(ttl, self.clock.now(), self.default_ttl)
    }

    fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let full_key = self.keys.physical_key(key);
        for _ in 0..2 {
            match self.segment.adjust(&full_key, delta) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {
                    let ttl = native_ttl(self.expiry(&Ttl::Never)?);
                    if self
                        .segment
                        .add(&full_key, delta.to_string().into_bytes(), ttl)
                    {
                        return Ok(Some(delta));
                    }
                }
                Err(SegmentError::NotNumeric) => {
                    return Err(CacheError::codec(format!("Stored value of '{key}' is not an integer")));
                }
                Err(e) => {
                    warn!(key, error = %e, "Shared-segment counter update failed");
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }
}

/// Segment TTL for a resolved expiry; `None` never expires.
fn native_ttl(expiry: RemoteExpiry) -> Option<Duration> {
    match expiry {
        RemoteExpiry::Seconds(secs) => Some(Duration::from_secs(secs)),
        RemoteExpiry::Persist | RemoteExpiry::AlreadyExpired => None,
    }
}

#[async_trait]
impl StorageEngine for OpcodeCacheEngine {
    fn kind(&self) -> &str {
        self.flavor.name()
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_native_exists: true,
            supports_flush_age: false,
            serialization: self.mode,
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        match self.segment.fetch(&self.keys.physical_key(key)) {
            Some(data) => self.codec.decode_stored(self.mode, &data).map(Some),
            None => Ok(None),
        }
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.segment.exists(&self.keys.physical_key(key)))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Ttl) -> bool {
        let full_key = self.keys.physical_key(key);
        let ttl = match self.expiry(&ttl) {
            Ok(RemoteExpiry::AlreadyExpired) => {
                self.segment.delete(&full_key);
                return true;
            }
            Ok(expiry) => native_ttl(expiry),
            Err(e) => {
                warn!(key, error = %e, "Rejected cache write");
                return false;
            }
        };
        match self.codec.encode_stored(self.mode, value) {
            Ok(data) => self.segment.store(&full_key, data, ttl),
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache value");
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> bool {
        self.segment.delete(&self.keys.physical_key(key))
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
        if older_than.is_some() {
            debug!(prefix = self.keys.prefix(), "Shared-segment flush ignores the age filter");
        }
        let credentials = if self.flavor.requires_credentials() {
            match &self.credentials {
                Some(credentials) => Some(credentials),
                None => {
                    warn!(
                        prefix = self.keys.prefix(),
                        "Cannot flush xcache storage without administrator credentials"
                    );
                    return false;
                }
            }
        } else {
            None
        };

        let keys = match self.segment.keys(credentials) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = self.keys.prefix(), error = %e, "Failed to list shared-segment keys");
                return false;
            }
        };
        let namespace = self.keys.physical_key("");
        let mut removed = 0usize;
        for key in keys.iter().filter(|k| k.starts_with(&namespace)) {
            if self.segment.delete(key) {
                removed += 1;
            }
        }
        debug!(prefix = self.keys.prefix(), removed, "Flushed shared-segment namespace");
        true
    }
}
