//! Memcached storage engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use cachehub_core::config::engine::MemcachedEngineConfig;
use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;
use cachehub_core::traits::clock::{Clock, SystemClock};
use cachehub_core::traits::engine::{EngineCapabilities, StorageEngine};
use cachehub_core::types::{SerializationMode, Ttl, Value};

use super::protocol::{ArithVerb, Command, Connection, ProtocolError, Reply, StoreVerb};
use crate::codec::{self, ValueCodec};
use crate::expiry::{self, RemoteExpiry};
use crate::keys::KeyCodec;
use crate::servers::{MEMCACHED_PORT, ServerRing, ServerSpec, parse_servers};

/// Longest key the protocol accepts.
const MAX_KEY_LENGTH: usize = 250;

/// Longest prefix that still leaves room for a `:~` digest key.
const MAX_PREFIX_LENGTH: usize = MAX_KEY_LENGTH - 66;

/// Item holds plain decimal text.
const FLAG_PLAIN: u32 = 0;

/// Item holds a codec payload.
const FLAG_ENCODED: u32 = 1;

/// Expiry times above this are read by the server as unix timestamps.
const RELATIVE_EXPIRY_LIMIT: u64 = 60 * 60 * 24 * 30;

#[derive(Debug)]
struct ServerSlot {
    spec: ServerSpec,
    conn: Mutex<Option<Connection>>,
}

/// Storage engine speaking the Memcached text protocol to one or more servers.
///
/// Keys are spread over the servers by weight. Each engine namespace carries
/// a generation number stored under the bare prefix; it is folded into every
/// physical key, and `flush` bumps it so the namespace is invalidated without
/// touching other namespaces on the same servers.
#[derive(Debug, Clone)]
pub struct MemcachedEngine {
    /// Configured servers with their connections.
    servers: Arc<Vec<ServerSlot>>,
    /// Weighted key distribution.
    ring: ServerRing,
    /// Key namespacing.
    keys: KeyCodec,
    /// Payload codec.
    codec: ValueCodec,
    /// Serialization policy.
    mode: SerializationMode,
    /// TTL used when a write asks for no expiry.
    default_ttl: Duration,
    /// Keep connections open between operations.
    persistent: bool,
    /// Connect and command timeout.
    timeout: Duration,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl MemcachedEngine {
    /// Create an engine for the storage `name` and check that at least one
    /// server answers.
    pub async fn connect(name: &str, config: &MemcachedEngineConfig) -> CacheResult<Self> {
        let specs = parse_servers(&config.servers, MEMCACHED_PORT)?;
        if specs.is_empty() {
            return Err(CacheError::engine_unavailable(format!(
                "Memcached storage '{name}' has no server configured"
            )));
        }
        let mode = config.serialization.unwrap_or(SerializationMode::NonPrimitive);
        if mode == SerializationMode::Passthrough {
            return Err(CacheError::configuration(
                "Passthrough serialization is only available to the memory engine",
            ));
        }

        let keys = KeyCodec::new(config.prefix.as_deref().unwrap_or(name))?;
        if keys.prefix().len() > MAX_PREFIX_LENGTH {
            return Err(CacheError::configuration(format!(
                "Memcached key prefix is {} bytes, the limit is {MAX_PREFIX_LENGTH}",
                keys.prefix().len()
            )));
        }

        let engine = Self {
            ring: ServerRing::new(&specs),
            servers: Arc::new(
                specs
                    .into_iter()
                    .map(|spec| ServerSlot {
                        spec,
                        conn: Mutex::new(None),
                    })
                    .collect(),
            ),
            keys,
            codec: ValueCodec::from_config(&config.codec),
            mode,
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            persistent: config.persistent,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            clock: Arc::new(SystemClock),
        };
        engine.probe(name).await?;
        Ok(engine)
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn probe(&self, name: &str) -> CacheResult<()> {
        let mut reachable = 0;
        for (index, slot) in self.servers.iter().enumerate() {
            match self.call_on(index, Command::Version).await {
                Ok(Reply::Version(version)) => {
                    debug!(server = %slot.spec, version, "Memcached server reachable");
                    reachable += 1;
                }
                Ok(other) => warn!(server = %slot.spec, reply = ?other, "Unexpected reply to version"),
                Err(e) => warn!(server = %slot.spec, error = %e, "Memcached server unreachable"),
            }
        }
        if reachable == 0 {
            return Err(CacheError::engine_unavailable(format!(
                "No Memcached server reachable for storage '{name}'"
            )));
        }
        info!(storage = name, servers = self.servers.len(), reachable, "Memcached engine ready");
        Ok(())
    }

    /// Run a command on the server owning `routing_key`.
    async fn call(&self, routing_key: &str, command: Command<'_>) -> Result<Reply, ProtocolError> {
        self.call_on(self.ring.pick(routing_key), command).await
    }

    async fn call_on(&self, index: usize, command: Command<'_>) -> Result<Reply, ProtocolError> {
        let slot = &self.servers[index];
        let mut conn = slot.conn.lock().await;

        let result = tokio::time::timeout(self.timeout, async {
            if conn.is_none() {
                *conn = Some(Connection::connect(&slot.spec.address()).await?);
            }
            match conn.as_mut() {
                Some(connection) => connection.execute(&command).await,
                None => Err(ProtocolError::Unexpected("connection unavailable".to_string())),
            }
        })
        .await
        .unwrap_or(Err(ProtocolError::Timeout(self.timeout)));

        let keep = self.persistent
            && result
                .as_ref()
                .map_or_else(ProtocolError::keeps_connection, |_| true);
        if !keep {
            *conn = None;
        }
        result
    }

    /// Key holding the namespace generation. Physical keys always contain a
    /// separator after the prefix, so this never collides with one.
    fn generation_key(&self) -> &str {
        self.keys.prefix()
    }

    fn fresh_generation(&self) -> u64 {
        self.clock.now().timestamp_millis().max(1) as u64
    }

    async fn generation(&self) -> Result<u64, ProtocolError> {
        let key = self.generation_key();
        if let Reply::Value(Some((_, data))) = self.call(key, Command::Get(key)).await? {
            if let Some(generation) = parse_generation(&data) {
                return Ok(generation);
            }
        }

        let fresh = self.fresh_generation().to_string();
        self.call(
            key,
            Command::Store {
                verb: StoreVerb::Add,
                key,
                flags: FLAG_PLAIN,
                exptime: 0,
                data: fresh.as_bytes(),
            },
        )
        .await?;

        // another client may have won the add
        match self.call(key, Command::Get(key)).await? {
            Reply::Value(Some((_, data))) => parse_generation(&data)
                .ok_or_else(|| ProtocolError::Unexpected("namespace generation is not a number".to_string())),
            _ => Err(ProtocolError::Unexpected("namespace generation vanished".to_string())),
        }
    }

    async fn data_key(&self, key: &str) -> Result<String, ProtocolError> {
        let generation = self.generation().await?;
        Ok(self.keys.wire_key(&format!("{generation}:{key}"), MAX_KEY_LENGTH))
    }

    /// Expiry field for a write, or `None` if the entry is already expired.
    fn exptime(&self, ttl: &Ttl) -> CacheResult<Option<u64>> {
        let now = self.clock.now();
        let exptime = match expiry::remote_expiry(ttl, now, self.default_ttl)? {
            RemoteExpiry::Persist => Some(0),
            RemoteExpiry::Seconds(secs) if secs > RELATIVE_EXPIRY_LIMIT => {
                Some(now.timestamp().max(0) as u64 + secs)
            }
            RemoteExpiry::Seconds(secs) => Some(secs),
            RemoteExpiry::AlreadyExpired => None,
        };
        Ok(exptime)
    }

    /// Fetch raw flags and data.
    async fn fetch(&self, key: &str) -> Option<(u32, Vec<u8>)> {
        let result = match self.data_key(key).await {
            Ok(wire) => self.call(&wire, Command::Get(&wire)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(Reply::Value(item)) => item,
            Ok(other) => {
                warn!(key, reply = ?other, "Unexpected Memcached reply to get");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Memcached get failed");
                None
            }
        }
    }

    fn decode(&self, flags: u32, data: &[u8]) -> CacheResult<Value> {
        if flags & FLAG_ENCODED != 0 {
            return self.codec.decode(data);
        }
        codec::parse_integer(data)
            .map(Value::from)
            .ok_or_else(|| CacheError::codec("Plain Memcached item is not an integer"))
    }

    async fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let (verb, amount) = if delta >= 0 {
            (ArithVerb::Incr, delta as u64)
        } else {
            (ArithVerb::Decr, delta.unsigned_abs())
        };
        let wire = match self.data_key(key).await {
            Ok(wire) => wire,
            Err(e) => {
                warn!(key, error = %e, "Memcached namespace lookup failed");
                return Ok(None);
            }
        };

        // a second pass covers losing the race to create the counter
        for _ in 0..2 {
            match self.call(&wire, Command::Arith(verb, &wire, amount)).await {
                Ok(Reply::Counter(Some(value))) => {
                    let value = i64::try_from(value)
                        .map_err(|_| CacheError::codec(format!("Counter '{key}' exceeds i64")))?;
                    return Ok(Some(value));
                }
                Ok(Reply::Counter(None)) => {
                    // decr cannot go below zero server-side
                    let initial = delta.max(0);
                    let exptime = self.exptime(&Ttl::Never)?.unwrap_or(0);
                    let data = initial.to_string();
                    let created = self
                        .call(
                            &wire,
                            Command::Store {
                                verb: StoreVerb::Add,
                                key: &wire,
                                flags: FLAG_PLAIN,
                                exptime,
                                data: data.as_bytes(),
                            },
                        )
                        .await;
                    match created {
                        Ok(Reply::Stored(true)) => return Ok(Some(initial)),
                        Ok(Reply::Stored(false)) => continue,
                        Ok(other) => {
                            warn!(key, reply = ?other, "Unexpected Memcached reply to add");
                            return Ok(None);
                        }
                        Err(e) => {
                            warn!(key, error = %e, "Memcached counter creation failed");
                            return Ok(None);
                        }
                    }
                }
                Err(e) if e.is_non_numeric() => {
                    return Err(CacheError::codec(format!("Stored value of '{key}' is not an integer")));
                }
                Ok(other) => {
                    warn!(key, reply = ?other, "Unexpected Memcached reply to arithmetic");
                    return Ok(None);
                }
                Err(e) => {
                    warn!(key, error = %e, "Memcached arithmetic failed");
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }
}

fn parse_generation(data: &[u8]) -> Option<u64> {
    codec::parse_integer(data).and_then(|g| u64::try_from(g).ok())
}

#[async_trait]
impl StorageEngine for MemcachedEngine {
    fn kind(&self) -> &str {
        "memcached"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_native_exists: false,
            supports_flush_age: false,
            serialization: self.mode,
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        match self.fetch(key).await {
            Some((flags, data)) => self.decode(flags, &data).map(Some),
            None => Ok(None),
        }
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.fetch(key).await.is_some())
    }

    async fn set(&self, key: &str, value: &Value, ttl: Ttl) -> bool {
        let exptime = match self.exptime(&ttl) {
            Ok(Some(exptime)) => exptime,
            Ok(None) => {
                self.remove(key).await;
                return true;
            }
            Err(e) => {
                warn!(key, error = %e, "Rejected cache write");
                return false;
            }
        };
        let (flags, data) = match codec::raw_integer(self.mode, value) {
            Some(n) => (FLAG_PLAIN, n.to_string().into_bytes()),
            None => match self.codec.encode(value) {
                Ok(data) => (FLAG_ENCODED, data),
                Err(e) => {
                    warn!(key, error = %e, "Failed to encode cache value");
                    return false;
                }
            },
        };

        let result = match self.data_key(key).await {
            Ok(wire) => {
                self.call(
                    &wire,
                    Command::Store {
                        verb: StoreVerb::Set,
                        key: &wire,
                        flags,
                        exptime,
                        data: &data,
                    },
                )
                .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(Reply::Stored(stored)) => stored,
            Ok(other) => {
                warn!(key, reply = ?other, "Unexpected Memcached reply to set");
                false
            }
            Err(e) => {
                warn!(key, error = %e, "Memcached set failed");
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> bool {
        let result = match self.data_key(key).await {
            Ok(wire) => self.call(&wire, Command::Delete(&wire)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(Reply::Deleted(deleted)) => deleted,
            Ok(other) => {
                warn!(key, reply = ?other, "Unexpected Memcached reply to delete");
                false
            }
            Err(e) => {
                warn!(key, error = %e, "Memcached delete failed");
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
            debug!(prefix = self.keys.prefix(), "Memcached flush ignores the age filter");
        }
        let key = self.generation_key();
        match self.call(key, Command::Arith(ArithVerb::Incr, key, 1)).await {
            Ok(Reply::Counter(Some(generation))) => {
                debug!(prefix = key, generation, "Bumped Memcached namespace generation");
                true
            }
            Ok(Reply::Counter(None)) => {
                let fresh = self.fresh_generation().to_string();
                let stored = self
                    .call(
                        key,
                        Command::Store {
                            verb: StoreVerb::Set,
                            key,
                            flags: FLAG_PLAIN,
                            exptime: 0,
                            data: fresh.as_bytes(),
                        },
                    )
                    .await;
                matches!(stored, Ok(Reply::Stored(true)))
            }
            Ok(other) => {
                warn!(reply = ?other, "Unexpected Memcached reply to flush");
                false
            }
            Err(e) => {
                warn!(error = %e, "Memcached flush failed");
                false
            }
        }
    }
}
