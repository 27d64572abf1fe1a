//! Storage engine configuration.
//!
//! Each `[storages.<name>]` table selects a backend with its `engine` key.
//! Configuration is read once when the engine is constructed and never
//! changes afterwards.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::SerializationMode;

/// Configuration for one named storage engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum EngineConfig {
    /// In-process map.
    Memory(MemoryEngineConfig),
    /// One file per key under a root directory.
    File(FileEngineConfig),
    /// Memcached text-protocol servers.
    Memcached(MemcachedEngineConfig),
    /// A Redis server.
    Redis(RedisEngineConfig),
    /// APC-style shared segment.
    Apc(OpcodeEngineConfig),
    /// Wincache-style shared segment.
    Wincache(OpcodeEngineConfig),
    /// Xcache-style shared segment (admin credentials needed to flush).
    Xcache(OpcodeEngineConfig),
}

impl EngineConfig {
    /// The engine kind as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::File(_) => "file",
            Self::Memcached(_) => "memcached",
            Self::Redis(_) => "redis",
            Self::Apc(_) => "apc",
            Self::Wincache(_) => "wincache",
            Self::Xcache(_) => "xcache",
        }
    }
}

/// Payload serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    /// JSON text.
    #[default]
    Json,
    /// MessagePack binary.
    Msgpack,
}

/// Value codec settings shared by every engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Serialization format.
    #[serde(default)]
    pub format: ValueFormat,
    /// Gzip-compress encoded payloads.
    #[serde(default)]
    pub compress: bool,
}

/// In-memory engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryEngineConfig {
    /// Key prefix; defaults to the storage name.
    #[serde(default)]
    pub prefix: Option<String>,
    /// TTL applied by counters creating a new key, in seconds (0 = never).
    #[serde(default)]
    pub default_ttl_seconds: u64,
    /// Serialization policy; defaults to `passthrough`.
    #[serde(default)]
    pub serialization: Option<SerializationMode>,
    /// Codec settings.
    #[serde(default)]
    pub codec: CodecConfig,
}

/// Filesystem engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEngineConfig {
    /// Root directory shared by every file engine scope.
    #[serde(default = "default_file_root")]
    pub root: String,
    /// Key prefix, used as the scope sub-directory; defaults to the storage name.
    #[serde(default)]
    pub prefix: Option<String>,
    /// TTL applied by counters creating a new key, in seconds (0 = never).
    #[serde(default)]
    pub default_ttl_seconds: u64,
    /// Codec settings.
    #[serde(default)]
    pub codec: CodecConfig,
}

impl Default for FileEngineConfig {
    fn default() -> Self {
        Self {
            root: default_file_root(),
            prefix: None,
            default_ttl_seconds: 0,
            codec: CodecConfig::default(),
        }
    }
}

/// Memcached engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemcachedEngineConfig {
    /// Servers as `host:port[:weight]`, either a list or a comma-separated string.
    #[serde(default, deserialize_with = "deserialize_server_list")]
    pub servers: Vec<String>,
    /// Keep one connection per server open between operations.
    #[serde(default = "default_true")]
    pub persistent: bool,
    /// Connect and command timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Key prefix; defaults to the storage name.
    #[serde(default)]
    pub prefix: Option<String>,
    /// TTL used when a write asks for no expiry, in seconds (0 = server never expires).
    #[serde(default = "default_remote_ttl")]
    pub default_ttl_seconds: u64,
    /// Serialization policy; defaults to `non_primitive`.
    #[serde(default)]
    pub serialization: Option<SerializationMode>,
    /// Codec settings.
    #[serde(default)]
    pub codec: CodecConfig,
}

impl Default for MemcachedEngineConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            persistent: true,
            timeout_ms: default_timeout_ms(),
            prefix: None,
            default_ttl_seconds: default_remote_ttl(),
            serialization: None,
            codec: CodecConfig::default(),
        }
    }
}

/// Redis engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisEngineConfig {
    /// The server as `host:port`; exactly one entry.
    #[serde(default, deserialize_with = "deserialize_server_list")]
    pub servers: Vec<String>,
    /// Database index.
    #[serde(default)]
    pub database: i64,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
    /// Keep a managed, reconnecting connection for the engine's lifetime.
    #[serde(default = "default_true")]
    pub persistent: bool,
    /// Connect and command timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Key prefix; defaults to the storage name.
    #[serde(default)]
    pub prefix: Option<String>,
    /// TTL used when a write asks for no expiry, in seconds (0 = persist).
    #[serde(default = "default_remote_ttl")]
    pub default_ttl_seconds: u64,
    /// Serialization policy; defaults to `non_primitive`.
    #[serde(default)]
    pub serialization: Option<SerializationMode>,
    /// Codec settings.
    #[serde(default)]
    pub codec: CodecConfig,
}

impl Default for RedisEngineConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            database: 0,
            password: None,
            persistent: true,
            timeout_ms: default_timeout_ms(),
            prefix: None,
            default_ttl_seconds: default_remote_ttl(),
            serialization: None,
            codec: CodecConfig::default(),
        }
    }
}

/// Administrator credentials for shared-segment maintenance calls.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredentials {
    /// Administrator user name.
    pub username: String,
    /// Administrator password.
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Shared-segment engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpcodeEngineConfig {
    /// Key prefix; defaults to the storage name.
    #[serde(default)]
    pub prefix: Option<String>,
    /// TTL used when a write asks for no expiry, in seconds (0 = never).
    #[serde(default)]
    pub default_ttl_seconds: u64,
    /// Serialization policy; defaults to `non_primitive`.
    #[serde(default)]
    pub serialization: Option<SerializationMode>,
    /// Codec settings.
    #[serde(default)]
    pub codec: CodecConfig,
    /// Credentials for administrative calls.
    #[serde(default)]
    pub credentials: Option<AdminCredentials>,
}

/// Accept either a list of servers or one comma-separated string.
fn deserialize_server_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let servers = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        OneOrMany::Many(list) => list,
    };
    Ok(servers)
}

fn default_file_root() -> String {
    "./data/cache".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_remote_ttl() -> u64 {
    3600
}
