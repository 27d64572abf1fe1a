//! Configuration schemas.
//!
//! The hub configuration is deserialized from a TOML file via the `config`
//! crate, with `CACHEHUB__`-prefixed environment variables layered on top.

pub mod engine;
pub mod logging;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use self::engine::{EngineConfig, MemoryEngineConfig};
use self::logging::LoggingConfig;

use crate::error::CacheError;

/// Name of the storage used when an operation does not name one.
pub const DEFAULT_STORAGE: &str = "default";

/// Root hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Storage used when an operation does not name one.
    #[serde(default = "default_storage")]
    pub default_storage: String,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named storage engines.
    #[serde(default = "default_storages")]
    pub storages: BTreeMap<String, EngineConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_storage: default_storage(),
            logging: LoggingConfig::default(),
            storages: default_storages(),
        }
    }
}

impl HubConfig {
    /// Load configuration from a TOML file and the environment.
    ///
    /// The file is optional; environment variables prefixed with
    /// `CACHEHUB__` override it (for example
    /// `CACHEHUB__STORAGES__DEFAULT__ENGINE=memory`).
    pub fn load(path: &str) -> Result<Self, CacheError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("CACHEHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CacheError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| CacheError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, CacheError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

fn default_storage() -> String {
    DEFAULT_STORAGE.to_string()
}

fn default_storages() -> BTreeMap<String, EngineConfig> {
    let mut storages = BTreeMap::new();
    storages.insert(
        DEFAULT_STORAGE.to_string(),
        EngineConfig::Memory(MemoryEngineConfig::default()),
    );
    storages
}

#[cfg(test)]
mod tests {
    use super::engine::ValueFormat;
    use super::*;
    use crate::types::SerializationMode;

    #[test]
    fn test_default_config_has_memory_default() {
        let config = HubConfig::default();
        assert_eq!(config.default_storage, "default");
        assert!(matches!(
            config.storages.get("default"),
            Some(EngineConfig::Memory(_))
        ));
    }

    #[test]
    fn test_parse_engine_tables() {
        let config = HubConfig::from_toml(
            r#"
            default_storage = "local"

            [logging]
            level = "debug"

            [storages.local]
            engine = "file"
            root = "/tmp/cachehub"
            prefix = "pages"

            [storages.shared]
            engine = "memcached"
            servers = "10.0.0.1:11211:2, 10.0.0.2"
            persistent = false

            [storages.shared.codec]
            format = "msgpack"
            compress = true

            [storages.sessions]
            engine = "redis"
            servers = ["127.0.0.1:6379"]
            database = 2
            serialization = "always"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_storage, "local");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storages.len(), 3);

        match &config.storages["local"] {
            EngineConfig::File(file) => {
                assert_eq!(file.root, "/tmp/cachehub");
                assert_eq!(file.prefix.as_deref(), Some("pages"));
            }
            other => panic!("unexpected engine: {}", other.kind()),
        }

        match &config.storages["shared"] {
            EngineConfig::Memcached(mc) => {
                assert_eq!(mc.servers, vec!["10.0.0.1:11211:2", "10.0.0.2"]);
                assert!(!mc.persistent);
                assert_eq!(mc.codec.format, ValueFormat::Msgpack);
                assert!(mc.codec.compress);
                assert_eq!(mc.default_ttl_seconds, 3600);
            }
            other => panic!("unexpected engine: {}", other.kind()),
        }

        match &config.storages["sessions"] {
            EngineConfig::Redis(redis) => {
                assert_eq!(redis.database, 2);
                assert_eq!(redis.serialization, Some(SerializationMode::Always));
            }
            other => panic!("unexpected engine: {}", other.kind()),
        }
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        let result = HubConfig::from_toml(
            r#"
            [storages.bad]
            engine = "floppy"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cachehub.toml");
        std::fs::write(
            &path,
            r#"
            default_storage = "fast"

            [storages.fast]
            engine = "apc"
            prefix = "fast"
            default_ttl_seconds = 60
            "#,
        )
        .unwrap();

        let config = HubConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.default_storage, "fast");
        match &config.storages["fast"] {
            EngineConfig::Apc(apc) => assert_eq!(apc.default_ttl_seconds, 60),
            other => panic!("unexpected engine: {}", other.kind()),
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = HubConfig::load(path.to_str().unwrap()).unwrap();
        assert!(config.storages.contains_key(DEFAULT_STORAGE));
    }
}
