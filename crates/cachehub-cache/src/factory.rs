//! Configuration-driven engine construction.

use std::sync::Arc;

use tracing::info;

use cachehub_core::config::HubConfig;
use cachehub_core::config::engine::EngineConfig;
use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;
use cachehub_core::traits::engine::StorageEngine;

use crate::file::FileSystemEngine;
use crate::hub::CacheHub;
use crate::memory::MemoryEngine;
#[cfg(feature = "opcode")]
use crate::opcode::{LocalSegment, OpcodeCacheEngine, OpcodeFlavor, SharedSegment};

/// Builds storage engines from their configuration.
///
/// Every shared-segment engine built by one factory uses the same segment.
#[derive(Debug, Clone)]
pub struct EngineFactory {
    #[cfg(feature = "opcode")]
    segment: Option<Arc<dyn SharedSegment>>,
}

impl Default for EngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory {
    /// Create a factory with an in-process shared segment.
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "opcode")]
            segment: Some(Arc::new(LocalSegment::new())),
        }
    }

    /// Replace the shared segment; `None` makes shared-segment engines unavailable.
    #[cfg(feature = "opcode")]
    pub fn with_segment(mut self, segment: Option<Arc<dyn SharedSegment>>) -> Self {
        self.segment = segment;
        self
    }

    /// Build the engine for storage `name`.
    pub async fn build(&self, name: &str, config: &EngineConfig) -> CacheResult<Arc<dyn StorageEngine>> {
        let engine: Arc<dyn StorageEngine> = match config {
            EngineConfig::Memory(c) => Arc::new(MemoryEngine::new(name, c)?),
            EngineConfig::File(c) => Arc::new(FileSystemEngine::new(name, c)?),
            #[cfg(feature = "memcached")]
            EngineConfig::Memcached(c) => Arc::new(crate::memcached::MemcachedEngine::connect(name, c).await?),
            #[cfg(feature = "redis-backend")]
            EngineConfig::Redis(c) => Arc::new(crate::redis::RedisEngine::connect(name, c).await?),
            #[cfg(feature = "opcode")]
            EngineConfig::Apc(c) => Arc::new(self.opcode(OpcodeFlavor::Apc, name, c)?),
            #[cfg(feature = "opcode")]
            EngineConfig::Wincache(c) => Arc::new(self.opcode(OpcodeFlavor::Wincache, name, c)?),
            #[cfg(feature = "opcode")]
            EngineConfig::Xcache(c) => Arc::new(self.opcode(OpcodeFlavor::Xcache, name, c)?),
            #[allow(unreachable_patterns)]
            other => {
                return Err(CacheError::configuration(format!(
                    "Engine '{}' for storage '{name}' is not compiled in",
                    other.kind()
                )));
            }
        };
        Ok(engine)
    }

    #[cfg(feature = "opcode")]
    fn opcode(
        &self,
        flavor: OpcodeFlavor,
        name: &str,
        config: &cachehub_core::config::engine::OpcodeEngineConfig,
    ) -> CacheResult<OpcodeCacheEngine> {
        OpcodeCacheEngine::new(flavor, name, config, self.segment.clone())
    }

    /// Build every configured storage and register it into `hub`.
    pub async fn populate(&self, hub: &CacheHub, config: &HubConfig) -> CacheResult<()> {
        for (name, engine_config) in &config.storages {
            let engine = self.build(name, engine_config).await?;
            hub.register(name.clone(), engine).await;
        }
        info!(storages = config.storages.len(), default = %config.default_storage, "Cache hub ready");
        Ok(())
    }
}

impl CacheHub {
    /// Build a hub holding every storage in `config`.
    ///
    /// Fails on the first engine that cannot be constructed.
    pub async fn from_config(config: &HubConfig) -> CacheResult<Self> {
        Self::from_config_with(config, &EngineFactory::new()).await
    }

    /// Like [`from_config`](Self::from_config) with a custom factory.
    pub async fn from_config_with(config: &HubConfig, factory: &EngineFactory) -> CacheResult<Self> {
        let hub = Self::with_default(&config.default_storage);
        factory.populate(&hub, config).await?;
        Ok(hub)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use cachehub_core::error::ErrorKind;
    use cachehub_core::types::Ttl;

    use super::*;

    #[cfg(feature = "opcode")]
    #[tokio::test]
    async fn test_hub_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
            default_storage = "main"

            [storages.main]
            engine = "memory"

            [storages.disk]
            engine = "file"
            root = "{}"

            [storages.shared]
            engine = "apc"
            "#,
            dir.path().display()
        );
        let config = HubConfig::from_toml(&toml).unwrap();
        let hub = CacheHub::from_config(&config).await.unwrap();

        assert_eq!(hub.names().await, vec!["disk", "main", "shared"]);
        assert_eq!(hub.default_storage(), "main");
        assert!(hub.set("k", &json!(1), Ttl::Never, None).await.unwrap());
        assert!(hub.set("k", &json!("f"), Ttl::Never, Some("disk")).await.unwrap());
        assert_eq!(hub.get("k", Some("disk")).await.unwrap(), Some(json!("f")));
        assert_eq!(hub.engine(Some("shared")).await.unwrap().kind(), "apc");
    }

    #[cfg(feature = "opcode")]
    #[tokio::test]
    async fn test_opcode_engines_share_segment() {
        let toml = r#"
            [storages.one]
            engine = "apc"
            prefix = "shared"

            [storages.two]
            engine = "wincache"
            prefix = "shared"
        "#;
        let hub = CacheHub::from_config(&HubConfig::from_toml(toml).unwrap()).await.unwrap();
        hub.set("k", &json!("v"), Ttl::Never, Some("one")).await.unwrap();
        assert_eq!(hub.get("k", Some("two")).await.unwrap(), Some(json!("v")));
    }

    #[cfg(feature = "opcode")]
    #[tokio::test]
    async fn test_missing_segment_fails_construction() {
        let toml = r#"
            [storages.x]
            engine = "xcache"
        "#;
        let factory = EngineFactory::new().with_segment(None);
        let err = CacheHub::from_config_with(&HubConfig::from_toml(toml).unwrap(), &factory)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::EngineUnavailable);
    }

    #[cfg(feature = "memcached")]
    #[tokio::test]
    async fn test_unreachable_memcached_fails_construction() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let toml = format!(
            r#"
            [storages.mc]
            engine = "memcached"
            servers = "{address}"
            timeout_ms = 200
            "#
        );
        let err = CacheHub::from_config(&HubConfig::from_toml(&toml).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::EngineUnavailable);
    }
}
