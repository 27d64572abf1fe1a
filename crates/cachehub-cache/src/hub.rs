//! Cache hub: routes operations to the correct engine by storage name.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use cachehub_core::config::DEFAULT_STORAGE;
use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;
use cachehub_core::traits::engine::{EngineCapabilities, StorageEngine};
use cachehub_core::types::{Ttl, Value};

/// Summary of one registered engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    /// Storage name.
    pub name: String,
    /// Backend kind.
    pub kind: String,
    /// Whether this is the default storage.
    pub is_default: bool,
    /// Engine capabilities.
    pub capabilities: EngineCapabilities,
}

/// Central registry that holds every named storage engine.
///
/// Operations take an optional storage name; `None` routes to the default
/// storage. Engines are shared, so a clone of the hub sees the same
/// registrations.
#[derive(Debug, Clone)]
pub struct CacheHub {
    /// Map of storage name → engine instance.
    engines: Arc<RwLock<HashMap<String, Arc<dyn StorageEngine>>>>,
    /// Storage used when an operation does not name one.
    default_storage: Arc<str>,
}

impl CacheHub {
    /// Create an empty hub whose default storage is `"default"`.
    pub fn new() -> Self {
        Self::with_default(DEFAULT_STORAGE)
    }

    /// Create an empty hub with a custom default storage name.
    pub fn with_default(default_storage: &str) -> Self {
        Self {
            engines: Arc::new(RwLock::new(HashMap::new())),
            default_storage: Arc::from(default_storage),
        }
    }

    /// Name of the default storage.
    pub fn default_storage(&self) -> &str {
        &self.default_storage
    }

    /// Register an engine, replacing any engine already under `name`.
    pub async fn register(&self, name: impl Into<String>, engine: Arc<dyn StorageEngine>) {
        let name = name.into();
        let kind = engine.kind().to_string();
        let previous = self.engines.write().await.insert(name.clone(), engine);
        if previous.is_some() {
            debug!(storage = %name, kind, "Replaced storage engine");
        } else {
            info!(storage = %name, kind, "Registered storage engine");
        }
    }

    /// Remove an engine, returning it if it was registered.
    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn StorageEngine>> {
        self.engines.write().await.remove(name)
    }

    /// Get the engine for `storage` (`None` for the default).
    pub async fn engine(&self, storage: Option<&str>) -> CacheResult<Arc<dyn StorageEngine>> {
        let name = storage.unwrap_or(self.default_storage());
        self.engines
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::unknown_storage(name))
    }

    /// Registered storage names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Describe every registered engine, sorted by name.
    pub async fn describe(&self) -> Vec<EngineInfo> {
        let engines = self.engines.read().await;
        let mut infos: Vec<EngineInfo> = engines
            .iter()
            .map(|(name, engine)| EngineInfo {
                name: name.clone(),
                kind: engine.kind().to_string(),
                is_default: name.as_str() == &*self.default_storage,
                capabilities: engine.capabilities(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Read a value.
    pub async fn get(&self, key: &str, storage: Option<&str>) -> CacheResult<Option<Value>> {
        self.engine(storage).await?.get(key).await
    }

    /// Read a value and convert it to `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str, storage: Option<&str>) -> CacheResult<Option<T>> {
        match self.get(key, storage).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Write a value.
    pub async fn set(&self, key: &str, value: &Value, ttl: impl Into<Ttl>, storage: Option<&str>) -> CacheResult<bool> {
        let engine = self.engine(storage).await?;
        Ok(engine.set(key, value, ttl.into()).await)
    }

    /// Convert `value` and write it.
    pub async fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: impl Into<Ttl>,
        storage: Option<&str>,
    ) -> CacheResult<bool> {
        let value = serde_json::to_value(value)?;
        self.set(key, &value, ttl, storage).await
    }

    /// Whether a key holds a live entry.
    pub async fn has(&self, key: &str, storage: Option<&str>) -> CacheResult<bool> {
        self.engine(storage).await?.has(key).await
    }

    /// Delete a key.
    pub async fn remove(&self, key: &str, storage: Option<&str>) -> CacheResult<bool> {
        Ok(self.engine(storage).await?.remove(key).await)
    }

    /// Add `step` to a counter.
    pub async fn increment(&self, key: &str, step: i64, storage: Option<&str>) -> CacheResult<Option<i64>> {
        self.engine(storage).await?.increment(key, step).await
    }

    /// Subtract `step` from a counter.
    pub async fn decrement(&self, key: &str, step: i64, storage: Option<&str>) -> CacheResult<Option<i64>> {
        self.engine(storage).await?.decrement(key, step).await
    }

    /// Flush one storage, or every storage when `storage` is `None`.
    ///
    /// Returns `true` only if every flushed engine succeeded.
    pub async fn flush(&self, storage: Option<&str>, older_than: Option<DateTime<Utc>>) -> CacheResult<bool> {
        if let Some(name) = storage {
            return Ok(self.engine(Some(name)).await?.flush(older_than).await);
        }

        let engines: Vec<(String, Arc<dyn StorageEngine>)> = self
            .engines
            .read()
            .await
            .iter()
            .map(|(name, engine)| (name.clone(), engine.clone()))
            .collect();
        let mut all = true;
        for (name, engine) in engines {
            if !engine.flush(older_than).await {
                warn!(storage = %name, "Flush failed");
                all = false;
            }
        }
        Ok(all)
    }
}

impl Default for CacheHub {
    fn default() -> Self {
        Self::new()
    }
}
