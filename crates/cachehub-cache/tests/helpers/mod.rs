//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use cachehub_cache::{CacheHub, FileSystemEngine, MemoryEngine};
use cachehub_core::config::engine::{FileEngineConfig, MemoryEngineConfig};

/// Hub with a memory `default` storage and a memory `custom` storage.
pub async fn memory_hub() -> CacheHub {
    let hub = CacheHub::new();
    for name in ["default", "custom"] {
        let engine = MemoryEngine::new(name, &MemoryEngineConfig::default()).expect("memory engine");
        hub.register(name, Arc::new(engine)).await;
    }
    hub
}

/// Hub with two file storages `a` and `b` sharing one root directory.
pub async fn shared_root_hub() -> (CacheHub, TempDir) {
    let root = tempfile::tempdir().expect("temp dir");
    let hub = CacheHub::new();
    for name in ["a", "b"] {
        let config = FileEngineConfig {
            root: root.path().display().to_string(),
            ..Default::default()
        };
        let engine = FileSystemEngine::new(name, &config).expect("file engine");
        hub.register(name, Arc::new(engine)).await;
    }
    (hub, root)
}
