//! # cachehub-cache
//!
//! Storage engines for CacheHub and the hub that routes between them:
//!
//! - **memory**: in-process map with lazy expiry
//! - **file**: one record file per key under a shared root directory
//! - **memcached**: Memcached text protocol client with weighted server selection
//! - **redis**: Redis-backed engine using the [redis](https://crates.io/crates/redis) crate
//! - **opcode**: APC / Wincache / Xcache style engines over a shared segment
//!
//! Engines are built from configuration by [`EngineFactory`] and registered
//! by name into a [`CacheHub`].

pub mod codec;
pub mod expiry;
pub mod factory;
pub mod file;
pub mod hub;
pub mod keys;
#[cfg(feature = "memcached")]
pub mod memcached;
pub mod memory;
#[cfg(feature = "opcode")]
pub mod opcode;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod servers;

pub use codec::ValueCodec;
pub use factory::EngineFactory;
pub use file::FileSystemEngine;
pub use hub::{CacheHub, EngineInfo};
pub use keys::KeyCodec;
#[cfg(feature = "memcached")]
pub use memcached::MemcachedEngine;
pub use memory::MemoryEngine;
#[cfg(feature = "opcode")]
pub use opcode::{LocalSegment, OpcodeCacheEngine, OpcodeFlavor, SharedSegment};
#[cfg(feature = "redis-backend")]
pub use crate::redis::RedisEngine;
