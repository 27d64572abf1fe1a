//! Memcached storage engine over the text protocol.

pub mod engine;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::MemcachedEngine;
