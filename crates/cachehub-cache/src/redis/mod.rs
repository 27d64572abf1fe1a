//! Redis storage engine.

pub mod client;
pub mod engine;

pub use client::RedisClient;
pub use engine::RedisEngine;
