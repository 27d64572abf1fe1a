//! In-memory storage engine.

pub mod store;

pub use store::MemoryEngine;
