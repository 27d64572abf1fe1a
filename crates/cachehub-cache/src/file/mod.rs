//! Filesystem storage engine.

pub mod engine;
pub mod record;

pub use engine::FileSystemEngine;
