//! Core type definitions used across the CacheHub workspace.

pub mod serialization;
pub mod ttl;

pub use serialization::SerializationMode;
pub use ttl::Ttl;

/// A dynamic cache value: scalars, sequences, mappings, and nested
/// combinations of them.
pub type Value = serde_json::Value;
