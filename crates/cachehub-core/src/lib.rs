//! # cachehub-core
//!
//! Core crate for CacheHub. Contains the storage engine contract, the
//! clock abstraction, TTL and value types, configuration schemas, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other CacheHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::CacheError;
pub use result::CacheResult;
