//! Convenience result type alias for CacheHub.

use crate::error::CacheError;

/// A specialized `Result` type for CacheHub operations.
pub type CacheResult<T> = Result<T, CacheError>;
