//! Unified error types for CacheHub.
//!
//! Engines and the hub map their internal errors into [`CacheError`] so
//! callers see one error type regardless of backend. Only setup problems and
//! data corruption travel as errors; transient backend failures are reported
//! by the engines as `false` / cache-miss results instead.

use std::fmt;
use thiserror::Error;

/// Error kind categorization used across every CacheHub crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A backend (server, extension, directory) could not be reached or is not
    /// installed when the engine was constructed.
    EngineUnavailable,
    /// An operation referenced a storage name that was never registered.
    UnknownStorage,
    /// A stored payload could not be encoded or decoded.
    Codec,
    /// A TTL phrase or instant could not be interpreted.
    InvalidTtl,
    /// Engine or hub configuration is invalid.
    Configuration,
    /// A backend command failed.
    Backend,
    /// A local I/O error occurred.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineUnavailable => write!(f, "ENGINE_UNAVAILABLE"),
            Self::UnknownStorage => write!(f, "UNKNOWN_STORAGE"),
            Self::Codec => write!(f, "CODEC"),
            Self::InvalidTtl => write!(f, "INVALID_TTL"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Backend => write!(f, "BACKEND"),
            Self::Io => write!(f, "IO"),
        }
    }
}

/// The error returned by CacheHub operations.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct CacheError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CacheError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an engine-unavailable error.
    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineUnavailable, message)
    }

    /// Create an unknown-storage error for the given name.
    pub fn unknown_storage(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownStorage,
            format!("No storage engine registered under '{name}'"),
        )
    }

    /// Create a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Codec, message)
    }

    /// Create an invalid-TTL error.
    pub fn invalid_ttl(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTtl, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    /// Whether this error has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for CacheError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorKind::Codec, format!("JSON codec error: {err}"), err)
    }
}

impl From<rmp_serde::encode::Error> for CacheError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::with_source(ErrorKind::Codec, format!("MessagePack encode error: {err}"), err)
    }
}

impl From<rmp_serde::decode::Error> for CacheError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::with_source(ErrorKind::Codec, format!("MessagePack decode error: {err}"), err)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Io, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = CacheError::unknown_storage("sessions");
        assert_eq!(
            err.to_string(),
            "UNKNOWN_STORAGE: No storage engine registered under 'sessions'"
        );
        assert!(err.is(ErrorKind::UnknownStorage));
    }

    #[test]
    fn test_json_error_maps_to_codec() {
        let err: CacheError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind, ErrorKind::Codec);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_clone_drops_source() {
        let io = std::io::Error::other("disk gone");
        let err = CacheError::from(io);
        let cloned = err.clone();
        assert_eq!(cloned.kind, ErrorKind::Io);
        assert!(cloned.source.is_none());
    }
}
