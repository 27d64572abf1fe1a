//! Per-engine serialization policy.

use serde::{Deserialize, Serialize};

/// Decides which values pass through an engine's value codec.
///
/// Resolved once when the engine is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationMode {
    /// Every value is encoded.
    #[default]
    Always,
    /// Integers are stored as plain decimal text so that native backend
    /// counters can operate on them; everything else is encoded.
    NonPrimitive,
    /// Values are stored as-is. Only engines that hold native values in
    /// process memory accept this mode.
    Passthrough,
}

impl SerializationMode {
    /// Whether integers bypass the codec.
    pub fn raw_integers(self) -> bool {
        matches!(self, Self::NonPrimitive)
    }
}

impl std::fmt::Display for SerializationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::NonPrimitive => write!(f, "non_primitive"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}
