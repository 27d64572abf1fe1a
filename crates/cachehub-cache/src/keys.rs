//! Physical key construction.
//!
//! Every engine namespaces caller keys with its prefix. Centralising the
//! rules here keeps the mapping identical across backends and guarantees that
//! two engines with different prefixes never produce the same physical key.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;

/// Separator between the prefix and the caller key.
const SEPARATOR: char = ':';

/// Extension of filesystem records.
pub const FILE_EXTENSION: &str = "cache";

/// Encoded file stems longer than this are replaced by a digest.
const MAX_FILE_STEM: usize = 200;

/// Marks digest-based names. Not part of the base64url alphabet.
const DIGEST_MARKER: char = '~';

/// Builds physical keys for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    /// Create a codec for `prefix`.
    ///
    /// The prefix doubles as a directory name for filesystem engines, so it
    /// must be a single, non-empty path segment without the key separator.
    pub fn new(prefix: impl Into<String>) -> CacheResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(CacheError::configuration("Key prefix must not be empty"));
        }
        if prefix == "." || prefix == ".." {
            return Err(CacheError::configuration(format!(
                "Key prefix '{prefix}' is not a valid scope name"
            )));
        }
        if let Some(bad) = prefix
            .chars()
            .find(|c| *c == SEPARATOR || *c == '/' || *c == '\\' || c.is_whitespace() || c.is_control())
        {
            return Err(CacheError::configuration(format!(
                "Key prefix '{prefix}' contains forbidden character {bad:?}"
            )));
        }
        Ok(Self { prefix })
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The prefix as a directory name.
    pub fn scope(&self) -> &str {
        &self.prefix
    }

    /// `"{prefix}:{key}"`.
    pub fn physical_key(&self, key: &str) -> String {
        format!("{}{SEPARATOR}{key}", self.prefix)
    }

    /// Glob pattern matching every physical key of this codec.
    pub fn pattern(&self) -> String {
        format!("{}{SEPARATOR}*", self.prefix)
    }

    /// Filesystem-safe file name for `key`, including the extension.
    pub fn file_name(&self, key: &str) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
        if encoded.len() <= MAX_FILE_STEM {
            format!("{encoded}.{FILE_EXTENSION}")
        } else {
            format!("{DIGEST_MARKER}{}.{FILE_EXTENSION}", digest_hex(key))
        }
    }

    /// Physical key safe for line-based wire protocols.
    ///
    /// Keys longer than `max_len` bytes or containing whitespace or control
    /// characters are replaced by a digest under the same prefix.
    pub fn wire_key(&self, key: &str, max_len: usize) -> String {
        let physical = self.physical_key(key);
        if physical.len() <= max_len && !physical.chars().any(|c| c.is_whitespace() || c.is_control()) {
            physical
        } else {
            format!("{}{SEPARATOR}{DIGEST_MARKER}{}", self.prefix, digest_hex(key))
        }
    }
}

/// Lowercase hex SHA-256 of `key`.
fn digest_hex(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_key() {
        let codec = KeyCodec::new("sessions").unwrap();
        assert_eq!(codec.physical_key("user:42"), "sessions:user:42");
        assert_eq!(codec.pattern(), "sessions:*");
    }

    #[test]
    fn test_prefixes_do_not_collide() {
        let a = KeyCodec::new("a").unwrap();
        let ab = KeyCodec::new("ab").unwrap();
        assert_ne!(a.physical_key("bc"), ab.physical_key("c"));
    }

    #[test]
    fn test_invalid_prefixes() {
        for prefix in ["", "a:b", "a/b", "..", "a b"] {
            assert!(KeyCodec::new(prefix).is_err(), "accepted {prefix:?}");
        }
    }

    #[test]
    fn test_file_name_is_path_safe() {
        let codec = KeyCodec::new("pages").unwrap();
        let name = codec.file_name("../../etc/passwd");
        assert!(name.ends_with(".cache"));
        assert!(!name.contains('/'));
        assert_ne!(codec.file_name("a"), codec.file_name("b"));
    }

    #[test]
    fn test_long_file_name_uses_digest() {
        let codec = KeyCodec::new("pages").unwrap();
        let name = codec.file_name(&"k".repeat(500));
        assert!(name.starts_with('~'));
        assert_eq!(name.len(), 1 + 64 + ".cache".len());
    }

    #[test]
    fn test_wire_key_hashes_unsafe_keys() {
        let codec = KeyCodec::new("mc").unwrap();
        assert_eq!(codec.wire_key("plain", 250), "mc:plain");
        let spaced = codec.wire_key("has space", 250);
        assert!(spaced.starts_with("mc:~"));
        assert!(!spaced.contains(' '));
        let long = codec.wire_key(&"x".repeat(300), 250);
        assert!(long.len() <= 250);
    }

    #[test]
    fn test_digest_is_lowercase_sha256_hex() {
        assert_eq!(
            digest_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let codec = KeyCodec::new("mc").unwrap();
        assert_eq!(
            codec.wire_key("a b", 250),
            format!("mc:~{}", digest_hex("a b"))
        );
    }
}
