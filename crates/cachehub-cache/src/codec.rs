//! Value serialization shared by every engine.
//!
//! A [`ValueCodec`] turns a [`Value`] into bytes in two stages: a
//! serialization format (JSON or MessagePack) followed by an optional gzip
//! transform. Decoding reverses both stages and fails loudly on malformed
//! input.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use cachehub_core::config::engine::{CodecConfig, ValueFormat};
use cachehub_core::error::{CacheError, ErrorKind};
use cachehub_core::result::CacheResult;
use cachehub_core::types::{SerializationMode, Value};

/// Serializes values for storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueCodec {
    format: ValueFormat,
    compress: bool,
}

impl ValueCodec {
    /// Create a codec.
    pub fn new(format: ValueFormat, compress: bool) -> Self {
        Self { format, compress }
    }

    /// Create a codec from engine configuration.
    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(config.format, config.compress)
    }

    /// Serialization format.
    pub fn format(&self) -> ValueFormat {
        self.format
    }

    /// Whether payloads are gzip-compressed.
    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Encode a value.
    pub fn encode(&self, value: &Value) -> CacheResult<Vec<u8>> {
        let serialized = match self.format {
            ValueFormat::Json => serde_json::to_vec(value)?,
            ValueFormat::Msgpack => rmp_serde::to_vec(value)?,
        };
        if !self.compress {
            return Ok(serialized);
        }
        gzip(&serialized)
            .map_err(|e| CacheError::with_source(ErrorKind::Codec, "Failed to compress payload", e))
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    pub fn decode(&self, bytes: &[u8]) -> CacheResult<Value> {
        let inflated;
        let serialized = if self.compress {
            let mut buf = Vec::with_capacity(bytes.len() * 2);
            GzDecoder::new(bytes)
                .read_to_end(&mut buf)
                .map_err(|e| CacheError::with_source(ErrorKind::Codec, "Failed to decompress payload", e))?;
            inflated = buf;
            inflated.as_slice()
        } else {
            bytes
        };
        let value = match self.format {
            ValueFormat::Json => serde_json::from_slice(serialized)?,
            ValueFormat::Msgpack => rmp_serde::from_slice(serialized)?,
        };
        Ok(value)
    }

    /// Encode according to an engine's serialization policy.
    ///
    /// Under [`SerializationMode::NonPrimitive`] integers are written as plain
    /// decimal text so backend counters can work on them.
    pub fn encode_stored(&self, mode: SerializationMode, value: &Value) -> CacheResult<Vec<u8>> {
        match raw_integer(mode, value) {
            Some(n) => Ok(n.to_string().into_bytes()),
            None => self.encode(value),
        }
    }

    /// Whether decimal text written by a backend counter reads back as that
    /// integer under `mode`.
    pub fn reads_counter_text(&self, mode: SerializationMode) -> bool {
        mode.raw_integers() || (self.format == ValueFormat::Json && !self.compress)
    }

    /// Reject a policy under which backend counters would not read back.
    pub fn check_native_counters(&self, mode: SerializationMode) -> CacheResult<()> {
        if self.reads_counter_text(mode) {
            return Ok(());
        }
        Err(CacheError::configuration(format!(
            "Serialization '{mode}' with {:?}{} cannot read backend counters; \
             use 'non_primitive' or uncompressed JSON",
            self.format,
            if self.compress { " and gzip" } else { "" }
        )))
    }

    /// Decode bytes written by [`encode_stored`](Self::encode_stored) or by a
    /// backend counter.
    pub fn decode_stored(&self, mode: SerializationMode, bytes: &[u8]) -> CacheResult<Value> {
        if mode.raw_integers() {
            if let Some(n) = parse_integer(bytes) {
                return Ok(Value::from(n));
            }
        }
        self.decode(bytes)
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::fast());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// The integer to store as plain text under `mode`, if any.
pub fn raw_integer(mode: SerializationMode, value: &Value) -> Option<i64> {
    if mode.raw_integers() { value.as_i64() } else { None }
}

/// Parse plain decimal text (optionally signed, surrounding whitespace allowed).
pub fn parse_integer(bytes: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Read an integer counter out of a decoded value.
pub fn counter_value(value: &Value) -> CacheResult<i64> {
    value
        .as_i64()
        .ok_or_else(|| CacheError::codec(format!("Stored value is not an integer: {value}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Value {
        json!({
            "name": "widget",
            "tags": ["a", "b"],
            "price": 9.5,
            "stock": -3,
            "meta": {"nested": [1, {"deep": null}], "ok": true}
        })
    }

    #[test]
    fn test_round_trip_all_codecs() {
        for format in [ValueFormat::Json, ValueFormat::Msgpack] {
            for compress in [false, true] {
                let codec = ValueCodec::new(format, compress);
                let bytes = codec.encode(&sample()).unwrap();
                assert_eq!(codec.decode(&bytes).unwrap(), sample(), "{format:?}/{compress}");
            }
        }
    }

    #[test]
    fn test_truncated_payload_is_codec_error() {
        for format in [ValueFormat::Json, ValueFormat::Msgpack] {
            for compress in [false, true] {
                let codec = ValueCodec::new(format, compress);
                let bytes = codec.encode(&sample()).unwrap();
                let err = codec.decode(&bytes[..bytes.len() / 2]).unwrap_err();
                assert_eq!(err.kind, ErrorKind::Codec, "{format:?}/{compress}");
            }
        }
    }

    #[test]
    fn test_non_primitive_mode_stores_plain_integers() {
        let codec = ValueCodec::new(ValueFormat::Msgpack, true);
        let bytes = codec
            .encode_stored(SerializationMode::NonPrimitive, &json!(-42))
            .unwrap();
        assert_eq!(bytes, b"-42");
        assert_eq!(
            codec.decode_stored(SerializationMode::NonPrimitive, &bytes).unwrap(),
            json!(-42)
        );

        let text = codec
            .encode_stored(SerializationMode::NonPrimitive, &json!("42"))
            .unwrap();
        assert_eq!(
            codec.decode_stored(SerializationMode::NonPrimitive, &text).unwrap(),
            json!("42")
        );
    }

    #[test]
    fn test_always_mode_encodes_integers() {
        let codec = ValueCodec::new(ValueFormat::Msgpack, false);
        let bytes = codec.encode_stored(SerializationMode::Always, &json!(7)).unwrap();
        assert_ne!(bytes, b"7");
        assert_eq!(codec.decode(&bytes).unwrap(), json!(7));
    }

    #[test]
    fn test_counter_text_compatibility() {
        let json = ValueCodec::new(ValueFormat::Json, false);
        assert!(json.check_native_counters(SerializationMode::Always).is_ok());
        assert_eq!(json.decode_stored(SerializationMode::Always, b"-12").unwrap(), json!(-12));

        for (format, compress) in [(ValueFormat::Msgpack, false), (ValueFormat::Json, true)] {
            let codec = ValueCodec::new(format, compress);
            assert!(codec.check_native_counters(SerializationMode::NonPrimitive).is_ok());
            let err = codec.check_native_counters(SerializationMode::Always).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Configuration, "{format:?}/{compress}");
        }
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer(b"15"), Some(15));
        assert_eq!(parse_integer(b"-5"), Some(-5));
        assert_eq!(parse_integer(b"15 \r\n"), Some(15));
        assert_eq!(parse_integer(b"1.5"), None);
        assert_eq!(parse_integer(b"-"), None);
        assert_eq!(parse_integer(b"\"3\""), None);
    }
}
