//! Pluggable value encoding for the remote provider
//!
//! The remote backend stores opaque strings; a `ValueCodec` turns a full
//! `CacheEntry` (value plus expiry bookkeeping) into that string and back.
//! The envelope carries `timestamp` and `ttl_seconds` so expiry can be
//! re-validated locally on read; the backend's own TTL clock is advisory.
//!
//! The default `JsonCodec` uses a self-describing JSON envelope. Swapping
//! in a different encoding only requires a new `ValueCodec` implementation;
//! callers and the provider interface are untouched.

use crate::errors::{CacheError, ProviderResult};
use crate::types::CacheEntry;
use serde_json::Value;

/// Encoding seam between `CacheEntry` and the remote backend's string values
pub trait ValueCodec: Send + Sync {
    /// Codec name, for logging and diagnostics
    fn name(&self) -> &'static str;

    /// Encode an entry into the backend's wire representation
    fn encode(&self, entry: &CacheEntry<Value>) -> ProviderResult<String>;

    /// Decode a raw backend value back into an entry
    fn decode(&self, raw: &str) -> ProviderResult<CacheEntry<Value>>;
}

/// Default self-describing JSON envelope codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ValueCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, entry: &CacheEntry<Value>) -> ProviderResult<String> {
        serde_json::to_string(entry).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn decode(&self, raw: &str) -> ProviderResult<CacheEntry<Value>> {
        serde_json::from_str(raw).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonCodec::new();
        let entry = CacheEntry::new(json!({"id": 7, "name": "widget"}), 120, None);

        let raw = codec.encode(&entry).unwrap();
        let decoded = codec.decode(&raw).unwrap();

        assert_eq!(decoded.value, entry.value);
        assert_eq!(decoded.ttl_seconds, 120);
        assert_eq!(decoded.timestamp, entry.timestamp);
    }

    #[test]
    fn test_json_codec_preserves_metadata() {
        let codec = JsonCodec::new();
        let entry = CacheEntry::new(json!([1, 2, 3]), 60, Some(json!({"tag": "warm"})));

        let decoded = codec.decode(&codec.encode(&entry).unwrap()).unwrap();
        assert_eq!(decoded.metadata, Some(json!({"tag": "warm"})));
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonCodec::new();
        let err = codec.decode("not json at all").unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn test_codec_name() {
        assert_eq!(JsonCodec::new().name(), "json");
    }
}
