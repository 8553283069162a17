//! Payload codecs.
//!
//! A codec turns [`SessionData`] into the text stored in the payload column
//! and back. Decoding works on the raw stored bytes and is total: empty,
//! truncated, non-UTF-8 or foreign payloads decode to `None`, which the
//! record treats as "no prior data".

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::debug;

use crate::config::CodecKind;
use crate::error::CodecError;

/// Deserialized session state: string keys to arbitrary values.
pub type SessionData = serde_json::Map<String, Value>;

/// Encode/decode pair for the payload column.
pub trait SessionCodec: Send + Sync + fmt::Debug {
    fn kind(&self) -> CodecKind;

    fn encode(&self, data: &SessionData) -> Result<String, CodecError>;

    /// Must not fail; anything unreadable yields `None`.
    fn decode(&self, raw: &[u8]) -> Option<SessionData>;
}

/// MessagePack, Base64-armored so the payload fits text columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarshalCodec;

impl SessionCodec for MarshalCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Marshal
    }

    fn encode(&self, data: &SessionData) -> Result<String, CodecError> {
        let bytes = rmp_serde::to_vec(data)?;
        Ok(STANDARD.encode(bytes))
    }

    fn decode(&self, raw: &[u8]) -> Option<SessionData> {
        // Armored payloads written by other tools may be line-wrapped.
        let compact: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if compact.is_empty() {
            return None;
        }
        let bytes = match STANDARD.decode(&compact) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Session payload is not valid base64");
                return None;
            }
        };
        match rmp_serde::from_slice::<Value>(&bytes) {
            Ok(value) => into_map(value),
            Err(e) => {
                debug!(error = %e, "Session payload is not valid MessagePack");
                None
            }
        }
    }
}

/// Plain JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SessionCodec for JsonCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Json
    }

    fn encode(&self, data: &SessionData) -> Result<String, CodecError> {
        Ok(serde_json::to_string(data)?)
    }

    fn decode(&self, raw: &[u8]) -> Option<SessionData> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        match serde_json::from_slice::<Value>(raw) {
            Ok(value) => into_map(value),
            Err(e) => {
                debug!(error = %e, "Session payload is not valid JSON");
                None
            }
        }
    }
}

fn into_map(value: Value) -> Option<SessionData> {
    match value {
        Value::Object(map) => Some(map),
        other => {
            debug!(kind = value_kind(&other), "Session payload is not a map");
            None
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Codec instance for a configured kind.
#[must_use]
pub fn codec_for(kind: CodecKind) -> Arc<dyn SessionCodec> {
    match kind {
        CodecKind::Marshal => Arc::new(MarshalCodec),
        CodecKind::Json => Arc::new(JsonCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SessionData {
        let Value::Object(map) = json!({
            "user_id": 42,
            "flash": {"notice": "Saved"},
            "cart": [1, 2, 3],
            "ratio": 0.25,
            "admin": false,
            "note": null,
            "offset": -7,
            "name": "Zoë 東京"
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn marshal_roundtrip_preserves_values() {
        let codec = MarshalCodec;
        let data = sample();
        let raw = codec.encode(&data).unwrap();
        assert!(raw.is_ascii());
        assert_eq!(codec.decode(raw.as_bytes()), Some(data));
    }

    #[test]
    fn json_roundtrip_preserves_values() {
        let codec = JsonCodec;
        let data = sample();
        let raw = codec.encode(&data).unwrap();
        assert_eq!(codec.decode(raw.as_bytes()), Some(data));
    }

    #[test]
    fn empty_map_encodes_to_non_empty_payload() {
        let empty = SessionData::new();
        let raw = MarshalCodec.encode(&empty).unwrap();
        assert!(!raw.is_empty());
        assert_eq!(MarshalCodec.decode(raw.as_bytes()), Some(SessionData::new()));
        assert_eq!(JsonCodec.encode(&empty).unwrap(), "{}");
    }

    #[test]
    fn empty_payload_decodes_to_none() {
        assert_eq!(MarshalCodec.decode(b""), None);
        assert_eq!(MarshalCodec.decode(b" \n"), None);
        assert_eq!(JsonCodec.decode(b""), None);
        assert_eq!(JsonCodec.decode(b"\t "), None);
    }

    #[test]
    fn garbage_decodes_to_none() {
        assert_eq!(MarshalCodec.decode(b"\x00\x01not base64!!"), None);
        // valid base64, but not MessagePack for a map
        let armored = STANDARD.encode([0xc1, 0xff, 0x00]);
        assert_eq!(MarshalCodec.decode(armored.as_bytes()), None);
        assert_eq!(JsonCodec.decode(b"{\"unterminated\": "), None);
    }

    #[test]
    fn non_map_payloads_decode_to_none() {
        let list = STANDARD.encode(rmp_serde::to_vec(&json!([1, 2])).unwrap());
        assert_eq!(MarshalCodec.decode(list.as_bytes()), None);
        assert_eq!(JsonCodec.decode(b"\"just a string\""), None);
    }

    #[test]
    fn line_wrapped_base64_is_accepted() {
        let data = sample();
        let raw = MarshalCodec.encode(&data).unwrap();
        let wrapped: String = raw
            .as_bytes()
            .chunks(16)
            .map(|c| format!("{}\n", std::str::from_utf8(c).unwrap()))
            .collect();
        assert_eq!(MarshalCodec.decode(wrapped.as_bytes()), Some(data));
    }

    #[test]
    fn non_utf8_and_binary_payloads_decode_to_none() {
        // Foreign binary marshal dump, and bytes that are not UTF-8 at all.
        let binary: &[u8] = &[0x04, 0x08, 0x6f, 0x3a, 0x0a];
        let invalid_utf8: &[u8] = &[0xff, 0xfe, 0x00, 0xc3];
        for raw in [binary, invalid_utf8] {
            assert_eq!(MarshalCodec.decode(raw), None);
            assert_eq!(JsonCodec.decode(raw), None);
        }
        // JSON with an invalid UTF-8 sequence inside a string
        assert_eq!(JsonCodec.decode(b"{\"k\":\"\xff\"}"), None);
    }

    #[test]
    fn codec_for_selects_kind() {
        assert_eq!(codec_for(CodecKind::Marshal).kind(), CodecKind::Marshal);
        assert_eq!(codec_for(CodecKind::Json).kind(), CodecKind::Json);
    }
}
