//! Default envelope schema
//!
//! JSON side:
//!
//! ```json
//! {"id": 1, "op": "ping", "payload": {"any": "json"}}
//! ```
//!
//! Protobuf side:
//!
//! ```proto
//! message Envelope {
//!   optional uint64 id = 1;
//!   string op = 2;
//!   optional bytes payload = 3; // compact JSON text
//! }
//! ```
//!
//! `id` and `payload` keep explicit presence so both directions round-trip
//! field for field. A JSON `"payload": null` is present and travels as the
//! bytes `null`; a missing `payload` leaves field 3 out.

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::wire::{self, WireType};
use super::MessageConverter;
use crate::common::ConversionError;

const FIELD_ID: u32 = 1;
const FIELD_OP: u32 = 2;
const FIELD_PAYLOAD: u32 = 3;

/// One application message, as exchanged with clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Operation name
    pub op: String,
    /// Operation arguments or result
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Keep an explicit `null` as `Some(Value::Null)`
///
/// Plain `Option<Value>` folds `null` into `None`, which would drop the field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Serialize into protobuf wire format
    pub fn to_protobuf(&self) -> Result<Vec<u8>, ConversionError> {
        let mut buf = Vec::with_capacity(self.op.len() + 16);
        if let Some(id) = self.id {
            wire::put_varint_field(&mut buf, FIELD_ID, id);
        }
        wire::put_bytes_field(&mut buf, FIELD_OP, self.op.as_bytes());
        if let Some(payload) = &self.payload {
            let json = serde_json::to_vec(payload)
                .map_err(|e| ConversionError::InvalidPayload(e.to_string()))?;
            wire::put_bytes_field(&mut buf, FIELD_PAYLOAD, &json);
        }
        Ok(buf)
    }

    /// Parse from protobuf wire format
    ///
    /// Last occurrence wins for repeated scalar fields and unknown fields are
    /// skipped, as protobuf parsers do. A repeated known field usually means
    /// two backend messages arrived in one read, so it is logged.
    pub fn from_protobuf(mut input: &[u8]) -> Result<Self, ConversionError> {
        let mut envelope = Envelope { id: None, op: String::new(), payload: None };
        let mut seen = [false; 3];

        while !input.is_empty() {
            let (field, wire_type) = wire::get_tag(&mut input)?;
            if (FIELD_ID..=FIELD_PAYLOAD).contains(&field) {
                let slot = field as usize - 1;
                if seen[slot] {
                    debug!("Envelope field {} repeated, keeping the last value; were two messages read at once?", field);
                }
                seen[slot] = true;
            }
            match (field, wire_type) {
                (FIELD_ID, WireType::Varint) => {
                    envelope.id = Some(wire::get_varint(&mut input)?);
                }
                (FIELD_OP, WireType::LengthDelimited) => {
                    let raw = wire::get_bytes(&mut input)?;
                    envelope.op = std::str::from_utf8(raw)
                        .map_err(|_| ConversionError::InvalidUtf8(FIELD_OP))?
                        .to_string();
                }
                (FIELD_PAYLOAD, WireType::LengthDelimited) => {
                    let raw = wire::get_bytes(&mut input)?;
                    let value = serde_json::from_slice(raw)
                        .map_err(|e| ConversionError::InvalidPayload(e.to_string()))?;
                    envelope.payload = Some(value);
                }
                (FIELD_ID | FIELD_OP | FIELD_PAYLOAD, wire_type) => {
                    return Err(ConversionError::InvalidWireType { field, wire_type: wire_type.bits() });
                }
                (_, wire_type) => wire::skip_field(&mut input, wire_type)?,
            }
        }

        Ok(envelope)
    }
}

/// Converter for the [`Envelope`] schema
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeConverter;

impl MessageConverter for EnvelopeConverter {
    fn encode_to_binary(&self, text: &[u8]) -> Result<Vec<u8>, ConversionError> {
        let envelope: Envelope = serde_json::from_slice(text)
            .map_err(|e| ConversionError::InvalidJson(e.to_string()))?;
        envelope.to_protobuf()
    }

    fn decode_to_text(&self, binary: &[u8]) -> Result<String, ConversionError> {
        let envelope = Envelope::from_protobuf(binary)?;
        serde_json::to_string(&envelope).map_err(|e| ConversionError::InvalidPayload(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "envelope"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_value(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_ping_encoding() {
        let binary = EnvelopeConverter.encode_to_binary(br#"{"id":1,"op":"ping"}"#).unwrap();
        // id = 1 (field 1, varint), op = "ping" (field 2, length-delimited)
        assert_eq!(binary, vec![0x08, 0x01, 0x12, 0x04, b'p', b'i', b'n', b'g']);
    }

    #[test]
    fn test_json_round_trip() {
        let samples = [
            r#"{"id":1,"op":"ping"}"#,
            r#"{"op":"hello"}"#,
            r#"{"id":0,"op":""}"#,
            r#"{"id":18446744073709551615,"op":"max"}"#,
            r#"{"id":7,"op":"put","payload":{"key":"k","values":[1,2.5,null,true],"nested":{"a":"ü"}}}"#,
            r#"{"op":"scalar","payload":"just a string"}"#,
            r#"{"op":"x","payload":null}"#,
        ];

        for sample in samples {
            let binary = EnvelopeConverter.encode_to_binary(sample.as_bytes()).unwrap();
            let text = EnvelopeConverter.decode_to_text(&binary).unwrap();
            assert_eq!(as_value(&text), as_value(sample), "round trip of {}", sample);
        }
    }

    #[test]
    fn test_binary_round_trip() {
        let envelope = Envelope { id: Some(42), op: "pong".to_string(), payload: Some(json!({"ok": true})) };
        let binary = envelope.to_protobuf().unwrap();

        let text = EnvelopeConverter.decode_to_text(&binary).unwrap();
        let again = EnvelopeConverter.encode_to_binary(text.as_bytes()).unwrap();
        assert_eq!(Envelope::from_protobuf(&again).unwrap(), envelope);
        assert_eq!(again, binary);
    }

    #[test]
    fn test_null_payload_is_kept() {
        let binary = EnvelopeConverter.encode_to_binary(br#"{"op":"x","payload":null}"#).unwrap();
        // field 3 carries the JSON text `null`
        assert_eq!(binary, vec![0x12, 0x01, b'x', 0x1a, 0x04, b'n', b'u', b'l', b'l']);

        let envelope = Envelope::from_protobuf(&binary).unwrap();
        assert_eq!(envelope.payload, Some(Value::Null));

        // absent and null stay distinct
        let absent = EnvelopeConverter.encode_to_binary(br#"{"op":"x"}"#).unwrap();
        assert_eq!(absent, vec![0x12, 0x01, b'x']);
        assert_eq!(as_value(&EnvelopeConverter.decode_to_text(&absent).unwrap()), json!({"op": "x"}));
    }

    #[test]
    fn test_repeated_fields_last_wins() {
        // two envelopes read back to back look like one with repeated fields
        let mut binary = Envelope { id: Some(1), op: "first".to_string(), payload: None }.to_protobuf().unwrap();
        binary.extend(Envelope { id: Some(2), op: "second".to_string(), payload: None }.to_protobuf().unwrap());

        let envelope = Envelope::from_protobuf(&binary).unwrap();
        assert_eq!(envelope.id, Some(2));
        assert_eq!(envelope.op, "second");
    }

    #[test]
    fn test_malformed_json_rejected() {
        let inputs: [&[u8]; 5] = [br#"{"id":}"#, b"not json", br#"{"id":1}"#, br#"{"op":"x","extra":1}"#, b"[1,2]"];
        for bad in inputs {
            let err = EnvelopeConverter.encode_to_binary(bad).unwrap_err();
            assert!(matches!(err, ConversionError::InvalidJson(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_bad_binary_rejected() {
        // truncated op
        assert_eq!(EnvelopeConverter.decode_to_text(&[0x12, 0x05, b'p']), Err(ConversionError::Truncated));
        // id sent as length-delimited
        assert_eq!(
            EnvelopeConverter.decode_to_text(&[0x0a, 0x00]),
            Err(ConversionError::InvalidWireType { field: 1, wire_type: 2 })
        );
        // op is not UTF-8
        assert_eq!(EnvelopeConverter.decode_to_text(&[0x12, 0x01, 0xff]), Err(ConversionError::InvalidUtf8(2)));
        // payload is not JSON
        assert!(matches!(
            EnvelopeConverter.decode_to_text(&[0x1a, 0x01, b'{']),
            Err(ConversionError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_unknown_fields_skipped() {
        let mut binary = Envelope { id: Some(3), op: "x".to_string(), payload: None }.to_protobuf().unwrap();
        wire::put_varint_field(&mut binary, 15, 99);
        wire::put_bytes_field(&mut binary, 16, b"future");

        let text = EnvelopeConverter.decode_to_text(&binary).unwrap();
        assert_eq!(as_value(&text), json!({"id": 3, "op": "x"}));
    }

    #[test]
    fn test_concurrent_use() {
        let converter = std::sync::Arc::new(EnvelopeConverter);
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let converter = converter.clone();
                std::thread::spawn(move || {
                    for j in 0..200u64 {
                        let text = format!(r#"{{"id":{},"op":"t{}"}}"#, i * 1000 + j, i);
                        let binary = converter.encode_to_binary(text.as_bytes()).unwrap();
                        let back = converter.decode_to_text(&binary).unwrap();
                        assert_eq!(as_value(&back), as_value(&text));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
