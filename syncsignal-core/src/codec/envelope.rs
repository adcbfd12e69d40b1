/*
    envelope.rs - The `{data, timestamp}` wire envelope

    The envelope is the only thing ever persisted or broadcast. Both
    transports carry the exact same JSON text.

    Validity: a JSON object with a `data` member (any value, null included)
    and a numeric `timestamp`. Fractional timestamps are truncated.
*/

use super::value::SyncValue;
use crate::error::CodecError;
use crate::types::Timestamp;
use serde_json::{Map, Value as JsonValue};

/// One synchronization event
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub data: SyncValue,
    pub timestamp: Timestamp,
}

impl Envelope {
    pub fn new(data: SyncValue, timestamp: Timestamp) -> Self {
        Envelope { data, timestamp }
    }
}

/// Serialize a bare value to wire text
pub fn encode_value(value: &SyncValue) -> String {
    value.to_json().to_string()
}

/// Parse wire text into a value, restoring tagged dates
pub fn decode_value(text: &str) -> Result<SyncValue, CodecError> {
    let json: JsonValue = serde_json::from_str(text)?;
    Ok(SyncValue::from_json(json))
}

/// Serialize an envelope to wire text
pub fn encode_envelope(envelope: &Envelope) -> String {
    let mut map = Map::new();
    map.insert("data".to_string(), envelope.data.to_json());
    map.insert("timestamp".to_string(), JsonValue::from(envelope.timestamp.as_millis()));
    JsonValue::Object(map).to_string()
}

/// Parse and shape-check wire text
pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    let json: JsonValue = serde_json::from_str(text)?;

    let JsonValue::Object(mut map) = json else {
        return Err(CodecError::InvalidShape("envelope is not an object".to_string()));
    };

    let timestamp = match map.get("timestamp") {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| CodecError::InvalidShape(format!("timestamp out of range: {}", n)))?,
        Some(other) => {
            return Err(CodecError::InvalidShape(format!("timestamp is not numeric: {}", other)))
        }
        None => return Err(CodecError::InvalidShape("missing timestamp".to_string())),
    };

    let data = map
        .remove("data")
        .ok_or_else(|| CodecError::InvalidShape("missing data".to_string()))?;

    Ok(Envelope {
        data: SyncValue::from_json(data),
        timestamp: Timestamp::from_millis(timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(SyncValue::from(json!({"count": 1})), Timestamp::from_millis(42));
        let text = encode_envelope(&envelope);
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed, json!({"data": {"count": 1}, "timestamp": 42}));
    }

    #[test]
    fn test_envelope_with_date_round_trip() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let mut data = std::collections::BTreeMap::new();
        data.insert("at".to_string(), SyncValue::date(instant));
        let envelope = Envelope::new(SyncValue::Object(data), Timestamp::from_millis(7));

        let decoded = decode_envelope(&encode_envelope(&envelope)).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_null_data_is_valid() {
        let decoded = decode_envelope(r#"{"data": null, "timestamp": 5}"#).unwrap();
        assert!(decoded.data.is_null());
        assert_eq!(decoded.timestamp, Timestamp::from_millis(5));
    }

    #[test]
    fn test_fractional_timestamp_truncated() {
        let decoded = decode_envelope(r#"{"data": 1, "timestamp": 10.9}"#).unwrap();
        assert_eq!(decoded.timestamp.as_millis(), 10);
    }

    #[test]
    fn test_shape_violations() {
        let cases = [
            r#"[1, 2]"#,
            r#""text""#,
            r#"{"data": 1}"#,
            r#"{"timestamp": 1}"#,
            r#"{"data": 1, "timestamp": "1"}"#,
            r#"{"data": 1, "timestamp": null}"#,
        ];

        for case in cases {
            let err = decode_envelope(case).unwrap_err();
            assert!(matches!(err, CodecError::InvalidShape(_)), "case {} gave {:?}", case, err);
        }
    }

    #[test]
    fn test_syntax_error_propagates() {
        let err = decode_envelope("{\"data\": ").unwrap_err();
        assert!(matches!(err, CodecError::Syntax(_)));

        assert!(decode_value("nope").is_err());
    }

    #[test]
    fn test_bare_value_codec() {
        let value = SyncValue::from(vec![1, 2, 3]);
        assert_eq!(encode_value(&value), "[1,2,3]");
        assert_eq!(decode_value("[1,2,3]").unwrap(), value);
    }
}
