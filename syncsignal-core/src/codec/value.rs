/*
    value.rs - Dynamic value model for synchronized state

    A JSON value extended with a first-class Date variant. Dates travel on
    the wire as `{"__type":"Date","value":"<ISO-8601>"}` and are restored on
    decode. A wrapper whose ISO text cannot be parsed degrades to the string
    `"Invalid Date: <original>"` instead of failing the whole payload.
*/

use crate::error::CodecError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Number, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::warn;

/// Tag used to mark wrapped dates
pub const DATE_TAG: &str = "Date";

/// `%Y` accepts a leading sign and more than four digits
const EXPANDED_YEAR_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Prefix of the placeholder produced for unparseable dates
pub const INVALID_DATE_PREFIX: &str = "Invalid Date: ";

/// A synchronized value: any JSON value plus dates, recursively
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SyncValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<SyncValue>),
    Object(BTreeMap<String, SyncValue>),
    /// Millisecond-precision UTC instant
    Date(DateTime<Utc>),
}

impl SyncValue {
    /// Build a date value, truncated to millisecond precision
    pub fn date(instant: DateTime<Utc>) -> Self {
        SyncValue::Date(truncate_to_millis(instant))
    }

    /// Empty object
    pub fn object() -> Self {
        SyncValue::Object(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SyncValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SyncValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SyncValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SyncValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SyncValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            SyncValue::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<SyncValue>> {
        match self {
            SyncValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, SyncValue>> {
        match self {
            SyncValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Member lookup on objects; `None` for anything else
    pub fn get(&self, key: &str) -> Option<&SyncValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Wire representation: dates rewritten into tagged wrappers
    pub fn to_json(&self) -> JsonValue {
        match self {
            SyncValue::Null => JsonValue::Null,
            SyncValue::Bool(b) => JsonValue::Bool(*b),
            SyncValue::Number(n) => JsonValue::Number(n.clone()),
            SyncValue::String(s) => JsonValue::String(s.clone()),
            SyncValue::Array(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            SyncValue::Object(map) => JsonValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            SyncValue::Date(d) => json!({
                "__type": DATE_TAG,
                "value": d.to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        }
    }

    /// Plain JSON view: dates become bare ISO strings
    pub fn to_plain_json(&self) -> JsonValue {
        match self {
            SyncValue::Array(items) => {
                JsonValue::Array(items.iter().map(Self::to_plain_json).collect())
            }
            SyncValue::Object(map) => JsonValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_plain_json())).collect(),
            ),
            SyncValue::Date(d) => JsonValue::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            other => other.to_json(),
        }
    }

    /// Inverse of [`SyncValue::to_json`]; tagged wrappers become dates
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SyncValue::Null,
            JsonValue::Bool(b) => SyncValue::Bool(b),
            JsonValue::Number(n) => SyncValue::Number(n),
            JsonValue::String(s) => SyncValue::String(s),
            JsonValue::Array(items) => {
                SyncValue::Array(items.into_iter().map(Self::from_json).collect())
            }
            JsonValue::Object(map) => {
                if let Some(raw) = tagged_date(&map) {
                    return match parse_date(raw) {
                        Some(instant) => SyncValue::Date(instant),
                        None => {
                            warn!(raw = raw, "Unparseable date in tagged wrapper");
                            SyncValue::String(format!("{}{}", INVALID_DATE_PREFIX, raw))
                        }
                    };
                }
                SyncValue::Object(map.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Convert any serializable Rust value
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        Ok(Self::from_json(serde_json::to_value(value)?))
    }

    /// Convert into a typed Rust value (dates are seen as ISO strings)
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(serde_json::from_value(self.to_plain_json())?)
    }
}

fn tagged_date(map: &serde_json::Map<String, JsonValue>) -> Option<&str> {
    match (map.get("__type"), map.get("value")) {
        (Some(JsonValue::String(tag)), Some(JsonValue::String(raw))) if tag == DATE_TAG => {
            Some(raw.as_str())
        }
        _ => None,
    }
}

/// RFC 3339, then the signed expanded-year form written for years outside
/// 0..=9999 (`+10000-01-01T00:00:00.000Z`), then a bare `YYYY-MM-DD`
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(truncate_to_millis(parsed.with_timezone(&Utc)));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, EXPANDED_YEAR_FORMAT) {
        return Some(truncate_to_millis(parsed.and_utc()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

impl Serialize for SyncValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SyncValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(SyncValue::from_json)
    }
}

impl From<JsonValue> for SyncValue {
    fn from(value: JsonValue) -> Self {
        SyncValue::from_json(value)
    }
}

impl From<bool> for SyncValue {
    fn from(b: bool) -> Self {
        SyncValue::Bool(b)
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for SyncValue {
                fn from(n: $t) -> Self {
                    SyncValue::Number(Number::from(n))
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<f64> for SyncValue {
    /// Non-finite floats have no JSON form and become `Null`
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(SyncValue::Number).unwrap_or(SyncValue::Null)
    }
}

impl From<String> for SyncValue {
    fn from(s: String) -> Self {
        SyncValue::String(s)
    }
}

impl From<&str> for SyncValue {
    fn from(s: &str) -> Self {
        SyncValue::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for SyncValue {
    fn from(instant: DateTime<Utc>) -> Self {
        SyncValue::date(instant)
    }
}

impl<T: Into<SyncValue>> From<Vec<T>> for SyncValue {
    fn from(items: Vec<T>) -> Self {
        SyncValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SyncValue>> From<Option<T>> for SyncValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SyncValue::Null)
    }
}

impl From<BTreeMap<String, SyncValue>> for SyncValue {
    fn from(map: BTreeMap<String, SyncValue>) -> Self {
        SyncValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_is_tagged_on_the_wire() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let value = SyncValue::date(instant);

        assert_eq!(
            value.to_json(),
            json!({"__type": "Date", "value": "2024-03-01T12:30:00.000Z"})
        );
    }

    #[test]
    fn test_nested_dates_restored() {
        let wire = json!({
            "created": {"__type": "Date", "value": "2024-03-01T12:30:00.000Z"},
            "history": [{"__type": "Date", "value": "2023-12-31T23:59:59.999Z"}],
        });

        let value = SyncValue::from_json(wire);
        let created = value.get("created").and_then(SyncValue::as_date).unwrap();
        assert_eq!(created.timestamp_millis(), 1_709_296_200_000);

        let history = value.get("history").and_then(SyncValue::as_array).unwrap();
        assert!(history[0].as_date().is_some());
    }

    #[test]
    fn test_invalid_date_degrades_to_placeholder() {
        let wire = json!({
            "ok": 1,
            "when": {"__type": "Date", "value": "not-a-date"},
        });

        let value = SyncValue::from_json(wire);
        assert_eq!(value.get("when").and_then(SyncValue::as_str), Some("Invalid Date: not-a-date"));
        assert_eq!(value.get("ok").and_then(SyncValue::as_i64), Some(1));
    }

    #[test]
    fn test_date_only_form_accepted() {
        let value = SyncValue::from_json(json!({"__type": "Date", "value": "2024-01-02"}));
        let instant = value.as_date().unwrap();
        assert_eq!(*instant, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_expanded_years_restored() {
        let far = Utc.with_ymd_and_hms(10000, 1, 1, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(999);
        let wire = SyncValue::date(far).to_json();
        assert_eq!(wire, json!({"__type": "Date", "value": "+10000-01-01T23:59:59.999Z"}));
        assert_eq!(SyncValue::from_json(wire), SyncValue::date(far));

        for year in [-262_000, -1, 0, 9_999, 262_000] {
            let instant = Utc.with_ymd_and_hms(year, 6, 15, 8, 0, 0).unwrap();
            let restored = SyncValue::from_json(SyncValue::date(instant).to_json());
            assert_eq!(restored.as_date(), Some(&instant), "year {}", year);
        }
    }

    #[test]
    fn test_non_date_tag_left_alone() {
        let wire = json!({"__type": "Map", "value": "x"});
        let value = SyncValue::from_json(wire.clone());
        assert_eq!(value.to_json(), wire);
    }

    #[test]
    fn test_date_truncated_to_millis() {
        let instant = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let value = SyncValue::from(instant);
        assert_eq!(value.as_date().unwrap().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert!(SyncValue::from(f64::NAN).is_null());
        assert_eq!(SyncValue::from(1.5).as_f64(), Some(1.5));
    }

    #[test]
    fn test_typed_bridge() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Prefs {
            theme: String,
            size: u32,
        }

        let prefs = Prefs { theme: "dark".to_string(), size: 14 };
        let value = SyncValue::from_serialize(&prefs).unwrap();
        assert_eq!(value.get("theme").and_then(SyncValue::as_str), Some("dark"));

        let back: Prefs = value.deserialize_into().unwrap();
        assert_eq!(back, prefs);
    }
}
