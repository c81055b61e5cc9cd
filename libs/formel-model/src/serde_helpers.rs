//! Shared Serde helpers
//!
//! Interchange documents write numbers either natively or as decimal
//! strings (`"quantity": "100.000"`). These helpers accept both:
//! - Native number `12.5` → 12.5
//! - String number `"12.5"` → 12.5
//! - `null` / `""` → None (optional variants only)

use serde::{Deserialize, Deserializer, Serializer};

/// Default value: 1.0 (scaling factors)
pub fn scale_one() -> f64 {
    1.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrFloat {
    Float(f64),
    String(String),
}

fn finite(value: f64) -> Result<f64, String> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("non-finite number: {}", value))
    }
}

/// Decimal text; `NaN` and infinities are not numbers on the wire
fn parse_finite(text: &str) -> Result<f64, String> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid number: '{}'", text))
        .and_then(finite)
}

/// Deserialize an f64 given as number or numeric string
pub fn deserialize_f64_flexible<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match StringOrFloat::deserialize(deserializer)? {
        StringOrFloat::Float(f) => finite(f).map_err(D::Error::custom),
        StringOrFloat::String(s) => parse_finite(&s).map_err(D::Error::custom),
    }
}

/// Deserialize an optional f64 given as number, numeric string, null or ""
pub fn deserialize_optional_f64_flexible<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<StringOrFloat>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrFloat::Float(f)) => finite(f).map(Some).map_err(D::Error::custom),
        Some(StringOrFloat::String(s)) if s.trim().is_empty() => Ok(None),
        Some(StringOrFloat::String(s)) => parse_finite(&s).map(Some).map_err(D::Error::custom),
    }
}

/// Serialize an f64 as its shortest decimal string (`5.0` → `"5"`)
pub fn serialize_f64_as_string<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is acceptable in tests
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Deserialize, Serialize)]
    struct Quantity {
        #[serde(
            deserialize_with = "deserialize_f64_flexible",
            serialize_with = "serialize_f64_as_string"
        )]
        value: f64,
    }

    #[derive(Deserialize)]
    struct OptionalValue {
        #[serde(default, deserialize_with = "deserialize_optional_f64_flexible")]
        value: Option<f64>,
    }

    #[test]
    fn test_flexible_number() {
        let q: Quantity = serde_json::from_str(r#"{"value": "100.000"}"#).unwrap();
        assert_eq!(q.value, 100.0);
        let q: Quantity = serde_json::from_str(r#"{"value": 7}"#).unwrap();
        assert_eq!(q.value, 7.0);
        assert!(serde_json::from_str::<Quantity>(r#"{"value": "abc"}"#).is_err());
    }

    #[test]
    fn test_flexible_number_rejects_non_finite() {
        for text in ["NaN", "nan", "inf", "-inf", "infinity", " Infinity "] {
            let json = format!(r#"{{"value": "{}"}}"#, text);
            let err = serde_json::from_str::<Quantity>(&json).unwrap_err();
            assert!(err.to_string().contains("non-finite"), "{}", text);
            assert!(serde_json::from_str::<OptionalValue>(&json).is_err(), "{}", text);
        }
        let q: Quantity = serde_json::from_str(r#"{"value": "-0.5"}"#).unwrap();
        assert_eq!(q.value, -0.5);
    }

    #[test]
    fn test_serialize_as_string() {
        let json = serde_json::to_string(&Quantity { value: 12.5 }).unwrap();
        assert_eq!(json, r#"{"value":"12.5"}"#);
    }

    #[test]
    fn test_optional_number() {
        let v: OptionalValue = serde_json::from_str(r#"{"value": ""}"#).unwrap();
        assert_eq!(v.value, None);
        let v: OptionalValue = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(v.value, None);
        let v: OptionalValue = serde_json::from_str(r#"{"value": null}"#).unwrap();
        assert_eq!(v.value, None);
        let v: OptionalValue = serde_json::from_str(r#"{"value": "0.02"}"#).unwrap();
        assert_eq!(v.value, Some(0.02));
    }
}
