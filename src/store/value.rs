//! Firestore typed-value decoding.
//!
//! The REST API wraps every field in a type tag
//! (`{"stringValue": "hi"}`, `{"mapValue": {"fields": {...}}}`, …). This
//! module flattens that representation into plain [`serde_json::Value`]s so
//! the rest of the crate can deserialize domain types with ordinary serde.

use serde_json::{Map, Value};

use crate::store::StoreError;

/// Decode a document's `fields` map into a plain JSON object.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Value, StoreError> {
    let mut out = Map::with_capacity(fields.len());
    for (key, tagged) in fields {
        out.insert(key.clone(), decode_value(tagged)?);
    }
    Ok(Value::Object(out))
}

/// Decode one tagged Firestore value.
pub fn decode_value(tagged: &Value) -> Result<Value, StoreError> {
    let obj = tagged
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("expected tagged value, got {tagged}")))?;

    let (tag, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| StoreError::Decode("empty tagged value".into()))?;

    match tag.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" => Ok(inner.clone()),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        // Firestore encodes 64-bit integers as JSON strings.
        "integerValue" => {
            let raw = inner
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| inner.to_string());
            raw.parse::<i64>()
                .map(Value::from)
                .map_err(|e| StoreError::Decode(format!("bad integerValue '{raw}': {e}")))
        }
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let decoded: Result<Vec<Value>, StoreError> =
                values.iter().map(decode_value).collect();
            Ok(Value::Array(decoded?))
        }
        "mapValue" => {
            let fields = inner.get("fields").and_then(Value::as_object);
            match fields {
                Some(map) => decode_fields(map),
                None => Ok(Value::Object(Map::new())),
            }
        }
        "geoPointValue" => Ok(inner.clone()),
        other => Err(StoreError::Decode(format!("unsupported value tag '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_scalars() {
        assert_eq!(decode_value(&json!({"stringValue": "hola"})).unwrap(), json!("hola"));
        assert_eq!(decode_value(&json!({"booleanValue": true})).unwrap(), json!(true));
        assert_eq!(decode_value(&json!({"integerValue": "42"})).unwrap(), json!(42));
        assert_eq!(decode_value(&json!({"nullValue": null})).unwrap(), Value::Null);
    }

    #[test]
    fn decodes_nested_map_and_array() {
        let tagged = json!({
            "mapValue": {"fields": {
                "keywords": {"arrayValue": {"values": [
                    {"stringValue": "hola"},
                    {"stringValue": "menu"}
                ]}},
                "answers": {"arrayValue": {"values": [{"stringValue": "Bienvenido"}]}}
            }}
        });
        let decoded = decode_value(&tagged).unwrap();
        assert_eq!(
            decoded,
            json!({"keywords": ["hola", "menu"], "answers": ["Bienvenido"]})
        );
    }

    #[test]
    fn empty_array_value_decodes_empty() {
        let decoded = decode_value(&json!({"arrayValue": {}})).unwrap();
        assert_eq!(decoded, json!([]));
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        let err = decode_value(&json!({"mysteryValue": 1})).unwrap_err();
        assert!(err.to_string().contains("mysteryValue"));
    }

    #[test]
    fn bad_integer_is_a_decode_error() {
        let err = decode_value(&json!({"integerValue": "forty-two"})).unwrap_err();
        assert!(err.to_string().contains("integerValue"));
    }
}
