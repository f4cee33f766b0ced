//! Tolerant field deserializers for push payloads.
//!
//! Routing only needs `type`; a malformed field must not cost the envelope.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Reads an identifier sent as a string or a number. Anything else is `None`.
pub(crate) fn id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Reads an object, treating `null` or any other shape as empty.
pub(crate) fn object<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// Reads a flag, treating `null` or a non-boolean as false.
pub(crate) fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "id")]
        id: Option<String>,
        #[serde(default, deserialize_with = "object")]
        data: Map<String, Value>,
        #[serde(default, deserialize_with = "flag")]
        on: bool,
    }

    #[test]
    fn test_id_shapes() {
        let s: Sample = serde_json::from_str(r#"{"id":"a-1"}"#).expect("string");
        assert_eq!(s.id.as_deref(), Some("a-1"));
        let s: Sample = serde_json::from_str(r#"{"id":42}"#).expect("number");
        assert_eq!(s.id.as_deref(), Some("42"));
        let s: Sample = serde_json::from_str(r#"{"id":null}"#).expect("null");
        assert!(s.id.is_none());
        let s: Sample = serde_json::from_str(r#"{"id":[1]}"#).expect("array");
        assert!(s.id.is_none());
        let s: Sample = serde_json::from_str("{}").expect("missing");
        assert!(s.id.is_none());
    }

    #[test]
    fn test_object_and_flag_shapes() {
        let s: Sample = serde_json::from_str(r#"{"data":null,"on":null}"#).expect("nulls");
        assert!(s.data.is_empty());
        assert!(!s.on);
        let s: Sample = serde_json::from_str(r#"{"data":{"k":1},"on":true}"#).expect("values");
        assert_eq!(s.data.get("k"), Some(&Value::from(1)));
        assert!(s.on);
    }
}
