//! Schema-free document model.
//!
//! A [`Document`] is a store-assigned id plus an ordered map of fields.
//! Field order is insertion order (`serde_json` is built with
//! `preserve_order`), which the normalizer and CSV exporter rely on.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered field map of a document.
pub type Fields = serde_json::Map<String, Value>;

pub const REVIEWED: &str = "reviewed";
pub const REVIEWED_BY: &str = "reviewedBy";
pub const REVIEWED_AT: &str = "reviewedAt";

/// Fields owned by the review mutator. Never shown as data columns.
pub const REVIEW_FIELDS: [&str; 3] = [REVIEWED, REVIEWED_BY, REVIEWED_AT];

/// Name of the id key in the serialized form.
pub const ID_KEY: &str = "id";

/// A document as read from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builds a document from a JSON object, taking `id` out of the fields.
    ///
    /// Returns `None` if `value` is not an object or has no string `id`.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(mut fields) => {
                let id = match fields.shift_remove(ID_KEY)? {
                    Value::String(s) => s,
                    _ => return None,
                };
                Some(Self { id, fields })
            }
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// `true` only when the `reviewed` field is the boolean `true`.
    pub fn is_reviewed(&self) -> bool {
        matches!(self.fields.get(REVIEWED), Some(Value::Bool(true)))
    }

    pub fn reviewed_by(&self) -> Option<&str> {
        self.fields.get(REVIEWED_BY).and_then(Value::as_str)
    }

    pub fn reviewed_at(&self) -> Option<&str> {
        self.fields.get(REVIEWED_AT).and_then(Value::as_str)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(!self.fields.contains_key(ID_KEY));
        let mut map = serializer.serialize_map(Some(self.fields.len() + extra))?;
        map.serialize_entry(ID_KEY, &self.id)?;
        for (k, v) in &self.fields {
            if k != ID_KEY {
                map.serialize_entry(k, v)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Document::from_json(value)
            .ok_or_else(|| de::Error::custom("document must be an object with a string `id`"))
    }
}

/// Formats a timestamp the way the store writes server-side clocks.
pub fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_puts_id_first() {
        let mut fields = Fields::new();
        fields.insert("b".into(), json!(1));
        fields.insert("a".into(), json!(2));
        let doc = Document::new("2024-01-02", fields);
        let text = serde_json::to_string(&doc).unwrap();
        assert_eq!(text, r#"{"id":"2024-01-02","b":1,"a":2}"#);
    }

    #[test]
    fn test_stored_id_field_is_not_emitted() {
        let mut fields = Fields::new();
        fields.insert("id".into(), json!("shadow"));
        fields.insert("x".into(), json!(true));
        let doc = Document::new("real", fields);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!({"id": "real", "x": true}));
    }

    #[test]
    fn test_from_json_requires_string_id() {
        assert!(Document::from_json(json!({"x": 1})).is_none());
        assert!(Document::from_json(json!({"id": 3})).is_none());
        let doc = Document::from_json(json!({"id": "a", "x": 1})).unwrap();
        assert_eq!(doc.id, "a");
        assert!(!doc.fields.contains_key("id"));
    }

    #[test]
    fn test_review_accessors() {
        let doc = Document::from_json(json!({
            "id": "d",
            "reviewed": true,
            "reviewedBy": "ana@example.com",
            "reviewedAt": "2024-05-01T10:00:00.000Z"
        }))
        .unwrap();
        assert!(doc.is_reviewed());
        assert_eq!(doc.reviewed_by(), Some("ana@example.com"));
        assert_eq!(doc.reviewed_at(), Some("2024-05-01T10:00:00.000Z"));

        let doc = Document::from_json(json!({"id": "d", "reviewed": "true"})).unwrap();
        assert!(!doc.is_reviewed());
    }
}
