//! Document normalization for display.
//!
//! Turns a heterogeneous result set into rows of tagged fields and the
//! result-wide list of scalar columns. The store encodes some lists as
//! objects keyed `"0"`, `"1"`, ... ("pseudo-arrays"); these are rebuilt
//! into ordered sequences before anything else looks at them.

use serde::Serialize;
use serde_json::Value;

use crate::models::{Document, Fields, REVIEWED, REVIEWED_AT, REVIEWED_BY, REVIEW_FIELDS};

/// A field value after pseudo-array reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// String, number, boolean, or null.
    Scalar(Value),
    /// An ordered list: a real array or a rebuilt pseudo-array.
    Sequence(Vec<Value>),
    /// A mapping that is not a pseudo-array.
    Record(Fields),
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        if let Some(items) = as_sequence(value) {
            return FieldValue::Sequence(items);
        }
        match value {
            Value::Object(map) => FieldValue::Record(map.clone()),
            other => FieldValue::Scalar(other.clone()),
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, FieldValue::Sequence(_))
    }

    /// Display text for a grid cell.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Scalar(v) => value_text(v),
            FieldValue::Sequence(items) => Value::Array(items.clone()).to_string(),
            FieldValue::Record(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

/// Review metadata split out of the field map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub reviewed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
}

/// One normalized document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: String,
    pub review: ReviewState,
    /// Data fields in document order, review fields excluded.
    pub fields: Vec<(String, FieldValue)>,
}

impl Row {
    pub fn from_document(doc: &Document) -> Self {
        let review = ReviewState {
            reviewed: doc.is_reviewed(),
            reviewed_by: doc.reviewed_by().map(str::to_string),
            reviewed_at: doc.reviewed_at().map(str::to_string),
        };
        let fields = doc
            .fields
            .iter()
            .filter(|(k, _)| !REVIEW_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect();
        Self {
            id: doc.id.clone(),
            review,
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Sequence-valued fields in document order, skipping empty ones.
    pub fn sequences(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.fields.iter().filter_map(|(k, v)| match v {
            FieldValue::Sequence(items) if !items.is_empty() => Some((k.as_str(), items.as_slice())),
            _ => None,
        })
    }

    /// Marks the row reviewed with the values the store returned.
    pub fn mark_reviewed(&mut self, reviewed_by: &str, reviewed_at: &str) {
        self.review = ReviewState {
            reviewed: true,
            reviewed_by: Some(reviewed_by.to_string()),
            reviewed_at: Some(reviewed_at.to_string()),
        };
    }

    /// Rebuilds the document form, with pseudo-arrays as real arrays.
    pub fn to_document(&self) -> Document {
        let mut fields = Fields::new();
        for (k, v) in &self.fields {
            let json = match v {
                FieldValue::Scalar(v) => v.clone(),
                FieldValue::Sequence(items) => Value::Array(items.clone()),
                FieldValue::Record(map) => Value::Object(map.clone()),
            };
            fields.insert(k.clone(), json);
        }
        if self.review.reviewed {
            fields.insert(REVIEWED.into(), Value::Bool(true));
        }
        if let Some(by) = &self.review.reviewed_by {
            fields.insert(REVIEWED_BY.into(), Value::String(by.clone()));
        }
        if let Some(at) = &self.review.reviewed_at {
            fields.insert(REVIEWED_AT.into(), Value::String(at.clone()));
        }
        Document::new(self.id.clone(), fields)
    }
}

/// Normalized result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Normalized {
    pub rows: Vec<Row>,
    pub scalar_columns: Vec<String>,
}

/// Rebuilds an ordered list from an array or a pseudo-array.
///
/// A pseudo-array is a non-empty object whose keys all parse as
/// non-negative integers; values come back in ascending numeric key order.
/// Any other value returns `None`.
pub fn as_sequence(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) if !map.is_empty() => {
            let mut indexed = Vec::with_capacity(map.len());
            for (k, v) in map {
                indexed.push((k.parse::<u64>().ok()?, v));
            }
            indexed.sort_by_key(|(i, _)| *i);
            Some(indexed.into_iter().map(|(_, v)| v.clone()).collect())
        }
        _ => None,
    }
}

/// Normalizes a fetched result set.
///
/// `scalar_columns` is the union of field names in order of first
/// appearance, minus review fields, minus any name that is a sequence in
/// any row.
pub fn normalize(docs: &[Document]) -> Normalized {
    let rows: Vec<Row> = docs.iter().map(Row::from_document).collect();

    let mut seen: Vec<&str> = Vec::new();
    let mut sequence_valued: Vec<&str> = Vec::new();
    for row in &rows {
        for (name, value) in &row.fields {
            if !seen.contains(&name.as_str()) {
                seen.push(name);
            }
            if value.is_sequence() && !sequence_valued.contains(&name.as_str()) {
                sequence_valued.push(name);
            }
        }
    }

    let scalar_columns = seen
        .into_iter()
        .filter(|name| !sequence_valued.contains(name))
        .map(str::to_string)
        .collect();

    Normalized {
        rows,
        scalar_columns,
    }
}

/// String form of a JSON value: strings verbatim, null empty, others as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
