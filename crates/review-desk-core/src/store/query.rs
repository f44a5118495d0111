//! Store-level query description and its reference evaluation.
//!
//! Backends may push parts of a [`Query`] down into their native query
//! language, but the results must match [`Query::apply`], which is the
//! in-memory definition of every filter, ordering, cursor, and limit.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::Document;

/// A single predicate on a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`.
    Eq { field: String, value: Value },
    /// `field` is an array containing `value`.
    ArrayContains { field: String, value: Value },
    /// Document id in `[start, end]`, compared lexicographically.
    IdRange { start: String, end: String },
    /// `start <= field <= end`. Only values of the same type as the bounds match.
    FieldRange {
        field: String,
        start: Value,
        end: Value,
    },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn id_range(start: impl Into<String>, end: impl Into<String>) -> Self {
        Filter::IdRange {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn field_range(
        field: impl Into<String>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        Filter::FieldRange {
            field: field.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq { field, value } => doc.get(field) == Some(value),
            Filter::ArrayContains { field, value } => match doc.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
            Filter::IdRange { start, end } => {
                doc.id.as_str() >= start.as_str() && doc.id.as_str() <= end.as_str()
            }
            Filter::FieldRange { field, start, end } => match doc.get(field) {
                Some(v) => {
                    matches!(
                        same_type_cmp(v, start),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        same_type_cmp(v, end),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
                None => false,
            },
        }
    }
}

/// Position to resume an ordered query after.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub id: String,
    /// Value of the `order_by` field on the cursor document.
    pub order_value: Option<Value>,
}

impl Cursor {
    /// Builds a cursor from a document and the field the query orders by.
    pub fn after(doc: &Document, order_by: Option<&str>) -> Self {
        Self {
            id: doc.id.clone(),
            order_value: order_by.and_then(|f| doc.get(f).cloned()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
    pub start_after: Option<Cursor>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// The id bounds implied by the filters, for backends that index ids.
    pub fn id_bounds(&self) -> Option<(&str, &str)> {
        self.filters.iter().find_map(|f| match f {
            Filter::IdRange { start, end } => Some((start.as_str(), end.as_str())),
            _ => None,
        })
    }

    /// Filters, orders, applies the cursor, and truncates `docs`.
    ///
    /// Without `order_by`, results are ordered by id. With `order_by`,
    /// documents lacking the field are excluded and ties break on id.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        match &self.order_by {
            Some(field) => {
                out.retain(|d| d.get(field).is_some());
                out.sort_by(|a, b| {
                    total_cmp(&a.fields[field.as_str()], &b.fields[field.as_str()])
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
            None => out.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(cursor) = &self.start_after {
            let order_by = self.order_by.as_deref();
            out.retain(|d| self.is_after(d, cursor, order_by));
        }

        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }

    fn is_after(&self, doc: &Document, cursor: &Cursor, order_by: Option<&str>) -> bool {
        let by_value = match (order_by, &cursor.order_value) {
            (Some(field), Some(cursor_value)) => match doc.get(field) {
                Some(v) => total_cmp(v, cursor_value),
                None => Ordering::Less,
            },
            _ => Ordering::Equal,
        };
        by_value.then_with(|| doc.id.as_str().cmp(cursor.id.as_str())) == Ordering::Greater
    }
}

/// Compares two values only when they have the same JSON type.
fn same_type_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order across JSON values: by type first, then by value.
fn total_cmp(a: &Value, b: &Value) -> Ordering {
    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| same_type_cmp(a, b).unwrap_or(Ordering::Equal))
}
