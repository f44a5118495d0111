//! Storage abstraction for review-desk.
//!
//! The [`DocumentStore`] trait is the whole surface the domain code needs
//! from a document database: point reads, filtered queries, and atomic
//! write batches. Backends share one definition of write semantics through
//! [`apply_write`], so SQLite and in-memory stores behave identically.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod query;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{format_timestamp, Document, Fields};

pub use query::{Cursor, Filter, Query};

/// How a single field changes in an [`Write::Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the field with a value.
    Set(Value),
    /// Append each element not already present. A missing or non-array
    /// field becomes a new array.
    ArrayUnion(Vec<Value>),
    /// The store's clock at commit time, as an RFC 3339 string.
    ServerTimestamp,
}

/// One mutation inside a batch passed to [`DocumentStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replace the document, or deep-merge into it when `merge` is set.
    Set {
        collection: String,
        id: String,
        fields: Fields,
        merge: bool,
    },
    /// Create a document. Fails if it already exists.
    Create {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Change individual fields. Fails if the document does not exist.
    Update {
        collection: String,
        id: String,
        updates: Vec<(String, FieldUpdate)>,
    },
    /// Remove a document. Deleting a missing document succeeds.
    Delete { collection: String, id: String },
}

impl Write {
    pub fn target(&self) -> (&str, &str) {
        match self {
            Write::Set { collection, id, .. }
            | Write::Create { collection, id, .. }
            | Write::Update { collection, id, .. }
            | Write::Delete { collection, id } => (collection, id),
        }
    }
}

/// Applies `write` to the current state of its target document.
///
/// Returns the new state (`None` when deleted). `now` resolves
/// [`FieldUpdate::ServerTimestamp`].
pub fn apply_write(
    existing: Option<Fields>,
    write: &Write,
    now: DateTime<Utc>,
) -> Result<Option<Fields>> {
    match write {
        Write::Set {
            fields,
            merge: false,
            ..
        } => Ok(Some(fields.clone())),
        Write::Set {
            fields,
            merge: true,
            ..
        } => {
            let mut base = existing.unwrap_or_default();
            deep_merge(&mut base, fields);
            Ok(Some(base))
        }
        Write::Create {
            collection,
            id,
            fields,
        } => {
            if existing.is_some() {
                bail!("document already exists: {}/{}", collection, id);
            }
            Ok(Some(fields.clone()))
        }
        Write::Update {
            collection,
            id,
            updates,
        } => {
            let mut doc =
                existing.ok_or_else(|| anyhow!("no document to update: {}/{}", collection, id))?;
            for (field, update) in updates {
                let next = match update {
                    FieldUpdate::Set(v) => v.clone(),
                    FieldUpdate::ServerTimestamp => Value::String(format_timestamp(now)),
                    FieldUpdate::ArrayUnion(items) => {
                        let mut arr = match doc.get(field) {
                            Some(Value::Array(a)) => a.clone(),
                            _ => Vec::new(),
                        };
                        for item in items {
                            if !arr.contains(item) {
                                arr.push(item.clone());
                            }
                        }
                        Value::Array(arr)
                    }
                };
                doc.insert(field.clone(), next);
            }
            Ok(Some(doc))
        }
        Write::Delete { .. } => Ok(None),
    }
}

fn deep_merge(base: &mut Fields, incoming: &Fields) {
    for (k, v) in incoming {
        match (base.get_mut(k), v) {
            (Some(Value::Object(existing)), Value::Object(patch)) => deep_merge(existing, patch),
            _ => {
                base.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Abstract document database.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](DocumentStore::get) | Point read by collection and id |
/// | [`query`](DocumentStore::query) | Filtered, ordered, limited read |
/// | [`commit`](DocumentStore::commit) | Atomic batch of writes |
/// | [`update`](DocumentStore::update) | Single update, returning the new document |
/// | [`create`](DocumentStore::create) | Insert with a generated id |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable backend name for logs.
    fn backend(&self) -> &'static str;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Applies every write or none of them.
    ///
    /// Returns the state each write left its document in, in write order
    /// (`None` for deletes). Every server timestamp in the batch resolves
    /// to the same instant.
    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<Option<Document>>>;

    /// Clock used for server timestamps.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Updates fields of an existing document and returns the state the
    /// update wrote, not a later read.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<(String, FieldUpdate)>,
    ) -> Result<Document> {
        self.commit(vec![Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            updates,
        }])
        .await?
        .pop()
        .flatten()
        .ok_or_else(|| anyhow!("update of {}/{} produced no document", collection, id))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<()> {
        self.commit(vec![Write::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            merge,
        }])
        .await?;
        Ok(())
    }

    /// Inserts a document under a freshly generated id and returns the id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = new_id();
        self.commit(vec![Write::Create {
            collection: collection.to_string(),
            id: id.clone(),
            fields,
        }])
        .await?;
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.commit(vec![Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }])
        .await?;
        Ok(())
    }
}

/// Random document id: 32 lowercase hex characters.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_update_missing_document_fails() {
        let w = Write::Update {
            collection: "c".into(),
            id: "x".into(),
            updates: vec![("a".into(), FieldUpdate::Set(json!(1)))],
        };
        let err = apply_write(None, &w, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("no document to update: c/x"));
    }

    #[test]
    fn test_array_union_skips_duplicates() {
        let w = Write::Update {
            collection: "groups".into(),
            id: "g".into(),
            updates: vec![(
                "members".into(),
                FieldUpdate::ArrayUnion(vec![json!("b"), json!("c")]),
            )],
        };
        let out = apply_write(Some(fields(json!({"members": ["a", "b"]}))), &w, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(out["members"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_server_timestamp_uses_commit_clock() {
        let now = DateTime::parse_from_rfc3339("2024-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        let w = Write::Update {
            collection: "c".into(),
            id: "x".into(),
            updates: vec![("at".into(), FieldUpdate::ServerTimestamp)],
        };
        let out = apply_write(Some(Fields::new()), &w, now).unwrap().unwrap();
        assert_eq!(out["at"], json!("2024-03-04T05:06:07.000Z"));
    }

    #[test]
    fn test_merge_is_deep() {
        let w = Write::Set {
            collection: "organizations".into(),
            id: "o".into(),
            fields: fields(json!({"members": {"u2": {"role": "Member"}}})),
            merge: true,
        };
        let existing = fields(json!({"name": "Acme", "members": {"u1": {"role": "Owner"}}}));
        let out = apply_write(Some(existing), &w, Utc::now()).unwrap().unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"name": "Acme", "members": {"u1": {"role": "Owner"}, "u2": {"role": "Member"}}})
        );
    }

    #[test]
    fn test_create_rejects_existing() {
        let w = Write::Create {
            collection: "c".into(),
            id: "x".into(),
            fields: Fields::new(),
        };
        assert!(apply_write(Some(Fields::new()), &w, Utc::now()).is_err());
        assert!(apply_write(None, &w, Utc::now()).unwrap().is_some());
    }
}
