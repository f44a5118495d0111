//! Loading documents from JSON files into the local store.
//!
//! Accepts either an array of objects, each with a string `id`, or an
//! object mapping ids to field objects. Array entries without an `id` get a
//! generated one. Existing documents with the same id are replaced.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use review_desk_core::models::Document;
use review_desk_core::store::{new_id, DocumentStore, Write};

/// Parses an import file into documents.
pub fn parse_documents(value: Value) -> Result<Vec<Document>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(mut fields) => {
                    let id = match fields.shift_remove("id") {
                        Some(Value::String(id)) if !id.is_empty() => id,
                        Some(Value::Number(n)) => n.to_string(),
                        None => new_id(),
                        Some(other) => bail!("entry {}: unusable id {}", i, other),
                    };
                    Ok(Document::new(id, fields))
                }
                _ => bail!("entry {} is not an object", i),
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(id, item)| match item {
                Value::Object(fields) => Ok(Document::new(id, fields)),
                _ => bail!("document {} is not an object", id),
            })
            .collect(),
        _ => bail!("import file must hold a JSON array or object"),
    }
}

/// Writes documents into `collection` in one batch.
pub async fn import_documents(
    store: &dyn DocumentStore,
    collection: &str,
    docs: Vec<Document>,
) -> Result<usize> {
    let count = docs.len();
    let writes = docs
        .into_iter()
        .map(|d| Write::Set {
            collection: collection.to_string(),
            id: d.id,
            fields: d.fields,
            merge: false,
        })
        .collect();
    store.commit(writes).await?;
    tracing::info!(collection, count, "documents imported");
    Ok(count)
}

pub async fn run_import(store: &dyn DocumentStore, collection: &str, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let docs = parse_documents(value)?;
    let count = import_documents(store, collection, docs).await?;
    println!("imported {} document(s) into {}", count, collection);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_desk_core::store::memory::InMemoryStore;
    use serde_json::json;

    #[test]
    fn test_parse_array_and_map_forms() {
        let docs = parse_documents(json!([
            {"id": "2024-01-01", "total": 1},
            {"total": 2},
            {"id": 7}
        ]))
        .unwrap();
        assert_eq!(docs[0].id, "2024-01-01");
        assert_eq!(docs[1].id.len(), 32);
        assert_eq!(docs[2].id, "7");
        assert!(docs[0].get("id").is_none());

        let docs = parse_documents(json!({"a": {"x": 1}, "b": {"x": 2}})).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].id, "b");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(parse_documents(json!("nope")).is_err());
        assert!(parse_documents(json!([1])).is_err());
        assert!(parse_documents(json!([{"id": true}])).is_err());
    }

    #[tokio::test]
    async fn test_import_replaces_existing() {
        let store = InMemoryStore::new();
        let first = parse_documents(json!([{"id": "a", "x": 1, "y": 1}])).unwrap();
        import_documents(&store, "c", first).await.unwrap();
        let second = parse_documents(json!([{"id": "a", "x": 2}])).unwrap();
        import_documents(&store, "c", second).await.unwrap();

        let a = store.get("c", "a").await.unwrap().unwrap();
        assert_eq!(a.get("x"), Some(&json!(2)));
        assert!(a.get("y").is_none());
    }
}
