//! In-memory [`DocumentStore`] implementation for tests and demos.
//!
//! Collections are `BTreeMap`s keyed by id behind one `std::sync::RwLock`,
//! so a batch commit holds the write lock for its whole duration.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Document, Fields};

use super::{apply_write, DocumentStore, Query, Write};

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// In-memory store.
pub struct InMemoryStore {
    collections: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds a collection with documents, replacing any with the same id.
    pub fn with_documents(self, collection: &str, docs: impl IntoIterator<Item = Document>) -> Self {
        if let Ok(mut guard) = self.collections.write() {
            let coll = guard.entry(collection.to_string()).or_default();
            for doc in docs {
                coll.insert(doc.id, doc.fields);
            }
        }
        self
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self
            .collections
            .read()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(guard
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let guard = self
            .collections
            .read()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        let docs = match guard.get(collection) {
            Some(c) => c
                .iter()
                .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };
        Ok(query.apply(docs))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<Option<Document>>> {
        let now = self.now();
        let mut guard = self
            .collections
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;

        // Stage every write first so a failure leaves the store untouched.
        let mut staged: Vec<((String, String), Option<Fields>)> = Vec::new();
        for write in &writes {
            let (collection, id) = write.target();
            let current = staged
                .iter()
                .rev()
                .find(|((c, i), _)| c == collection && i == id)
                .map(|(_, state)| state.clone())
                .unwrap_or_else(|| guard.get(collection).and_then(|c| c.get(id)).cloned());
            let next = apply_write(current, write, now)?;
            staged.push(((collection.to_string(), id.to_string()), next));
        }

        let applied: Vec<Option<Document>> = staged
            .iter()
            .map(|((_, id), state)| state.clone().map(|f| Document::new(id.clone(), f)))
            .collect();

        for ((collection, id), state) in staged {
            let coll = guard.entry(collection).or_default();
            match state {
                Some(fields) => {
                    coll.insert(id, fields);
                }
                None => {
                    coll.remove(&id);
                }
            }
        }
        Ok(applied)
    }
}
