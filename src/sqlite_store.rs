//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Each document is one row of the `documents` table with its fields stored
//! as an ordered JSON object. Id-range filters and unfiltered limits are
//! pushed down into SQL; everything else is evaluated by [`Query::apply`]
//! over the rows SQLite returns, so results match the in-memory store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use review_desk_core::models::{Document, Fields};
use review_desk_core::store::{apply_write, DocumentStore, Query, Write};

pub struct SqliteStore {
    pool: SqlitePool,
}

/// Row count of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCount {
    pub collection: String,
    pub documents: i64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every non-empty collection with its document count.
    pub async fn collections(&self) -> Result<Vec<CollectionCount>> {
        let rows = sqlx::query(
            "SELECT collection, COUNT(*) AS n FROM documents GROUP BY collection ORDER BY collection",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| CollectionCount {
                collection: r.get("collection"),
                documents: r.get("n"),
            })
            .collect())
    }
}

fn parse_fields(collection: &str, id: &str, data_json: &str) -> Result<Fields> {
    serde_json::from_str(data_json)
        .with_context(|| format!("corrupt document {}/{}", collection, id))
}

async fn read_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    id: &str,
) -> Result<Option<Fields>> {
    let data: Option<String> =
        sqlx::query_scalar("SELECT data_json FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
    data.map(|d| parse_fields(collection, id, &d)).transpose()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT data_json FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match data {
            Some(d) => Ok(Some(Document::new(id, parse_fields(collection, id, &d)?))),
            None => Ok(None),
        }
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let rows = if let Some((start, end)) = query.id_bounds() {
            sqlx::query(
                "SELECT id, data_json FROM documents \
                 WHERE collection = ? AND id >= ? AND id <= ? ORDER BY id",
            )
            .bind(collection)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?
        } else if let (true, Some(limit)) = (
            query.filters.is_empty() && query.order_by.is_none() && query.start_after.is_none(),
            query.limit,
        ) {
            sqlx::query(
                "SELECT id, data_json FROM documents WHERE collection = ? ORDER BY id LIMIT ?",
            )
            .bind(collection)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query("SELECT id, data_json FROM documents WHERE collection = ? ORDER BY id")
                .bind(collection)
                .fetch_all(&self.pool)
                .await?
        };

        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let data: String = row.get("data_json");
            let fields = parse_fields(collection, &id, &data)?;
            docs.push(Document::new(id, fields));
        }
        Ok(query.apply(docs))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<Option<Document>>> {
        let now = self.now();
        // Take the write lock up front; a deferred transaction that reads
        // first fails with SQLITE_BUSY instead of waiting when it upgrades.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let mut applied = Vec::with_capacity(writes.len());
        for write in &writes {
            let (collection, id) = write.target();
            let current = read_in_tx(&mut tx, collection, id).await?;
            match apply_write(current, write, now)? {
                Some(fields) => {
                    let data = serde_json::to_string(&fields)?;
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data_json, updated_at)
                        VALUES (?, ?, ?, ?)
                        ON CONFLICT(collection, id) DO UPDATE SET
                            data_json = excluded.data_json,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(collection)
                    .bind(id)
                    .bind(&data)
                    .bind(now.timestamp())
                    .execute(&mut *tx)
                    .await?;
                    applied.push(Some(Document::new(id, fields)));
                }
                None => {
                    sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                        .bind(collection)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    applied.push(None);
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(writes = writes.len(), "batch committed");
        Ok(applied)
    }
}
