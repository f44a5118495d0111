use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // One row per document; fields are the ordered JSON object. The primary
    // key serves every lookup and id-range scan.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    tracing::info!(path = %config.db.path.display(), "migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrations_are_idempotent_and_add_no_extra_index() {
        let tmp = TempDir::new().unwrap();
        let config: Config = toml::from_str(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("desk.sqlite").display()
        ))
        .unwrap();
        run_migrations(&config).await.unwrap();
        run_migrations(&config).await.unwrap();

        let pool = db::connect(&config).await.unwrap();
        let indexes: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'documents'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        // Only SQLite's own primary-key index.
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].starts_with("sqlite_autoindex_documents"));
    }
}
