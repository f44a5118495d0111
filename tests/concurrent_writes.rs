//! Concurrent writers against one SQLite file.

use std::sync::Arc;

use review_desk::config::Config;
use review_desk::db;
use review_desk::import::{import_documents, parse_documents};
use review_desk::migrate;
use review_desk::sqlite_store::SqliteStore;
use review_desk_core::allow_list::AllowList;
use review_desk_core::review::{mark_reviewed, ReviewRequest};
use review_desk_core::store::DocumentStore;
use serde_json::{json, Value};
use tempfile::TempDir;

const TOTALS: &str = "dailytotals_t3global";
const DOCS: usize = 40;

fn test_config(tmp: &TempDir) -> Config {
    let config_content = format!(
        "[db]\npath = \"{}\"\n",
        tmp.path().join("desk.sqlite").display()
    );
    toml::from_str(&config_content).unwrap()
}

async fn seeded_store(cfg: &Config) -> Arc<SqliteStore> {
    migrate::run_migrations(cfg).await.unwrap();
    let store = SqliteStore::new(db::connect(cfg).await.unwrap());
    let docs: Vec<Value> = (0..DOCS)
        .map(|n| json!({"id": format!("d{:02}", n), "total": n}))
        .collect();
    import_documents(&store, TOTALS, parse_documents(Value::Array(docs)).unwrap())
        .await
        .unwrap();
    Arc::new(store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_reviews_all_land() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&test_config(&tmp)).await;

    let mut handles = Vec::new();
    for n in 0..DOCS {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let request = ReviewRequest::new(TOTALS, format!("d{:02}", n), format!("user{}", n));
            mark_reviewed(store.as_ref(), &AllowList::default(), &request).await
        }));
    }

    let mut failures = Vec::new();
    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            failures.push(e.to_string());
        }
    }
    assert!(failures.is_empty(), "failed reviews: {:?}", failures);

    for n in 0..DOCS {
        let doc = store
            .get(TOTALS, &format!("d{:02}", n))
            .await
            .unwrap()
            .unwrap();
        assert!(doc.is_reviewed());
        let reviewer = format!("user{}", n);
        assert_eq!(doc.reviewed_by(), Some(reviewer.as_str()));
        assert_eq!(doc.get("total"), Some(&json!(n)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_reviews_of_one_document_keep_a_single_winner() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&test_config(&tmp)).await;

    let mut handles = Vec::new();
    for n in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let request = ReviewRequest::new(TOTALS, "d00", format!("user{}", n));
            mark_reviewed(store.as_ref(), &AllowList::default(), &request)
                .await
                .map(|receipt| (format!("user{}", n), receipt.reviewed_at))
        }));
    }

    let mut receipts = Vec::new();
    for handle in handles {
        receipts.push(handle.await.unwrap().unwrap());
    }

    let doc = store.get(TOTALS, "d00").await.unwrap().unwrap();
    let winner = (
        doc.reviewed_by().unwrap().to_string(),
        doc.reviewed_at().unwrap().to_string(),
    );
    assert!(receipts.contains(&winner));
}
