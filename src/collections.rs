//! `desk collections`: what each allow-list exposes and what the store holds.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn list_collections(config: &Config) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let counts = store.collections().await?;

    let read = config.collections.read_allow();
    let review = config.collections.review_allow();

    let mut names: Vec<String> = read.names().map(str::to_string).collect();
    for name in review.names() {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    for c in &counts {
        if !names.contains(&c.collection) {
            names.push(c.collection.clone());
        }
    }
    names.sort();

    println!(
        "{:<32} {:<6} {:<7} DOCUMENTS",
        "COLLECTION", "READ", "REVIEW"
    );
    for name in &names {
        let docs = counts
            .iter()
            .find(|c| &c.collection == name)
            .map_or(0, |c| c.documents);
        println!(
            "{:<32} {:<6} {:<7} {}",
            name,
            if read.contains(name) { "yes" } else { "no" },
            if review.contains(name) { "yes" } else { "no" },
            docs
        );
    }

    if !config.viewers.is_empty() {
        println!();
        println!("{:<16} {:<32} FILTER", "VIEWER", "COLLECTION");
        for (name, viewer) in &config.viewers {
            println!(
                "{:<16} {:<32} {:?}",
                name, viewer.collection, viewer.filter
            );
        }
    }
    Ok(())
}
