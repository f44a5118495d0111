//! Collection read path: turns viewer filters into store reads.
//!
//! A [`CollectionRequest`] is validated against the read allow-list, turned
//! into a [`ReadPlan`], and executed with its fallback strategy:
//!
//! | Filters | Primary read | Fallback when empty |
//! |---------|--------------|---------------------|
//! | `date` | document with id == date | `date` field == date |
//! | `startDate` + `endDate` | ids in `[min, max]` | `date` field in `[min, max]` |
//! | none | whole collection, capped | none |
//!
//! The unreviewed-only filter runs after retrieval and is never part of the
//! store query.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::allow_list::AllowList;
use crate::models::Document;
use crate::store::{DocumentStore, Filter, Query};

/// Cap on a full-collection read.
pub const DEFAULT_FULL_SCAN_LIMIT: usize = 1000;

/// Name of the document field used by the date fallbacks.
pub const DATE_FIELD: &str = "date";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRequest {
    pub collection: String,
    #[serde(default, rename = "date", skip_serializing_if = "Option::is_none")]
    pub exact_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub unreviewed_only: bool,
}

/// The store strategy chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    ExactDate { date: String },
    DateRange { low: String, high: String },
    FullScan { limit: usize },
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl CollectionRequest {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.exact_date = Some(date.into());
        self
    }

    pub fn with_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_date = Some(start.into());
        self.end_date = Some(end.into());
        self
    }

    pub fn unreviewed_only(mut self, on: bool) -> Self {
        self.unreviewed_only = on;
        self
    }

    /// Chooses the read strategy. Blank dates count as absent, and a
    /// reversed range is normalized to `[min, max]`.
    pub fn plan(&self, full_scan_limit: usize) -> ReadPlan {
        if let Some(date) = present(&self.exact_date) {
            return ReadPlan::ExactDate {
                date: date.to_string(),
            };
        }
        match (present(&self.start_date), present(&self.end_date)) {
            (Some(a), Some(b)) => {
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                ReadPlan::DateRange {
                    low: low.to_string(),
                    high: high.to_string(),
                }
            }
            _ => ReadPlan::FullScan {
                limit: full_scan_limit,
            },
        }
    }
}

/// Executes a validated read against the store.
///
/// The allow-list is checked before any store access.
pub async fn load_collection(
    store: &dyn DocumentStore,
    allow: &AllowList,
    request: &CollectionRequest,
    full_scan_limit: usize,
) -> Result<Vec<Document>> {
    allow.check(&request.collection)?;
    let collection = request.collection.as_str();
    let plan = request.plan(full_scan_limit);

    let docs = match &plan {
        ReadPlan::ExactDate { date } => match store.get(collection, date).await? {
            Some(doc) => vec![doc],
            None => {
                tracing::debug!(collection, date = %date, "no document with id, falling back to date field");
                let q = Query::new().filter(Filter::eq(DATE_FIELD, date.as_str()));
                store.query(collection, &q).await?
            }
        },
        ReadPlan::DateRange { low, high } => {
            let by_id = Query::new().filter(Filter::id_range(low.as_str(), high.as_str()));
            let docs = store.query(collection, &by_id).await?;
            if docs.is_empty() {
                tracing::debug!(collection, %low, %high, "id range empty, falling back to date field range");
                let by_field = Query::new().filter(Filter::field_range(
                    DATE_FIELD,
                    low.as_str(),
                    high.as_str(),
                ));
                store.query(collection, &by_field).await?
            } else {
                docs
            }
        }
        ReadPlan::FullScan { limit } => store.query(collection, &Query::new().limit(*limit)).await?,
    };

    let fetched = docs.len();
    let docs = if request.unreviewed_only {
        retain_unreviewed(docs)
    } else {
        docs
    };
    tracing::info!(collection, ?plan, fetched, returned = docs.len(), "collection loaded");
    Ok(docs)
}

/// Drops documents whose `reviewed` flag is `true`.
pub fn retain_unreviewed(mut docs: Vec<Document>) -> Vec<Document> {
    docs.retain(|d| !d.is_reviewed());
    docs
}
