//! Review mutation: marks one document reviewed.
//!
//! The payload is validated and the review allow-list checked before the
//! store is touched. The three review fields are written in one update,
//! and `reviewedAt` comes from the store's clock, not the caller's.
//! Reviewing an already-reviewed document overwrites reviewer and
//! timestamp.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allow_list::AllowList;
use crate::error::DeskError;
use crate::models::{REVIEWED, REVIEWED_AT, REVIEWED_BY};
use crate::store::{DocumentStore, FieldUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub collection: String,
    pub id: String,
    pub reviewed_by: String,
}

impl ReviewRequest {
    pub fn new(
        collection: impl Into<String>,
        id: impl Into<String>,
        reviewed_by: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            reviewed_by: reviewed_by.into(),
        }
    }

    /// Parses an untyped request body, rejecting missing or non-string
    /// fields and empty values.
    pub fn from_json(body: &Value) -> Result<Self, DeskError> {
        let field = |name: &str| -> Result<String, DeskError> {
            match body.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
                Some(Value::String(_)) => {
                    Err(DeskError::InvalidPayload(format!("`{}` must not be empty", name)))
                }
                Some(_) => Err(DeskError::InvalidPayload(format!(
                    "`{}` must be a string",
                    name
                ))),
                None => Err(DeskError::InvalidPayload(format!("`{}` is required", name))),
            }
        };
        Ok(Self {
            collection: field("collection")?,
            id: field("id")?,
            reviewed_by: field("reviewedBy")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReceipt {
    pub reviewed_at: String,
}

/// Applies a review to the store and returns the stored timestamp.
pub async fn mark_reviewed(
    store: &dyn DocumentStore,
    allow: &AllowList,
    request: &ReviewRequest,
) -> Result<ReviewReceipt> {
    allow.check(&request.collection)?;
    if request.id.trim().is_empty() {
        return Err(DeskError::InvalidPayload("`id` must not be empty".into()).into());
    }
    if request.reviewed_by.trim().is_empty() {
        return Err(DeskError::InvalidPayload("`reviewedBy` must not be empty".into()).into());
    }

    let updated = store
        .update(
            &request.collection,
            &request.id,
            vec![
                (REVIEWED.to_string(), FieldUpdate::Set(Value::Bool(true))),
                (
                    REVIEWED_BY.to_string(),
                    FieldUpdate::Set(Value::String(request.reviewed_by.clone())),
                ),
                (REVIEWED_AT.to_string(), FieldUpdate::ServerTimestamp),
            ],
        )
        .await?;

    let reviewed_at = updated
        .reviewed_at()
        .ok_or_else(|| anyhow!("store did not return {}", REVIEWED_AT))?
        .to_string();

    tracing::info!(
        collection = %request.collection,
        id = %request.id,
        reviewed_by = %request.reviewed_by,
        %reviewed_at,
        "document marked reviewed"
    );
    Ok(ReviewReceipt { reviewed_at })
}
