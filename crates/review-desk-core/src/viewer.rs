//! Client-side viewer session for one collection.
//!
//! A [`ViewerProfile`] parametrizes the viewer: which collection it reads,
//! which filters it accepts, and the confirmation prompt shown before a
//! review. A [`ViewerSession`] holds the loaded rows and scalar columns.
//!
//! Loads are tagged with a sequence number. Only the most recently
//! dispatched load may change state; a response for an older load is
//! reported as [`LoadOutcome::Stale`] and dropped.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::collection::{retain_unreviewed, CollectionRequest};
use crate::csv::{export_row, CsvFile};
use crate::error::DeskError;
use crate::models::Document;
use crate::normalize::{normalize, Normalized, Row};
use crate::review::{ReviewReceipt, ReviewRequest};

/// Filters a viewer exposes to its user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// A single date; looked up by id, then by `date` field.
    #[default]
    ExactDate,
    /// A start/end pair.
    DateRange,
    /// No filters; always the whole (capped) collection.
    None,
}

pub const DEFAULT_CONFIRM_PROMPT: &str = "Confirm marking this document as reviewed?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerProfile {
    pub name: String,
    pub collection: String,
    #[serde(default)]
    pub filter: FilterMode,
    #[serde(default = "default_confirm_prompt")]
    pub confirm_prompt: String,
    /// Fields shown next to the id in a row summary.
    #[serde(default)]
    pub headline_fields: Vec<String>,
}

fn default_confirm_prompt() -> String {
    DEFAULT_CONFIRM_PROMPT.to_string()
}

impl ViewerProfile {
    /// An ad hoc profile for a bare collection name.
    pub fn for_collection(collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self {
            name: collection.clone(),
            collection,
            filter: FilterMode::ExactDate,
            confirm_prompt: default_confirm_prompt(),
            headline_fields: Vec::new(),
        }
    }

    /// Builds the read request, rejecting filters this viewer does not offer.
    pub fn request(&self, filters: &ViewFilters) -> Result<CollectionRequest, DeskError> {
        let has_date = filters.date.is_some();
        let has_range = filters.start_date.is_some() || filters.end_date.is_some();
        let rejected = match self.filter {
            FilterMode::ExactDate if has_range => Some("a date range"),
            FilterMode::DateRange if has_date => Some("a single date"),
            FilterMode::None if has_date || has_range => Some("date filters"),
            _ => None,
        };
        if let Some(what) = rejected {
            return Err(DeskError::InvalidPayload(format!(
                "viewer '{}' does not accept {}",
                self.name, what
            )));
        }
        Ok(CollectionRequest {
            collection: self.collection.clone(),
            exact_date: filters.date.clone(),
            start_date: filters.start_date.clone(),
            end_date: filters.end_date.clone(),
            unreviewed_only: filters.unreviewed_only,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilters {
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub unreviewed_only: bool,
}

/// Handle for one dispatched load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    seq: u64,
    pub request: CollectionRequest,
}

impl LoadTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { rows: usize },
    Failed(String),
    Stale,
}

/// Whether the review action is available on a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    /// No reviewer identity; the action is not offered.
    Unavailable,
    /// Already reviewed; the action is disabled.
    AlreadyReviewed {
        reviewed_by: Option<String>,
        reviewed_at: Option<String>,
    },
    /// Offered, behind this confirmation prompt.
    Offer { prompt: String, request: ReviewRequest },
}

pub struct ViewerSession {
    profile: ViewerProfile,
    dispatched: u64,
    view: Normalized,
    error: Option<String>,
}

impl ViewerSession {
    pub fn new(profile: ViewerProfile) -> Self {
        Self {
            profile,
            dispatched: 0,
            view: Normalized::default(),
            error: None,
        }
    }

    pub fn profile(&self) -> &ViewerProfile {
        &self.profile
    }

    pub fn rows(&self) -> &[Row] {
        &self.view.rows
    }

    pub fn scalar_columns(&self) -> &[String] {
        &self.view.scalar_columns
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        self.view.rows.iter().find(|r| r.id == id)
    }

    /// Dispatches a new load. Any load still in flight becomes stale.
    pub fn begin_load(&mut self, filters: &ViewFilters) -> Result<LoadTicket, DeskError> {
        let request = self.profile.request(filters)?;
        self.dispatched += 1;
        Ok(LoadTicket {
            seq: self.dispatched,
            request,
        })
    }

    /// Dispatches a lookup of one document by id. Allowed in every filter
    /// mode.
    pub fn begin_lookup(&mut self, id: &str) -> LoadTicket {
        self.dispatched += 1;
        LoadTicket {
            seq: self.dispatched,
            request: CollectionRequest::new(self.profile.collection.clone()).with_date(id),
        }
    }

    /// Applies a completed load if it is still the latest one.
    pub fn finish_load(&mut self, ticket: &LoadTicket, result: Result<Vec<Document>>) -> LoadOutcome {
        if ticket.seq != self.dispatched {
            tracing::debug!(
                viewer = %self.profile.name,
                seq = ticket.seq,
                latest = self.dispatched,
                "discarding stale load"
            );
            return LoadOutcome::Stale;
        }
        match result {
            Ok(docs) => {
                let docs = if ticket.request.unreviewed_only {
                    retain_unreviewed(docs)
                } else {
                    docs
                };
                self.view = normalize(&docs);
                self.error = None;
                LoadOutcome::Applied {
                    rows: self.view.rows.len(),
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.view = Normalized::default();
                self.error = Some(message.clone());
                LoadOutcome::Failed(message)
            }
        }
    }

    /// Decides whether `id` may be reviewed by `reviewer`.
    ///
    /// Rows that are not loaded are offered; the server decides.
    pub fn review_action(&self, id: &str, reviewer: Option<&str>) -> ReviewAction {
        let reviewer = match reviewer.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return ReviewAction::Unavailable,
        };
        if let Some(row) = self.row(id) {
            if row.review.reviewed {
                return ReviewAction::AlreadyReviewed {
                    reviewed_by: row.review.reviewed_by.clone(),
                    reviewed_at: row.review.reviewed_at.clone(),
                };
            }
        }
        ReviewAction::Offer {
            prompt: self.profile.confirm_prompt.clone(),
            request: ReviewRequest::new(self.profile.collection.clone(), id, reviewer),
        }
    }

    /// Records a successful review on the matching row only.
    ///
    /// Returns `false` when no loaded row has that id.
    pub fn apply_review(&mut self, request: &ReviewRequest, receipt: &ReviewReceipt) -> bool {
        match self.view.rows.iter_mut().find(|r| r.id == request.id) {
            Some(row) => {
                row.mark_reviewed(&request.reviewed_by, &receipt.reviewed_at);
                true
            }
            None => false,
        }
    }

    /// CSV files for a loaded row.
    pub fn export_csv(&self, id: &str) -> Option<Vec<CsvFile>> {
        self.row(id).map(export_row)
    }
}
