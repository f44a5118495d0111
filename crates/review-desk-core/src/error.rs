//! Domain errors surfaced to callers.
//!
//! Store and I/O failures travel as plain [`anyhow::Error`]s. The variants
//! here are the ones a caller can act on, and the HTTP layer maps each to a
//! status code by downcasting.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeskError {
    /// The collection is not on the allow-list for this operation.
    #[error("unauthorized collection: {0}")]
    UnauthorizedCollection(String),

    /// The request body or parameters are missing or malformed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A record the operation depends on does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The record exists but is in a state the operation cannot use.
    #[error("{0}")]
    Conflict(String),
}

impl DeskError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DeskError::UnauthorizedCollection(_) => "unauthorized_collection",
            DeskError::InvalidPayload(_) => "bad_request",
            DeskError::NotFound(_) => "not_found",
            DeskError::Conflict(_) => "conflict",
        }
    }
}
