//! # Review Desk Core
//!
//! Shared, I/O-free logic for review-desk: the schema-free document model,
//! allow-lists, the collection query builder, the document normalizer,
//! the review mutator, CSV export, the viewer session, and the
//! [`store::DocumentStore`] trait every backend implements.
//!
//! This crate contains no sqlx, HTTP, or filesystem dependencies. Domain
//! operations are written against `&dyn DocumentStore` so the same code
//! runs over SQLite in production and [`store::memory::InMemoryStore`] in
//! tests.

pub mod allow_list;
pub mod collection;
pub mod csv;
pub mod error;
pub mod members;
pub mod models;
pub mod normalize;
pub mod posts;
pub mod requests;
pub mod review;
pub mod store;
pub mod viewer;

pub use error::DeskError;
pub use models::{Document, Fields};
