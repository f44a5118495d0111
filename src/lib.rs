//! # Review Desk
//!
//! Browse dated compliance collections, mark documents reviewed, and export
//! nested record lists as CSV.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  desk (CLI)  │──▶│  DeskBackend     │──▶│  SQLite   │
//! │ load/review/ │   │ local | remote   │   │ documents │
//! │ export       │   └────────┬─────────┘   └────┬─────┘
//! └──────────────┘            │ HTTP             │
//!                             ▼                  │
//!                      ┌──────────────┐          │
//!                      │ axum server  │──────────┘
//!                      │ /api/...     │
//!                      └──────────────┘
//! ```
//!
//! Domain logic (query planning, normalization, review, CSV) lives in
//! [`review_desk_core`]; this crate adds configuration, persistence, the
//! HTTP API, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document store |
//! | [`server`] | JSON HTTP API |
//! | [`backend`] | Local or remote data source for the CLI |
//! | [`view`] | Terminal viewer commands |
//! | [`import`] | JSON file import |
//! | [`collections`] | Collection listing |

pub mod backend;
pub mod collections;
pub mod config;
pub mod db;
pub mod import;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod view;
