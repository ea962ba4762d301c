//! # Bibrelay Server
//!
//! Ingest service for bib messages relayed by `bibrelay-watch`.
//!
//! Accepted messages are deduplicated in memory, persisted to PostgreSQL
//! (or process memory when no database is configured) and written to a
//! per-message audit file. Reports are computed from the in-memory
//! collection.

pub mod audit;
pub mod backup;
pub mod config;
pub mod error;
pub mod reports;
pub mod repository;
pub mod routes;
pub mod startup;
pub mod state;
pub mod store;

pub use state::AppState;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
