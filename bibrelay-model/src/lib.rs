//! Data model shared by the bibrelay watcher and ingest service.
//!
//! Everything in here crosses the process boundary as JSON, so the serde
//! field names follow the ingest wire contract rather than Rust naming.
#![allow(missing_docs)]

pub mod bib;
pub mod message;

pub use bib::{BibAction, BibRecord, MISSING_NUMBER, MISSING_TEXT};
pub use message::{MessageIdentity, ParsedMessage};
