//! # Bibrelay Core
//!
//! Watcher-side building blocks for relaying race check-in traffic
//! received over Winlink.
//!
//! ## Overview
//!
//! - **Watch channels**: per-directory `notify` watchers with an explicit
//!   lifecycle, owned by one [`monitor::MonitorManager`]
//! - **Admission**: an at-most-once FIFO of discovered message files
//! - **Recent activity**: the twelve newest discoveries for display
//! - **Parsing**: message id, timestamp and bib rows from free-form bodies
//! - **Forwarding**: single-attempt JSON POST to the ingest service
//!
//! The [`pipeline::IngestPipeline`] wires these together on the consumer
//! side of the admission queue.
#![allow(missing_docs)]

/// Append-only operator activity log
pub mod activity_log;

/// At-most-once queue of discovered files
pub mod admission;

/// Discovered message file identity
pub mod discovered;

/// HTTP forwarding of parsed messages
pub mod forwarder;

/// Directory watch lifecycle
pub mod monitor;

/// Message id, timestamp and bib row extraction
pub mod parser;

/// Queue consumer that reads, parses and forwards files
pub mod pipeline;

/// Bounded recent-activity buffer
pub mod recent;

/// Fixed-delay retry helper
pub mod retry;

pub use activity_log::ActivityLog;
pub use admission::{AdmissionQueue, AdmitOutcome, ChannelQueues};
pub use discovered::DiscoveredFile;
pub use forwarder::{ForwardError, Forwarder, MessageForwarder};
pub use monitor::{
    ChannelName, ChannelStatus, DiscoverySink, Lifecycle, MonitorError,
    MonitorManager, WatchFilter,
};
pub use parser::{BibBatch, MessageParser, ParseError};
pub use pipeline::{IngestPipeline, PipelineConfig, ProcessOutcome};
pub use recent::{RecentActivity, RingError, SharedRecentActivity};
pub use retry::RetryPolicy;
