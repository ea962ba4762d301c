use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bib::BibRecord;

/// A Winlink message reduced to the bib rows it carried.
///
/// Instances with no records are never forwarded or written; producers
/// check [`ParsedMessage::is_empty`] and skip them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    #[serde(rename = "WinlinkMessageId")]
    pub message_id: String,
    #[serde(rename = "MessageDateStamp")]
    pub message_timestamp: DateTime<Utc>,
    #[serde(rename = "ClientHostname")]
    pub origin_host: String,
    #[serde(rename = "FileCreatedTimeStamp")]
    pub file_created: DateTime<Utc>,
    #[serde(rename = "BibRecords", default)]
    pub bib_records: Vec<BibRecord>,
}

impl ParsedMessage {
    pub fn is_empty(&self) -> bool {
        self.bib_records.is_empty()
    }

    /// Any record in the batch carries the trust-demotion flag.
    pub fn has_warnings(&self) -> bool {
        self.bib_records.iter().any(|record| record.data_warning)
    }

    pub fn identity(&self) -> MessageIdentity {
        MessageIdentity {
            message_id: self.message_id.clone(),
            message_timestamp: self.message_timestamp,
            origin_host: self.origin_host.clone(),
            file_created: self.file_created,
        }
    }
}

/// Duplicate-detection key for received messages.
///
/// Bib record contents are deliberately excluded: the same file re-sent
/// from the same host is a duplicate even if it parses differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageIdentity {
    pub message_id: String,
    pub message_timestamp: DateTime<Utc>,
    pub origin_host: String,
    pub file_created: DateTime<Utc>,
}
