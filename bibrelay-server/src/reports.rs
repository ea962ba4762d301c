//! Read-only views computed from the accepted messages.

use std::collections::{BTreeMap, BTreeSet};

use bibrelay_model::{BibRecord, ParsedMessage};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A bib record flattened with the message it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportRow {
    #[serde(rename = "WinlinkMessageId")]
    pub message_id: String,
    #[serde(rename = "MessageDateStamp")]
    pub message_timestamp: DateTime<Utc>,
    #[serde(rename = "ClientHostname")]
    pub origin_host: String,
    #[serde(flatten)]
    pub record: BibRecord,
}

impl ReportRow {
    fn new(message: &ParsedMessage, record: &BibRecord) -> Self {
        Self {
            message_id: message.message_id.clone(),
            message_timestamp: message.message_timestamp,
            origin_host: message.origin_host.clone(),
            record: record.clone(),
        }
    }
}

/// Rows in message arrival order, then record order.
pub fn all_rows(messages: &[ParsedMessage]) -> Vec<ReportRow> {
    rows_where(messages, |_| true)
}

pub fn by_location(messages: &[ParsedMessage], location: &str) -> Vec<ReportRow> {
    rows_where(messages, |record| {
        record.location.eq_ignore_ascii_case(location)
    })
}

pub fn by_bib(messages: &[ParsedMessage], bib: i32) -> Vec<ReportRow> {
    rows_where(messages, |record| record.bib_number == bib)
}

pub fn dropped(messages: &[ParsedMessage]) -> Vec<ReportRow> {
    rows_where(messages, |record| record.action.is_drop())
}

fn rows_where<P>(messages: &[ParsedMessage], keep: P) -> Vec<ReportRow>
where
    P: Fn(&BibRecord) -> bool,
{
    messages
        .iter()
        .flat_map(|message| {
            message
                .bib_records
                .iter()
                .filter(|record| keep(record))
                .map(move |record| ReportRow::new(message, record))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub messages: usize,
    pub records: usize,
    pub warnings: usize,
    pub dropped: usize,
    pub distinct_bibs: usize,
    pub per_location: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn compute(messages: &[ParsedMessage]) -> Self {
        let mut stats = Statistics {
            messages: messages.len(),
            ..Default::default()
        };
        let mut bibs = BTreeSet::new();

        for record in messages.iter().flat_map(|m| &m.bib_records) {
            stats.records += 1;
            if record.data_warning {
                stats.warnings += 1;
            }
            if record.action.is_drop() {
                stats.dropped += 1;
            }
            bibs.insert(record.bib_number);
            *stats
                .per_location
                .entry(record.location.to_ascii_uppercase())
                .or_default() += 1;
        }

        stats.distinct_bibs = bibs.len();
        stats
    }
}
