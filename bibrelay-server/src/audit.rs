//! Tab-delimited audit trail of accepted messages.
//!
//! Every bib record becomes one CRLF-terminated line appended to
//! `<messageId>.txt` in the audit directory:
//!
//! ```text
//! <messageId>\t<yyyy-MM-ddTHH-mm-ss>\t<NOMINAL|ALERT>\t<bib>\t<action>\t<timeOfDay>\t<day>\t<location>\r\n
//! ```
//!
//! Downstream spreadsheet imports read these files back with
//! [`AuditLine::parse`].

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use bibrelay_core::RetryPolicy;
use bibrelay_model::{BibAction, BibRecord, MISSING_NUMBER, ParsedMessage};
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const FIELD_COUNT: usize = 8;

/// Data-quality flag written in the third column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditFlag {
    Nominal,
    Alert,
}

impl AuditFlag {
    pub fn for_record(record: &BibRecord) -> Self {
        if record.data_warning {
            AuditFlag::Alert
        } else {
            AuditFlag::Nominal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditFlag::Nominal => "NOMINAL",
            AuditFlag::Alert => "ALERT",
        }
    }
}

/// Why an audit write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditFailure {
    Permission,
    MalformedArgument,
    PathTooLong,
    MissingDirectory,
    Unsupported,
    Transient,
    Other,
}

impl AuditFailure {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                AuditFailure::Permission
            }
            ErrorKind::InvalidInput => AuditFailure::MalformedArgument,
            ErrorKind::InvalidFilename => AuditFailure::PathTooLong,
            ErrorKind::NotFound | ErrorKind::NotADirectory => {
                AuditFailure::MissingDirectory
            }
            ErrorKind::Unsupported => AuditFailure::Unsupported,
            ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::ResourceBusy => AuditFailure::Transient,
            _ => AuditFailure::Other,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AuditFailure::Transient)
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            AuditFailure::Permission => {
                "grant the service account write access to the audit directory"
            }
            AuditFailure::MalformedArgument => {
                "check the message id contains only file-name safe characters"
            }
            AuditFailure::PathTooLong => {
                "shorten the audit directory path"
            }
            AuditFailure::MissingDirectory => {
                "create the audit directory or fix BIBRELAY_AUDIT_DIR"
            }
            AuditFailure::Unsupported => {
                "move the audit directory to a local filesystem"
            }
            AuditFailure::Transient => {
                "another process is holding the file; retry later"
            }
            AuditFailure::Other => "inspect the error and the audit directory",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit write to {} failed ({kind:?}): {source}", .path.display())]
    Io {
        path: PathBuf,
        kind: AuditFailure,
        #[source]
        source: io::Error,
    },

    #[error("message id {0:?} cannot be used as an audit file name")]
    InvalidMessageId(String),

    #[error("audit line has {0} fields, expected 8")]
    FieldCount(usize),

    #[error("audit line has unknown flag {0:?}")]
    UnknownFlag(String),

    #[error("audit line has invalid timestamp {0:?}")]
    Timestamp(String),
}

/// One parsed line of an audit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLine {
    pub message_id: String,
    pub message_timestamp: DateTime<Utc>,
    pub flag: AuditFlag,
    pub record: BibRecord,
}

impl AuditLine {
    pub fn format(message: &ParsedMessage, record: &BibRecord) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\r\n",
            message.message_id,
            message.message_timestamp.format(TIMESTAMP_FORMAT),
            AuditFlag::for_record(record).as_str(),
            record.bib_number,
            record.action,
            record.time_of_day.as_deref().unwrap_or(""),
            record.day_of_month,
            record.location,
        )
    }

    pub fn parse(line: &str) -> Result<Self, AuditError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(AuditError::FieldCount(fields.len()));
        }

        let message_timestamp =
            NaiveDateTime::parse_from_str(fields[1], TIMESTAMP_FORMAT)
                .map_err(|_| AuditError::Timestamp(fields[1].to_string()))?
                .and_utc();
        let flag = match fields[2] {
            "NOMINAL" => AuditFlag::Nominal,
            "ALERT" => AuditFlag::Alert,
            other => return Err(AuditError::UnknownFlag(other.to_string())),
        };
        let time_of_day =
            (!fields[5].is_empty()).then(|| fields[5].to_string());

        Ok(Self {
            message_id: fields[0].to_string(),
            message_timestamp,
            flag,
            record: BibRecord {
                bib_number: fields[3].parse().unwrap_or(MISSING_NUMBER),
                action: BibAction::from(fields[4]),
                time_of_day,
                day_of_month: fields[6].parse().unwrap_or(MISSING_NUMBER),
                location: fields[7].to_string(),
                data_warning: flag == AuditFlag::Alert,
            },
        })
    }
}

/// Single-writer audit file appender.
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    retry: RetryPolicy,
    gate: Mutex<()>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_retry(dir, RetryPolicy::default())
    }

    pub fn with_retry(dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            dir: dir.into(),
            retry,
            gate: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids that would escape the directory or break the tab-delimited
    /// line format are rejected.
    pub fn path_for(&self, message_id: &str) -> Result<PathBuf, AuditError> {
        let safe = !message_id.is_empty()
            && !message_id.contains(['/', '\\'])
            && !message_id.chars().any(char::is_control)
            && message_id != "."
            && message_id != "..";
        if !safe {
            return Err(AuditError::InvalidMessageId(message_id.to_string()));
        }
        Ok(self.dir.join(format!("{message_id}.txt")))
    }

    /// Append every record of `message`. Failures are logged and reported
    /// as `false`.
    pub async fn write(&self, message: &ParsedMessage) -> bool {
        match self.try_write(message).await {
            Ok(path) => {
                debug!(
                    message_id = %message.message_id,
                    path = %path.display(),
                    records = message.bib_records.len(),
                    "audit lines written"
                );
                true
            }
            Err(AuditError::Io { path, kind, source }) => {
                error!(
                    message_id = %message.message_id,
                    path = %path.display(),
                    category = ?kind,
                    error = %source,
                    hint = kind.remediation(),
                    "audit write failed"
                );
                false
            }
            Err(err) => {
                error!(message_id = %message.message_id, error = %err, "audit write failed");
                false
            }
        }
    }

    pub async fn try_write(
        &self,
        message: &ParsedMessage,
    ) -> Result<PathBuf, AuditError> {
        let path = self.path_for(&message.message_id)?;
        let payload: String = message
            .bib_records
            .iter()
            .map(|record| AuditLine::format(message, record))
            .collect();

        let _gate = self.gate.lock().await;
        self.retry
            .retry_with(
                || append(&path, payload.as_bytes()),
                |err: &io::Error| {
                    let transient = AuditFailure::classify(err).is_transient();
                    if transient {
                        warn!(path = %path.display(), error = %err, "audit file busy; retrying");
                    }
                    transient
                },
            )
            .await
            .map_err(|source| AuditError::Io {
                path: path.clone(),
                kind: AuditFailure::classify(&source),
                source,
            })?;
        Ok(path)
    }
}

async fn append(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// Read an audit file back into lines, skipping blanks.
pub async fn read_audit_file(path: &Path) -> Result<Vec<AuditLine>, AuditError> {
    let contents =
        fs::read_to_string(path).await.map_err(|source| AuditError::Io {
            path: path.to_path_buf(),
            kind: AuditFailure::classify(&source),
            source,
        })?;
    contents
        .split("\r\n")
        .filter(|line| !line.trim().is_empty())
        .map(AuditLine::parse)
        .collect()
}
