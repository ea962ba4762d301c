//! JSON snapshot of the in-memory store.
//!
//! The file is an indented array of messages in wire format. Importing is
//! all-or-nothing: any read or decode failure yields an empty list.

use std::path::{Path, PathBuf};

use bibrelay_model::ParsedMessage;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Write `messages` to `path`, replacing any previous snapshot.
pub async fn export(
    path: &Path,
    messages: &[ParsedMessage],
) -> Result<usize, BackupError> {
    let io_err = |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let body = serde_json::to_vec_pretty(messages)?;
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, body).await.map_err(io_err)?;
    tokio::fs::rename(&staging, path).await.map_err(io_err)?;

    info!(
        path = %path.display(),
        messages = messages.len(),
        "backup exported"
    );
    Ok(messages.len())
}

/// Read a snapshot. Missing, unreadable or malformed files give an empty
/// list.
pub async fn import(path: &Path) -> Vec<ParsedMessage> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no backup to import");
            return Vec::new();
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "backup unreadable; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Vec<ParsedMessage>>(&bytes) {
        Ok(messages) => {
            info!(
                path = %path.display(),
                messages = messages.len(),
                "backup imported"
            );
            messages
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "backup malformed; starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use bibrelay_model::BibRecord;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn message(id: &str) -> ParsedMessage {
        let at = Utc.with_ymd_and_hms(2023, 8, 19, 17, 5, 0).unwrap();
        ParsedMessage {
            message_id: id.into(),
            message_timestamp: at,
            origin_host: "aid-1".into(),
            file_created: at,
            bib_records: vec![BibRecord::from_tokens(
                ["7", "IN", "0905", "19", "FH"],
                false,
            )],
        }
    }

    #[tokio::test]
    async fn export_then_import_restores_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots/backup.json");
        let messages = vec![message("0K3K2DET73LU"), message("1A2B3C4D5E6F")];

        assert_eq!(export(&path, &messages).await.unwrap(), 2);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  {"), "snapshot is indented");
        assert_eq!(import(&path).await, messages);
    }

    #[tokio::test]
    async fn partially_valid_snapshot_imports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        let good = serde_json::to_value(message("0K3K2DET73LU")).unwrap();
        let body = serde_json::json!([good, {"WinlinkMessageId": 5}]);
        std::fs::write(&path, body.to_string()).unwrap();

        assert!(import(&path).await.is_empty());
    }

    #[tokio::test]
    async fn missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(import(&dir.path().join("none.json")).await.is_empty());
    }
}
