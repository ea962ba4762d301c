//! Append-only operator activity log.
//!
//! A single permit serializes writers. [`ActivityLog::submit`] returns
//! before the line is written, so lines submitted from different tasks
//! may land in any order. Use [`ActivityLog::write`] when the caller
//! needs the line on disk before continuing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: Arc<PathBuf>,
    gate: Arc<Semaphore>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a line without waiting for it to be written.
    pub fn submit(&self, line: impl Into<String>) {
        let line = line.into();
        match Handle::try_current() {
            Ok(handle) => {
                let log = self.clone();
                handle.spawn(async move {
                    log.write(&line).await;
                });
            }
            Err(_) => {
                warn!(
                    path = %self.path.display(),
                    "no async runtime available; activity line dropped"
                );
            }
        }
    }

    /// Append one timestamped line. Failures are logged and reported as
    /// `false`.
    pub async fn write(&self, line: &str) -> bool {
        let Ok(_permit) = self.gate.acquire().await else {
            return false;
        };

        match self.append(line).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to write activity log; check the directory exists and is writable"
                );
                false
            }
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .await?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let entry = format!("{stamp} {}\n", line.trim_end());
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}
