//! Consumer side of the watch: drain, read, parse and forward.
//!
//! Every channel is drained by its own task, so files of one channel are
//! handled in arrival order while channels make progress independently.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity_log::ActivityLog;
use crate::admission::AdmissionQueue;
use crate::discovered::DiscoveredFile;
use crate::forwarder::MessageForwarder;
use crate::monitor::ChannelName;
use crate::parser::MessageParser;
use crate::recent::SharedRecentActivity;
use crate::retry::RetryPolicy;

/// Pause before reading a new file so the writer can finish.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub settle_delay: Duration,
    pub read_retry: RetryPolicy,
    pub origin_host: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            read_retry: RetryPolicy::default(),
            origin_host: "unknown-host".to_string(),
        }
    }
}

/// What happened to one discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Forwarded,
    ForwardFailed,
    NoRecords,
    Unreadable,
    ParseFailed,
}

pub struct IngestPipeline<F: MessageForwarder> {
    recent: Arc<SharedRecentActivity>,
    forwarder: F,
    activity: ActivityLog,
    config: PipelineConfig,
}

impl<F: MessageForwarder> std::fmt::Debug for IngestPipeline<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("recent", &self.recent.len())
            .field("activity", &self.activity.path())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<F: MessageForwarder> IngestPipeline<F> {
    pub fn new(
        recent: Arc<SharedRecentActivity>,
        forwarder: F,
        activity: ActivityLog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            recent,
            forwarder,
            activity,
            config,
        }
    }

    /// Process one channel's queued files until the task is dropped.
    pub async fn run(&self, channel: &ChannelName, queue: &AdmissionQueue) {
        info!(
            channel = %channel,
            origin_host = %self.config.origin_host,
            "channel consumer running"
        );
        loop {
            let file = queue.recv().await;
            let outcome = self.process(file).await;
            debug!(channel = %channel, ?outcome, remaining = queue.len(), "file processed");
        }
    }

    pub async fn process(&self, file: DiscoveredFile) -> ProcessOutcome {
        let name = file.file_name().to_string();
        let recent = self.recent.push_and_snapshot(file.clone());
        debug!(file = %name, recent = recent.len(), "recent activity updated");
        self.activity.submit(format!("received {name}"));

        tokio::time::sleep(self.config.settle_delay).await;

        let bytes = match self
            .config
            .read_retry
            .retry_io(|| tokio::fs::read(file.full_path()))
            .await
        {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    path = %file.full_path().display(),
                    error = %err,
                    "could not read message file"
                );
                self.activity.submit(format!("unreadable {name}: {err}"));
                return ProcessOutcome::Unreadable;
            }
        };
        let raw = String::from_utf8_lossy(&bytes);

        let message = match MessageParser::parse(
            &raw,
            &self.config.origin_host,
            file.created_at(),
        ) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(file = %name, "no bib records in message");
                self.activity.submit(format!("no bib records in {name}"));
                return ProcessOutcome::NoRecords;
            }
            Err(err) => {
                warn!(file = %name, error = %err, "message parse failed");
                self.activity.submit(format!("parse failed for {name}: {err}"));
                return ProcessOutcome::ParseFailed;
            }
        };

        let summary = format!(
            "message {} from {name}: {} record(s){}",
            message.message_id,
            message.bib_records.len(),
            if message.has_warnings() { ", with warnings" } else { "" }
        );
        self.activity.submit(summary);

        if self.forwarder.forward(&message).await {
            info!(
                message_id = %message.message_id,
                records = message.bib_records.len(),
                "message forwarded"
            );
            self.activity
                .submit(format!("forwarded {}", message.message_id));
            ProcessOutcome::Forwarded
        } else {
            self.activity
                .submit(format!("forward failed for {}", message.message_id));
            ProcessOutcome::ForwardFailed
        }
    }
}

impl<F: MessageForwarder + 'static> IngestPipeline<F> {
    /// Spawn the consumer task for one channel's queue.
    pub fn spawn_channel(
        self: &Arc<Self>,
        channel: ChannelName,
        queue: Arc<AdmissionQueue>,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(&channel, &queue).await })
    }
}
