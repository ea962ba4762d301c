//! At-most-once admission of discovered files.
//!
//! Watch callbacks admit files from the notify thread; the ingest pipeline
//! drains them from a tokio task. A path may only be queued once at a
//! time. Once it has been popped it can be admitted again.
//!
//! [`ChannelQueues`] keeps one queue per watch channel so each channel is
//! drained by its own consumer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::discovered::DiscoveredFile;
use crate::monitor::ChannelName;

/// Result of offering a file to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    /// The same path is already waiting in the queue.
    Duplicate,
    /// No file was supplied.
    Rejected,
}

#[derive(Default)]
struct QueueInner {
    entries: VecDeque<DiscoveredFile>,
    index: HashSet<PathBuf>,
}

/// Unbounded FIFO of discovered files with a set-backed duplicate index.
#[derive(Default)]
pub struct AdmissionQueue {
    inner: Mutex<QueueInner>,
    ready: Notify,
}

impl fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AdmissionQueue");
        match self.inner.try_lock() {
            Some(guard) => debug.field("queued", &guard.entries.len()),
            None => debug.field("queued", &"<locked>"),
        };
        debug.finish()
    }
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, file: Option<DiscoveredFile>) -> AdmitOutcome {
        let Some(file) = file else {
            warn!("discarding discovery event without a file path");
            return AdmitOutcome::Rejected;
        };

        let mut inner = self.inner.lock();
        if !inner.index.insert(file.full_path().to_path_buf()) {
            warn!(
                path = %file.full_path().display(),
                "file already queued; ignoring duplicate discovery"
            );
            return AdmitOutcome::Duplicate;
        }

        debug!(path = %file.full_path().display(), "file admitted");
        inner.entries.push_back(file);
        drop(inner);
        self.ready.notify_one();
        AdmitOutcome::Admitted
    }

    /// Take the oldest queued file without waiting.
    pub fn pop(&self) -> Option<DiscoveredFile> {
        let mut inner = self.inner.lock();
        let file = inner.entries.pop_front()?;
        inner.index.remove(file.full_path());
        Some(file)
    }

    /// Wait for the next queued file.
    pub async fn recv(&self) -> DiscoveredFile {
        loop {
            if let Some(file) = self.pop() {
                return file;
            }
            self.ready.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

/// Per-channel admission queues, created on first use.
#[derive(Default)]
pub struct ChannelQueues {
    queues: Mutex<HashMap<ChannelName, Arc<AdmissionQueue>>>,
}

impl fmt::Debug for ChannelQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ChannelQueues");
        match self.queues.try_lock() {
            Some(guard) => debug.field("channels", &guard.len()),
            None => debug.field("channels", &"<locked>"),
        };
        debug.finish()
    }
}

impl ChannelQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, channel: &ChannelName) -> Arc<AdmissionQueue> {
        let mut queues = self.queues.lock();
        Arc::clone(queues.entry(channel.clone()).or_default())
    }

    pub fn admit(
        &self,
        channel: &ChannelName,
        file: Option<DiscoveredFile>,
    ) -> AdmitOutcome {
        self.queue(channel).admit(file)
    }
}
