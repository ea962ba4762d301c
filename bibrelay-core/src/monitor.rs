//! Directory watch channels.
//!
//! Each named channel owns at most one `notify` watcher on one directory.
//! The watcher only reports file creation for the configured extension,
//! non-recursively, and hands every discovery to a [`DiscoverySink`].
//!
//! Lifecycle per channel:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --start--> Started
//!                                                  ^       |
//!                                             start|       |stop
//!                                                  |       v
//!                                                  +-- Stopped
//! any state holding a watcher --destroy--> Uninitialized
//! ```
//!
//! Stopping only closes the delivery gate; the watcher stays registered
//! so the channel can resume. Destroying drops the watcher and frees the
//! directory for any channel.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher,
    RecursiveMode, Watcher,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::admission::{AdmissionQueue, ChannelQueues};
use crate::discovered::DiscoveredFile;

/// Extension of message files written by Winlink Express.
pub const DEFAULT_MESSAGE_EXTENSION: &str = "mime";

/// Channel identity, typically a call-sign style label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Initialized => "initialized",
            Lifecycle::Started => "started",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelName),

    #[error("channel {channel} cannot {action} while {from}")]
    InvalidTransition {
        channel: ChannelName,
        from: Lifecycle,
        action: &'static str,
    },

    #[error("watch path {} does not exist or is not a directory", .0.display())]
    PathNotFound(PathBuf),

    #[error("watch path {} is already monitored by channel {owner}", .path.display())]
    PathInUse { path: PathBuf, owner: ChannelName },

    #[error("failed to resolve watch path {}: {source}", .path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Receiver for files discovered by any channel.
pub trait DiscoverySink: Send + Sync {
    fn discovered(&self, channel: &ChannelName, file: Option<DiscoveredFile>);
}

impl DiscoverySink for AdmissionQueue {
    fn discovered(&self, channel: &ChannelName, file: Option<DiscoveredFile>) {
        let outcome = self.admit(file);
        debug!(channel = %channel, ?outcome, "discovery offered to queue");
    }
}

impl DiscoverySink for ChannelQueues {
    fn discovered(&self, channel: &ChannelName, file: Option<DiscoveredFile>) {
        let outcome = self.admit(channel, file);
        debug!(channel = %channel, ?outcome, "discovery offered to channel queue");
    }
}

/// Which files a channel reports.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    extension: String,
}

impl Default for WatchFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_EXTENSION)
    }
}

impl WatchFilter {
    pub fn new(extension: impl AsRef<str>) -> Self {
        Self {
            extension: extension
                .as_ref()
                .trim_start_matches('.')
                .to_ascii_lowercase(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

/// Live watcher plus the gate that start/stop toggle.
struct WatchHandle {
    _watcher: RecommendedWatcher,
    delivering: Arc<AtomicBool>,
}

impl WatchHandle {
    fn set_delivering(&self, enabled: bool) {
        self.delivering.store(enabled, Ordering::Release);
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("delivering", &self.delivering.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct MonitorState {
    name: ChannelName,
    target_path: Option<PathBuf>,
    lifecycle: Lifecycle,
    handle: Option<WatchHandle>,
    status: String,
}

impl MonitorState {
    fn new(name: ChannelName) -> Self {
        Self {
            name,
            target_path: None,
            lifecycle: Lifecycle::Uninitialized,
            handle: None,
            status: "not monitoring".to_string(),
        }
    }

    fn is_active(&self) -> bool {
        self.lifecycle != Lifecycle::Uninitialized
    }

    fn invalid(&self, action: &'static str) -> MonitorError {
        MonitorError::InvalidTransition {
            channel: self.name.clone(),
            from: self.lifecycle,
            action,
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.set_delivering(false);
            // Dropping the watcher unregisters it from the OS.
        }
        self.target_path = None;
        self.lifecycle = Lifecycle::Uninitialized;
    }
}

/// Read-only view of one channel for operator display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub name: ChannelName,
    pub lifecycle: Lifecycle,
    pub target_path: Option<PathBuf>,
    pub status: String,
}

impl From<&MonitorState> for ChannelStatus {
    fn from(state: &MonitorState) -> Self {
        Self {
            name: state.name.clone(),
            lifecycle: state.lifecycle,
            target_path: state.target_path.clone(),
            status: state.status.clone(),
        }
    }
}

/// Owns every watch channel and enforces one active channel per directory.
pub struct MonitorManager<S: DiscoverySink + 'static = AdmissionQueue> {
    filter: WatchFilter,
    sink: Arc<S>,
    channels: Mutex<HashMap<ChannelName, MonitorState>>,
}

impl<S: DiscoverySink + 'static> fmt::Debug for MonitorManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MonitorManager");
        debug
            .field("filter", &self.filter)
            .field("sink_type", &std::any::type_name::<S>());
        match self.channels.try_lock() {
            Some(guard) => {
                let active = guard.values().filter(|s| s.is_active()).count();
                debug
                    .field("channel_count", &guard.len())
                    .field("active_channels", &active);
            }
            None => {
                debug.field("channels", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl<S: DiscoverySink + 'static> MonitorManager<S> {
    pub fn new(filter: WatchFilter, sink: Arc<S>) -> Self {
        Self {
            filter,
            sink,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Add an uninitialized channel. Registering an existing name is a
    /// no-op.
    pub fn register(&self, name: ChannelName) {
        self.channels
            .lock()
            .entry(name.clone())
            .or_insert_with(|| MonitorState::new(name));
    }

    pub fn initialize(
        &self,
        name: &ChannelName,
        path: impl AsRef<Path>,
    ) -> Result<(), MonitorError> {
        let path = path.as_ref();
        let mut channels = self.channels.lock();

        let state = channels
            .get(name)
            .ok_or_else(|| MonitorError::UnknownChannel(name.clone()))?;
        if state.lifecycle != Lifecycle::Uninitialized {
            return Err(state.invalid("initialize"));
        }

        if !path.is_dir() {
            warn!(
                channel = %name,
                path = %path.display(),
                "watch path missing; create the directory or fix the channel configuration"
            );
            return Err(MonitorError::PathNotFound(path.to_path_buf()));
        }
        let resolved =
            fs::canonicalize(path).map_err(|source| MonitorError::Resolve {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(owner) = channels.values().find(|other| {
            other.name != *name
                && other.is_active()
                && other.target_path.as_deref() == Some(resolved.as_path())
        }) {
            warn!(
                channel = %name,
                owner = %owner.name,
                path = %resolved.display(),
                "watch path already monitored"
            );
            return Err(MonitorError::PathInUse {
                path: resolved,
                owner: owner.name.clone(),
            });
        }

        let built = self.build_handle(name, &resolved);
        let state = channels
            .get_mut(name)
            .ok_or_else(|| MonitorError::UnknownChannel(name.clone()))?;

        match built {
            Ok(handle) => {
                info!(
                    channel = %name,
                    path = %resolved.display(),
                    extension = %self.filter.extension(),
                    "watch channel initialized"
                );
                state.status = format!("ready to monitor {}", resolved.display());
                state.target_path = Some(resolved);
                state.handle = Some(handle);
                state.lifecycle = Lifecycle::Initialized;
                Ok(())
            }
            Err(err) => {
                error!(channel = %name, error = %err, "watch channel initialization failed");
                state.release();
                state.status = format!("initialization failed: {err}");
                Err(err)
            }
        }
    }

    pub fn start(&self, name: &ChannelName) -> Result<(), MonitorError> {
        self.transition(name, |state| {
            if !matches!(
                state.lifecycle,
                Lifecycle::Initialized | Lifecycle::Stopped
            ) {
                return Err(state.invalid("start"));
            }
            let handle = state.handle.as_ref().ok_or_else(|| state.invalid("start"))?;
            handle.set_delivering(true);
            state.lifecycle = Lifecycle::Started;
            state.status = match &state.target_path {
                Some(path) => format!("monitoring {}", path.display()),
                None => "monitoring".to_string(),
            };
            info!(channel = %state.name, "watch channel started");
            Ok(())
        })
    }

    pub fn stop(&self, name: &ChannelName) -> Result<(), MonitorError> {
        self.transition(name, |state| {
            if state.lifecycle != Lifecycle::Started {
                return Err(state.invalid("stop"));
            }
            if let Some(handle) = state.handle.as_ref() {
                handle.set_delivering(false);
            }
            state.lifecycle = Lifecycle::Stopped;
            state.status = "paused".to_string();
            info!(channel = %state.name, "watch channel stopped");
            Ok(())
        })
    }

    pub fn destroy(&self, name: &ChannelName) -> Result<(), MonitorError> {
        self.transition(name, |state| {
            if state.handle.is_none() {
                return Err(state.invalid("destroy"));
            }
            state.release();
            state.status = "not monitoring".to_string();
            info!(channel = %state.name, "watch channel destroyed");
            Ok(())
        })
    }

    /// Destroy every channel that holds a watcher.
    pub fn shutdown(&self) {
        let mut channels = self.channels.lock();
        for state in channels.values_mut().filter(|s| s.handle.is_some()) {
            state.release();
            state.status = "not monitoring".to_string();
        }
    }

    pub fn state(&self, name: &ChannelName) -> Option<ChannelStatus> {
        self.channels.lock().get(name).map(ChannelStatus::from)
    }

    pub fn snapshot(&self) -> Vec<ChannelStatus> {
        let mut statuses: Vec<_> =
            self.channels.lock().values().map(ChannelStatus::from).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    fn transition<F>(&self, name: &ChannelName, apply: F) -> Result<(), MonitorError>
    where
        F: FnOnce(&mut MonitorState) -> Result<(), MonitorError>,
    {
        let mut channels = self.channels.lock();
        let state = channels
            .get_mut(name)
            .ok_or_else(|| MonitorError::UnknownChannel(name.clone()))?;
        apply(state)
    }

    fn build_handle(
        &self,
        name: &ChannelName,
        path: &Path,
    ) -> Result<WatchHandle, MonitorError> {
        let delivering = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&delivering);
        let sink = Arc::clone(&self.sink);
        let filter = self.filter.clone();
        let channel = name.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !gate.load(Ordering::Acquire)
                        || !matches!(event.kind, EventKind::Create(_))
                    {
                        return;
                    }
                    if event.paths.is_empty() {
                        sink.discovered(&channel, None);
                        return;
                    }
                    for path in event.paths {
                        if filter.matches(&path) {
                            sink.discovered(
                                &channel,
                                Some(DiscoveredFile::from_path(path)),
                            );
                        }
                    }
                }
                Err(err) => {
                    warn!(channel = %channel, error = %err, "watch error");
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|source| MonitorError::Watch {
            path: path.to_path_buf(),
            source,
        })?;

        // On failure the watcher is dropped here, releasing the partial handle.
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| MonitorError::Watch {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(WatchHandle {
            _watcher: watcher,
            delivering,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn manager() -> (MonitorManager, Arc<AdmissionQueue>) {
        let queue = Arc::new(AdmissionQueue::new());
        let manager = MonitorManager::new(WatchFilter::default(), Arc::clone(&queue));
        manager.register("KK7ABC".into());
        manager.register("W7XYZ".into());
        (manager, queue)
    }

    fn lifecycle(manager: &MonitorManager, name: &str) -> Lifecycle {
        manager.state(&name.into()).unwrap().lifecycle
    }

    #[test]
    fn walks_the_full_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _queue) = manager();
        let name = ChannelName::from("KK7ABC");

        manager.initialize(&name, dir.path()).unwrap();
        assert_eq!(lifecycle(&manager, "KK7ABC"), Lifecycle::Initialized);
        manager.start(&name).unwrap();
        assert_eq!(lifecycle(&manager, "KK7ABC"), Lifecycle::Started);
        manager.stop(&name).unwrap();
        assert_eq!(lifecycle(&manager, "KK7ABC"), Lifecycle::Stopped);
        manager.start(&name).unwrap();
        assert_eq!(lifecycle(&manager, "KK7ABC"), Lifecycle::Started);
        manager.destroy(&name).unwrap();

        let status = manager.state(&name).unwrap();
        assert_eq!(status.lifecycle, Lifecycle::Uninitialized);
        assert!(status.target_path.is_none());
    }

    #[test]
    fn shared_path_is_rejected_and_states_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _queue) = manager();
        let first = ChannelName::from("KK7ABC");
        let second = ChannelName::from("W7XYZ");

        manager.initialize(&first, dir.path()).unwrap();
        manager.start(&first).unwrap();
        let before_first = manager.state(&first).unwrap();
        let before_second = manager.state(&second).unwrap();

        let err = manager.initialize(&second, dir.path()).unwrap_err();
        assert!(matches!(err, MonitorError::PathInUse { ref owner, .. } if *owner == first));
        assert_eq!(manager.state(&first).unwrap(), before_first);
        assert_eq!(manager.state(&second).unwrap(), before_second);
    }

    #[test]
    fn destroyed_path_can_be_reused_by_another_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _queue) = manager();
        let first = ChannelName::from("KK7ABC");
        let second = ChannelName::from("W7XYZ");

        manager.initialize(&first, dir.path()).unwrap();
        manager.destroy(&first).unwrap();
        manager.initialize(&second, dir.path()).unwrap();
        assert_eq!(lifecycle(&manager, "W7XYZ"), Lifecycle::Initialized);
    }

    #[test]
    fn missing_directory_keeps_channel_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _queue) = manager();
        let err = manager
            .initialize(&"KK7ABC".into(), dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, MonitorError::PathNotFound(_)));
        assert_eq!(lifecycle(&manager, "KK7ABC"), Lifecycle::Uninitialized);
    }

    #[test]
    fn guarded_transitions_report_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _queue) = manager();
        let name = ChannelName::from("KK7ABC");

        assert!(matches!(
            manager.start(&name),
            Err(MonitorError::InvalidTransition { action: "start", .. })
        ));
        assert!(matches!(
            manager.destroy(&name),
            Err(MonitorError::InvalidTransition { action: "destroy", .. })
        ));

        manager.initialize(&name, dir.path()).unwrap();
        assert!(matches!(
            manager.stop(&name),
            Err(MonitorError::InvalidTransition { action: "stop", .. })
        ));
        assert!(matches!(
            manager.initialize(&name, dir.path()),
            Err(MonitorError::InvalidTransition { action: "initialize", .. })
        ));
        assert!(matches!(
            manager.start(&"unknown".into()),
            Err(MonitorError::UnknownChannel(_))
        ));
    }

    #[test]
    fn filter_matches_extension_case_insensitively() {
        let filter = WatchFilter::new(".MIME");
        assert!(filter.matches(Path::new("/in/A1B2.mime")));
        assert!(filter.matches(Path::new("/in/A1B2.Mime")));
        assert!(!filter.matches(Path::new("/in/A1B2.txt")));
        assert!(!filter.matches(Path::new("/in/mime")));
    }

    #[tokio::test]
    async fn started_channel_admits_new_message_files() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, queue) = manager();
        let name = ChannelName::from("KK7ABC");
        manager.initialize(&name, dir.path()).unwrap();
        manager.start(&name).unwrap();

        fs::write(dir.path().join("ignored.txt"), b"x").unwrap();
        fs::write(dir.path().join("MSG0001.mime"), b"x").unwrap();

        let file = tokio::time::timeout(Duration::from_secs(5), queue.recv())
            .await
            .expect("creation event delivered");
        assert_eq!(file.file_name(), "MSG0001.mime");
        manager.shutdown();
    }

    #[tokio::test]
    async fn stopped_channel_delivers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, queue) = manager();
        let name = ChannelName::from("KK7ABC");
        manager.initialize(&name, dir.path()).unwrap();
        manager.start(&name).unwrap();
        manager.stop(&name).unwrap();

        fs::write(dir.path().join("MSG0002.mime"), b"x").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn each_channel_delivers_into_its_own_queue() {
        let north_dir = tempfile::tempdir().unwrap();
        let south_dir = tempfile::tempdir().unwrap();
        let queues = Arc::new(ChannelQueues::new());
        let manager =
            MonitorManager::new(WatchFilter::default(), Arc::clone(&queues));
        let north = ChannelName::from("KK7ABC");
        let south = ChannelName::from("W7XYZ");
        for (name, dir) in [(&north, &north_dir), (&south, &south_dir)] {
            manager.register(name.clone());
            manager.initialize(name, dir.path()).unwrap();
            manager.start(name).unwrap();
        }

        fs::write(north_dir.path().join("N0001.mime"), b"x").unwrap();
        fs::write(south_dir.path().join("S0001.mime"), b"x").unwrap();

        let north_queue = queues.queue(&north);
        let south_queue = queues.queue(&south);
        let from_north =
            tokio::time::timeout(Duration::from_secs(5), north_queue.recv())
                .await
                .expect("north event delivered");
        let from_south =
            tokio::time::timeout(Duration::from_secs(5), south_queue.recv())
                .await
                .expect("south event delivered");
        assert_eq!(from_north.file_name(), "N0001.mime");
        assert_eq!(from_south.file_name(), "S0001.mime");
        manager.shutdown();
    }
}
