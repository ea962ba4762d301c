//! Most-recent-first view of discovered files for operator display.
//!
//! The buffer has no admission authority; it only mirrors what the watch
//! channels have seen lately.

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

use crate::discovered::DiscoveredFile;

/// Number of files kept for display.
pub const RECENT_ACTIVITY_CAPACITY: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("pop_back called on an empty recent-activity buffer")]
    Empty,
}

/// Fixed-capacity circular buffer; the front is the newest entry.
pub struct RecentActivity {
    slots: Vec<Option<DiscoveredFile>>,
    head: usize,
    len: usize,
}

impl fmt::Debug for RecentActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecentActivity")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .finish()
    }
}

impl Default for RecentActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl RecentActivity {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_ACTIVITY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert at the front. When full, the oldest entry is overwritten and
    /// returned.
    pub fn push_front(&mut self, file: DiscoveredFile) -> Option<DiscoveredFile> {
        let capacity = self.capacity();
        self.head = (self.head + capacity - 1) % capacity;
        // When full the new head slot is the current tail.
        let evicted = self.slots[self.head].replace(file);
        if self.len < capacity {
            self.len += 1;
        }
        evicted
    }

    pub fn pop_back(&mut self) -> Result<DiscoveredFile, RingError> {
        if self.len == 0 {
            return Err(RingError::Empty);
        }
        let tail = (self.head + self.len - 1) % self.capacity();
        self.len -= 1;
        self.slots[tail].take().ok_or(RingError::Empty)
    }

    /// Entries front to back, newest first.
    pub fn snapshot(&self) -> Vec<DiscoveredFile> {
        let capacity = self.capacity();
        (0..self.len)
            .filter_map(|offset| self.slots[(self.head + offset) % capacity].clone())
            .collect()
    }
}

/// Recent-activity buffer behind one coarse lock.
///
/// The lock spans the push and the snapshot so display never observes a
/// half-applied update. Every channel serializes on it.
#[derive(Debug, Default)]
pub struct SharedRecentActivity {
    inner: Mutex<RecentActivity>,
}

impl SharedRecentActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_and_snapshot(&self, file: DiscoveredFile) -> Vec<DiscoveredFile> {
        let mut buffer = self.inner.lock();
        buffer.push_front(file);
        buffer.snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
