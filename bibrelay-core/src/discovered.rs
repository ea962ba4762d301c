use std::cmp::Ordering;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// A message file noticed by a directory watch.
///
/// Equality, hashing and ordering use the full path only; the derived
/// name and creation time are carried for display.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    full_path: PathBuf,
    file_name: String,
    created_at: DateTime<Utc>,
}

impl DiscoveredFile {
    /// Derive name and creation time from the file on disk.
    ///
    /// Filesystems without birth time fall back to the modification time,
    /// and unreadable metadata falls back to now.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let full_path = path.into();
        let created_at = fs::metadata(&full_path)
            .and_then(|meta| meta.created().or_else(|_| meta.modified()))
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Self::with_created(full_path, created_at)
    }

    pub fn with_created(
        path: impl Into<PathBuf>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let full_path = path.into();
        let file_name = full_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            full_path,
            file_name,
            created_at,
        }
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl PartialEq for DiscoveredFile {
    fn eq(&self, other: &Self) -> bool {
        self.full_path == other.full_path
    }
}

impl Eq for DiscoveredFile {}

impl Hash for DiscoveredFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_path.hash(state);
    }
}

impl PartialOrd for DiscoveredFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiscoveredFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.full_path.cmp(&other.full_path)
    }
}
