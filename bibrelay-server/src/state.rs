use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bibrelay_core::ActivityLog;
use chrono::{DateTime, Utc};

use crate::audit::AuditLog;
use crate::store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    pub audit: Arc<AuditLog>,
    pub activity: ActivityLog,
    pub backup_path: Arc<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("audit_dir", &self.audit.dir())
            .field("backup_path", &self.backup_path)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        store: Arc<MessageStore>,
        audit: AuditLog,
        activity: ActivityLog,
        backup_path: PathBuf,
    ) -> Self {
        Self {
            store,
            audit: Arc::new(audit),
            activity,
            backup_path: Arc::new(backup_path),
            started_at: Utc::now(),
        }
    }
}
