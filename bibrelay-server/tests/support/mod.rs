use std::path::Path;
use std::sync::Arc;

use axum::Router;
use bibrelay_core::ActivityLog;
use bibrelay_server::{
    AppState,
    audit::AuditLog,
    repository::{InMemoryMessageRepository, MessageRepository},
    routes::create_router,
    store::MessageStore,
};
use serde_json::{Value, json};
use tempfile::TempDir;

// Code is used by test modules, but not in this scope
#[allow(unused)]
#[derive(Debug)]
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub tempdir: TempDir,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(InMemoryMessageRepository::new()))
}

pub fn build_test_app_with(repository: Arc<dyn MessageRepository>) -> TestApp {
    let tempdir = tempfile::tempdir().expect("create tempdir");
    let root = tempdir.path();
    std::fs::create_dir_all(root.join("audit")).expect("create audit dir");

    let state = AppState::new(
        Arc::new(MessageStore::new(repository)),
        AuditLog::new(root.join("audit")),
        ActivityLog::new(root.join("logs/activity.log")),
        root.join("backup/messages.json"),
    );
    TestApp {
        router: create_router(state.clone()),
        state,
        tempdir,
    }
}

#[allow(unused)]
pub fn audit_file(root: &Path, message_id: &str) -> std::path::PathBuf {
    root.join("audit").join(format!("{message_id}.txt"))
}

#[allow(unused)]
pub fn message_body(message_id: &str, rows: &[(i32, &str, &str, i32, &str, bool)]) -> Value {
    let records: Vec<Value> = rows
        .iter()
        .map(|(bib, action, time, day, location, warning)| {
            json!({
                "BibNumber": bib,
                "Action": action,
                "BibTimeOfDay": time,
                "DayOfMonth": day,
                "Location": location,
                "DataWarning": warning,
            })
        })
        .collect();
    json!({
        "WinlinkMessageId": message_id,
        "MessageDateStamp": "2023-08-19T17:05:00Z",
        "ClientHostname": "aid-3",
        "FileCreatedTimeStamp": "2023-08-19T17:06:12Z",
        "BibRecords": records,
    })
}
