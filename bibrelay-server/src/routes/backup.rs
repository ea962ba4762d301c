use axum::{Json, extract::State};
use serde::Serialize;

use crate::backup;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub path: String,
    pub messages: usize,
}

/// Export the in-memory store to the configured snapshot file.
pub async fn post_backup(
    State(state): State<AppState>,
) -> AppResult<Json<BackupResponse>> {
    let messages = state.store.messages();
    let written = backup::export(&state.backup_path, &messages).await?;
    state
        .activity
        .submit(format!("backup exported ({written} messages)"));
    Ok(Json(BackupResponse {
        path: state.backup_path.display().to_string(),
        messages: written,
    }))
}
