use axum::{Json, extract::State, http::StatusCode};
use bibrelay_model::ParsedMessage;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const INGEST_PATH: &str = "/WinlinkMessage";

/// Accept one forwarded message.
///
/// 200 once the message is stored and audited, 409 for a resubmission,
/// 400 for a message without records and 500 when auditing or
/// persistence fails. A message whose audit write failed is forgotten so
/// the sender can retry it.
pub async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<ParsedMessage>,
) -> AppResult<StatusCode> {
    if message.is_empty() {
        warn!(message_id = %message.message_id, "message without bib records rejected");
        return Err(AppError::bad_request("BibRecords must not be empty"));
    }

    let message_id = message.message_id.clone();
    let outcome = state.store.accept(message.clone()).await;
    if !outcome.accepted {
        state
            .activity
            .submit(format!("duplicate message {message_id} ignored"));
        return Err(AppError::conflict(format!(
            "message {message_id} was already received"
        )));
    }

    let audited = state.audit.write(&message).await;
    if !audited {
        // Unaudited messages must stay resubmittable.
        state.store.forget(&message.identity());
        state
            .activity
            .submit(format!("audit write failed for {message_id}"));
        return Err(AppError::internal(format!(
            "message {message_id} accepted but the audit write failed"
        )));
    }

    if outcome.persistence_failed() {
        state
            .activity
            .submit(format!("persistence failed for {message_id}"));
        return Err(AppError::internal(format!(
            "message {message_id} accepted but could not be persisted"
        )));
    }

    info!(
        message_id = %message_id,
        origin_host = %message.origin_host,
        records = message.bib_records.len(),
        persisted = ?outcome.persisted,
        "message accepted"
    );
    state.activity.submit(format!(
        "accepted {message_id} from {} ({} records)",
        message.origin_host,
        message.bib_records.len()
    ));
    Ok(StatusCode::OK)
}
