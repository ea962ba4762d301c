use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::reports::{self, ReportRow, Statistics};
use crate::state::AppState;

pub async fn aid_station_report(
    State(state): State<AppState>,
    Path(location): Path<String>,
) -> Json<Vec<ReportRow>> {
    Json(reports::by_location(&state.store.messages(), &location))
}

pub async fn bib_report(
    State(state): State<AppState>,
    Path(bib): Path<i32>,
) -> Json<Vec<ReportRow>> {
    Json(reports::by_bib(&state.store.messages(), bib))
}

pub async fn dropped_report(State(state): State<AppState>) -> Json<Vec<ReportRow>> {
    Json(reports::dropped(&state.store.messages()))
}

pub async fn all_report(State(state): State<AppState>) -> Json<Vec<ReportRow>> {
    Json(reports::all_rows(&state.store.messages()))
}

pub async fn statistics(State(state): State<AppState>) -> Json<Statistics> {
    Json(Statistics::compute(&state.store.messages()))
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub messages: usize,
    pub persisted: Option<u64>,
    pub backend: &'static str,
}

pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let persisted = match state.store.persisted_count().await {
        Ok(count) => Some(count),
        Err(err) => {
            warn!(error = %err, "could not count persisted messages");
            None
        }
    };

    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        messages: state.store.len(),
        persisted,
        backend: state.store.backend(),
    })
}
