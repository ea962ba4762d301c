mod backup;
mod ingest;
mod reports;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use ingest::INGEST_PATH;

/// Route table of the ingest service.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(INGEST_PATH, post(ingest::post_message))
        .route("/Backup", post(backup::post_backup))
        .route(
            "/Report/AidStation/{location}",
            get(reports::aid_station_report),
        )
        .route("/Report/Bib/{bib}", get(reports::bib_report))
        .route("/Report/Dropped", get(reports::dropped_report))
        .route("/Report/All", get(reports::all_report))
        .route("/Statistics", get(reports::statistics))
        .route("/ServiceInfo", get(reports::service_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
