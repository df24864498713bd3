//! Service status endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use paynotify_engine::EngineSettings;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/service/status", get(service_status))
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub pid: u32,
    pub delivery_enabled: bool,
    pub concurrency: usize,
    pub max_retry: u32,
}

/// GET /api/service/status — Report that the process is up and how delivery is configured.
///
/// `max_retry` is the ceiling the engine enforces, after clamping to the backoff table.
async fn service_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "running",
        pid: std::process::id(),
        delivery_enabled: state.config.delivery().is_some(),
        concurrency: state.config.notify_concurrency,
        max_retry: EngineSettings::from_config(&state.config).effective_max_retry(),
    })
}
