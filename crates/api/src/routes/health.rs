use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Alarms with a live evaluation job.
    pub alarms_scheduled: usize,
    /// Metric series currently stored.
    pub series: usize,
}

/// GET /health -- returns service status and store/scheduler counters.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let alarms_scheduled = state.service.scheduler().active_jobs().await.len();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        alarms_scheduled,
        series: state.service.store().series_count(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
