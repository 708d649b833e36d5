//! Handlers for the state lifecycle admin endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::service::lifecycle::PersistSummary;
use crate::state::AppState;

/// POST /_admin/state/reset
///
/// Cancel every alarm job and drop all alarms and metrics.
pub async fn reset_state(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.service.on_state_reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /_admin/state/save
pub async fn save_state(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<PersistSummary>>> {
    let summary = state.service.save_state().await?;
    Ok(Json(DataResponse { data: summary }))
}

/// POST /_admin/state/restore
pub async fn restore_state(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<PersistSummary>>> {
    let summary = state.service.on_state_restore().await?;
    Ok(Json(DataResponse { data: summary }))
}
