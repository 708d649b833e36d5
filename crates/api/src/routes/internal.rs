//! Root-level emulator endpoints outside `/api/v1`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{admin, metrics};
use crate::state::AppState;

/// ```text
/// GET  /_aws/cloudwatch/metrics/raw    -> raw_metrics
/// GET  /cloudwatch/metrics/raw         -> raw_metrics (deprecated path)
/// POST /_admin/state/reset             -> reset_state
/// POST /_admin/state/save              -> save_state
/// POST /_admin/state/restore           -> restore_state
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/_aws/cloudwatch/metrics/raw", get(metrics::raw_metrics))
        .route("/cloudwatch/metrics/raw", get(metrics::raw_metrics))
        .route("/_admin/state/reset", post(admin::reset_state))
        .route("/_admin/state/save", post(admin::save_state))
        .route("/_admin/state/restore", post(admin::restore_state))
}
