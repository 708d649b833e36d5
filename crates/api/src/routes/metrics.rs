//! Route definitions for metric ingestion and queries.

use axum::routing::post;
use axum::Router;

use crate::handlers::metrics;
use crate::state::AppState;

/// Metric routes, merged into `/api/v1`.
///
/// ```text
/// POST /metrics/data     -> put_metric_data
/// POST /metrics/query    -> get_metric_data
/// POST /metrics/list     -> list_metrics
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/metrics/data", post(metrics::put_metric_data))
        .route("/metrics/query", post(metrics::get_metric_data))
        .route("/metrics/list", post(metrics::list_metrics))
}
