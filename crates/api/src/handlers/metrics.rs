//! Handlers for metric ingestion and queries.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::context::AccountContext;
use crate::response::DataResponse;
use crate::service::metrics::{
    GetMetricDataInput, GetMetricDataOutput, ListMetricsInput, ListMetricsOutput,
    PutMetricDataInput, RawMetrics,
};
use crate::state::AppState;

/// POST /api/v1/metrics/data
pub async fn put_metric_data(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<PutMetricDataInput>,
) -> AppResult<StatusCode> {
    state.service.put_metric_data(&ctx, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/metrics/query
pub async fn get_metric_data(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<GetMetricDataInput>,
) -> AppResult<Json<DataResponse<GetMetricDataOutput>>> {
    let output = state.service.get_metric_data(&ctx, input).await?;
    Ok(Json(DataResponse { data: output }))
}

/// POST /api/v1/metrics/list
pub async fn list_metrics(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<ListMetricsInput>,
) -> AppResult<Json<DataResponse<ListMetricsOutput>>> {
    let output = state.service.list_metrics(&ctx, input).await?;
    Ok(Json(DataResponse { data: output }))
}

/// GET /_aws/cloudwatch/metrics/raw
///
/// Every stored datapoint across accounts and regions, without the data
/// envelope.
pub async fn raw_metrics(State(state): State<AppState>) -> Json<RawMetrics> {
    Json(state.service.raw_metrics().await)
}
