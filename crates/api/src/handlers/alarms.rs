//! Handlers for metric alarms.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::context::AccountContext;
use crate::response::DataResponse;
use crate::service::alarms::{
    DescribeAlarmsInput, DescribeAlarmsOutput, MetricAlarmView, PutMetricAlarmInput,
    SetAlarmStateInput,
};
use crate::service::AlarmNamesInput;
use crate::state::AppState;

/// POST /api/v1/alarms
///
/// Create or update a metric alarm.
pub async fn put_metric_alarm(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<PutMetricAlarmInput>,
) -> AppResult<Json<DataResponse<MetricAlarmView>>> {
    let alarm = state.service.put_metric_alarm(&ctx, input).await?;
    Ok(Json(DataResponse { data: alarm }))
}

/// POST /api/v1/alarms/describe
pub async fn describe_alarms(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<DescribeAlarmsInput>,
) -> AppResult<Json<DataResponse<DescribeAlarmsOutput>>> {
    let output = state.service.describe_alarms(&ctx, input).await?;
    Ok(Json(DataResponse { data: output }))
}

/// POST /api/v1/alarms/delete
///
/// Returns 404 without deleting anything if any name is unknown.
pub async fn delete_alarms(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<AlarmNamesInput>,
) -> AppResult<StatusCode> {
    state.service.delete_alarms(&ctx, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/alarms/{name}/state
pub async fn set_alarm_state(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Path(name): Path<String>,
    Json(input): Json<SetAlarmStateInput>,
) -> AppResult<StatusCode> {
    state.service.set_alarm_state(&ctx, &name, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/alarms/actions/enable
pub async fn enable_alarm_actions(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<AlarmNamesInput>,
) -> AppResult<StatusCode> {
    state.service.enable_alarm_actions(&ctx, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/alarms/actions/disable
pub async fn disable_alarm_actions(
    State(state): State<AppState>,
    AccountContext(ctx): AccountContext,
    Json(input): Json<AlarmNamesInput>,
) -> AppResult<StatusCode> {
    state.service.disable_alarm_actions(&ctx, input).await?;
    Ok(StatusCode::NO_CONTENT)
}
