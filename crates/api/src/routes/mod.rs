pub mod alarms;
pub mod health;
pub mod internal;
pub mod metrics;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /metrics/data                  PutMetricData (POST)
/// /metrics/query                 GetMetricData (POST)
/// /metrics/list                  ListMetrics (POST)
///
/// /alarms                        PutMetricAlarm (POST)
/// /alarms/describe               DescribeAlarms (POST)
/// /alarms/delete                 DeleteAlarms (POST)
/// /alarms/{name}/state           SetAlarmState (POST)
/// /alarms/actions/enable         EnableAlarmActions (POST)
/// /alarms/actions/disable        DisableAlarmActions (POST)
/// ```
///
/// Every route reads the account and region from the `x-account-id` and
/// `x-region` headers.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(metrics::router())
        .merge(alarms::router())
}
