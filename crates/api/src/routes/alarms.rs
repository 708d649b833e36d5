//! Route definitions for metric alarms.

use axum::routing::post;
use axum::Router;

use crate::handlers::alarms;
use crate::state::AppState;

/// Alarm routes, merged into `/api/v1`.
///
/// ```text
/// POST /alarms                    -> put_metric_alarm
/// POST /alarms/describe           -> describe_alarms
/// POST /alarms/delete             -> delete_alarms
/// POST /alarms/{name}/state       -> set_alarm_state
/// POST /alarms/actions/enable     -> enable_alarm_actions
/// POST /alarms/actions/disable    -> disable_alarm_actions
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alarms", post(alarms::put_metric_alarm))
        .route("/alarms/describe", post(alarms::describe_alarms))
        .route("/alarms/delete", post(alarms::delete_alarms))
        .route("/alarms/{name}/state", post(alarms::set_alarm_state))
        .route("/alarms/actions/enable", post(alarms::enable_alarm_actions))
        .route("/alarms/actions/disable", post(alarms::disable_alarm_actions))
}
