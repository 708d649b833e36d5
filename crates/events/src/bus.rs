//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`MonitoringEvent`]s
//! (alarm transitions and alarm actions that are not delivered over HTTP).
//! It is designed to be shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use metricwatch_core::alarm::AlarmState;

/// Event type published for every real alarm state transition.
pub const EVENT_ALARM_STATE_CHANGED: &str = "alarm.state_changed";

/// Event type published for alarm actions routed to the host (SNS topics,
/// Lambda functions, ...).
pub const EVENT_ALARM_ACTION: &str = "alarm.action";

// ---------------------------------------------------------------------------
// AlarmTransition
// ---------------------------------------------------------------------------

/// A real state change of one alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmTransition {
    pub alarm_arn: String,
    pub alarm_name: String,
    pub account_id: String,
    pub region: String,
    pub old_state: AlarmState,
    pub new_state: AlarmState,
    pub reason: String,
    #[serde(default)]
    pub reason_data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// MonitoringEvent
// ---------------------------------------------------------------------------

/// Envelope for everything published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub id: Uuid,
    /// Dot-separated event name, e.g. `"alarm.state_changed"`.
    pub event_type: String,
    /// Alarm the event concerns.
    pub alarm_arn: String,
    /// Action target for `alarm.action` events.
    #[serde(default)]
    pub target: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl MonitoringEvent {
    pub fn new(event_type: impl Into<String>, alarm_arn: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            alarm_arn: alarm_arn.into(),
            target: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// `alarm.state_changed` event carrying the transition as payload.
    pub fn state_changed(transition: &AlarmTransition) -> Self {
        Self::new(EVENT_ALARM_STATE_CHANGED, &transition.alarm_arn)
            .with_payload(serde_json::to_value(transition).unwrap_or_default())
    }

    /// `alarm.action` event addressed to `target`.
    pub fn action(target: &str, transition: &AlarmTransition) -> Self {
        let mut event = Self::state_changed(transition);
        event.event_type = EVENT_ALARM_ACTION.to_string();
        event.target = Some(target.to_string());
        event
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest unconsumed events are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<MonitoringEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody listens.
    pub fn publish(&self, event: MonitoringEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitoringEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
