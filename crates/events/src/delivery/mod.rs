//! Alarm action delivery.
//!
//! [`ActionNotifier`] is the seam the scheduler fires actions through.
//! [`ActionDispatcher`] is the production implementation: HTTP(S) targets
//! get one webhook POST, every other target (SNS topics, Lambda functions,
//! ...) becomes an `alarm.action` event on the [`EventBus`] for the host to
//! pick up.

pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{AlarmTransition, EventBus, MonitoringEvent};
use webhook::{WebhookDelivery, WebhookError};

/// Error type for action delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

/// Delivers one alarm action to its target.
#[async_trait]
pub trait ActionNotifier: Send + Sync {
    async fn notify(&self, target: &str, transition: &AlarmTransition) -> Result<(), DeliveryError>;
}

/// Whether `target` is delivered over HTTP rather than through the bus.
pub fn is_http_target(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Routes alarm actions to webhooks or the event bus.
pub struct ActionDispatcher {
    webhook: WebhookDelivery,
    bus: Arc<EventBus>,
}

impl ActionDispatcher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            webhook: WebhookDelivery::new(),
            bus,
        }
    }
}

#[async_trait]
impl ActionNotifier for ActionDispatcher {
    async fn notify(&self, target: &str, transition: &AlarmTransition) -> Result<(), DeliveryError> {
        if is_http_target(target) {
            self.webhook.deliver(target, transition).await?;
            tracing::debug!(alarm = %transition.alarm_name, target, "Webhook action delivered");
        } else {
            self.bus.publish(MonitoringEvent::action(target, transition));
            tracing::debug!(alarm = %transition.alarm_name, target, "Action published to event bus");
        }
        Ok(())
    }
}
