//! Alarm event bus and action delivery.
//!
//! - [`EventBus`] is the in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`MonitoringEvent`] is the envelope every published event uses.
//! - [`delivery`] fires alarm actions: webhooks over HTTP, everything else
//!   through the bus.
//! - [`EventJournal`] logs every bus event.

pub mod bus;
pub mod delivery;
pub mod journal;

pub use bus::{AlarmTransition, EventBus, MonitoringEvent, EVENT_ALARM_ACTION, EVENT_ALARM_STATE_CHANGED};
pub use delivery::webhook::WebhookDelivery;
pub use delivery::{ActionDispatcher, ActionNotifier, DeliveryError};
pub use journal::EventJournal;
