//! Structured log of every bus event.
//!
//! [`EventJournal`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes each [`MonitoringEvent`] to the tracing output, so
//! `alarm.action` events for SNS/Lambda targets are visible even when no
//! host component routes them. It stops when cancelled or when the bus is
//! dropped.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::MonitoringEvent;

pub struct EventJournal;

impl EventJournal {
    /// Run the journal loop until `cancel` fires or the channel closes.
    /// Returns the number of events logged.
    pub async fn run(
        mut receiver: broadcast::Receiver<MonitoringEvent>,
        cancel: CancellationToken,
    ) -> usize {
        let mut logged = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Event journal stopping");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => {
                        Self::record(&event);
                        logged += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event journal lagged, some events were not logged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, journal shutting down");
                        break;
                    }
                },
            }
        }
        logged
    }

    fn record(event: &MonitoringEvent) {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            arn = %event.alarm_arn,
            target = event.target.as_deref().unwrap_or("-"),
            "Monitoring event"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::EventBus;

    #[tokio::test]
    async fn logs_until_bus_is_dropped() {
        let bus = Arc::new(EventBus::default());
        let handle = tokio::spawn(EventJournal::run(bus.subscribe(), CancellationToken::new()));

        bus.publish(MonitoringEvent::new("alarm.state_changed", "arn:a"));
        bus.publish(MonitoringEvent::new("alarm.action", "arn:a"));
        drop(bus);

        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let bus = EventBus::default();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(EventJournal::run(bus.subscribe(), cancel.clone()));

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), 0);
    }
}
