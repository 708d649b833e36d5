//! Periodic purge of old metric datapoints.
//!
//! Drops every datapoint older than the configured retention from the
//! [`MetricStore`] on a fixed interval using `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metricwatch_core::types::Timestamp;
use metricwatch_store::MetricStore;
use tokio_util::sync::CancellationToken;

/// How often the purge runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the retention loop until `cancel` is triggered.
///
/// The first purge happens immediately.
pub async fn run(store: Arc<MetricStore>, retention_hours: i64, cancel: CancellationToken) {
    tracing::info!(
        retention_hours,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Metrics retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Metrics retention job stopping");
                break;
            }
            _ = interval.tick() => {
                purge(&store, retention_hours);
            }
        }
    }
}

fn purge(store: &MetricStore, retention_hours: i64) -> usize {
    let Some(cutoff) = retention_cutoff(Utc::now(), retention_hours) else {
        tracing::warn!(retention_hours, "Metrics retention out of range, nothing purged");
        return 0;
    };
    let deleted = store.purge_older_than(cutoff);
    if deleted > 0 {
        tracing::info!(deleted, "Metrics retention: purged old datapoints");
    } else {
        tracing::debug!("Metrics retention: nothing to purge");
    }
    deleted
}

/// `now - retention_hours`, or `None` when that is not a representable
/// timestamp.
fn retention_cutoff(now: Timestamp, retention_hours: i64) -> Option<Timestamp> {
    chrono::Duration::try_hours(retention_hours).and_then(|age| now.checked_sub_signed(age))
}
