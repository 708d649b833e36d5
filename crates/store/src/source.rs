//! Read seam used by the alarm scheduler.

use std::sync::Arc;

use async_trait::async_trait;

use metricwatch_core::error::CoreError;

use crate::query::{StatisticBucket, StatisticQuery};
use crate::store::MetricStore;

/// Anything that can answer statistic queries.
///
/// The scheduler only depends on this trait so that a slow or remote store
/// can be bounded by a timeout, and so tests can inject failures.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn statistics(&self, query: &StatisticQuery) -> Result<Vec<StatisticBucket>, CoreError>;
}

/// [`MetricSource`] over a shared [`MetricStore`].
///
/// Queries take series locks, so they run on the blocking pool; a caller's
/// `tokio::time::timeout` can then fire while a query is still waiting.
#[derive(Debug, Clone)]
pub struct StoreSource {
    store: Arc<MetricStore>,
}

impl StoreSource {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetricSource for StoreSource {
    async fn statistics(&self, query: &StatisticQuery) -> Result<Vec<StatisticBucket>, CoreError> {
        let store = Arc::clone(&self.store);
        let query = query.clone();
        tokio::task::spawn_blocking(move || store.query(&query))
            .await
            .map_err(|e| CoreError::Internal(format!("Metric query task failed: {e}")))?
    }
}
