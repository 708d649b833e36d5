//! In-memory metric time-series store.
//!
//! Series are indexed in a sharded [`DashMap`]; each series sits behind its
//! own [`RwLock`]. Index shards are only held long enough to clone the
//! series handle, so ingestion into one identity never stalls queries or
//! ingestion on another.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use metricwatch_core::error::CoreError;
use metricwatch_core::metric::{Datapoint, MetricIdentity, StandardUnit};
use metricwatch_core::types::Timestamp;

use crate::aggregate::BucketAggregate;
use crate::query::{bucket_start_millis, MetricFilter, MetricTarget, StatisticBucket, StatisticQuery};
use crate::series::{Series, SeriesSnapshot};

type SeriesHandle = Arc<RwLock<Series>>;

/// A stored metric and the unit its series is pinned to.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub identity: MetricIdentity,
    pub unit: Option<StandardUnit>,
}

/// Concurrent store of datapoints keyed by [`MetricIdentity`].
///
/// Cheap to share via `Arc<MetricStore>`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct MetricStore {
    series: DashMap<MetricIdentity, SeriesHandle>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one datapoint.
    pub fn put(&self, identity: &MetricIdentity, datapoint: Datapoint) -> Result<(), CoreError> {
        self.put_many(identity, vec![datapoint])
    }

    /// Store a batch for one identity. The batch is validated as a whole
    /// (finite values, non-negative sample counts, a unit consistent with
    /// the series) and rejected without storing anything if any datapoint
    /// fails.
    pub fn put_many(
        &self,
        identity: &MetricIdentity,
        datapoints: Vec<Datapoint>,
    ) -> Result<(), CoreError> {
        self.put_batches(BTreeMap::from([(identity.clone(), datapoints)]))
            .map(|_| ())
    }

    /// Store batches for several identities as one unit. Every batch is
    /// checked against its series before anything is written; on failure no
    /// series changes and no new series is left behind. Returns the number
    /// of datapoints stored.
    pub fn put_batches(
        &self,
        batches: BTreeMap<MetricIdentity, Vec<Datapoint>>,
    ) -> Result<usize, CoreError> {
        let batches: Vec<(MetricIdentity, Vec<Datapoint>)> = batches
            .into_iter()
            .filter(|(_, datapoints)| !datapoints.is_empty())
            .collect();
        if batches.is_empty() {
            return Ok(0);
        }

        loop {
            let handles: Vec<SeriesHandle> = batches
                .iter()
                .map(|(identity, _)| self.handle_or_create(identity))
                .collect();
            // Identity order; concurrent batches lock series in the same order.
            let mut guards: Vec<_> = handles.iter().map(|handle| handle.write()).collect();
            if guards.iter().any(|series| series.is_retired()) {
                continue;
            }

            let checked: Result<Vec<Option<StandardUnit>>, CoreError> = batches
                .iter()
                .zip(&guards)
                .map(|((identity, datapoints), series)| series.check_batch(identity, datapoints))
                .collect();
            let units = match checked {
                Ok(units) => units,
                Err(e) => {
                    drop(guards);
                    for (identity, _) in &batches {
                        self.remove_if_empty(identity);
                    }
                    return Err(e);
                }
            };

            let mut stored = 0;
            for ((series, unit), (identity, datapoints)) in
                guards.iter_mut().zip(units).zip(batches)
            {
                stored += datapoints.len();
                tracing::trace!(metric = %identity, count = datapoints.len(), "Stored datapoints");
                series.apply_batch(unit, datapoints);
            }
            return Ok(stored);
        }
    }

    /// Compute one statistic per non-empty, epoch-aligned bucket in
    /// `[query.start, query.end)`, ordered by bucket start.
    pub fn query(&self, query: &StatisticQuery) -> Result<Vec<StatisticBucket>, CoreError> {
        query.validate()?;

        let mut buckets: BTreeMap<i64, BucketAggregate> = BTreeMap::new();
        for handle in self.matching_handles(&query.target) {
            let series = handle.read();
            if !unit_matches(series.unit(), query.unit) {
                continue;
            }
            for dp in series.range(&query.start, &query.end) {
                let key = bucket_start_millis(&dp.timestamp, query.period_secs);
                buckets.entry(key).or_default().add(&dp.value);
            }
        }

        Ok(buckets
            .into_iter()
            .filter_map(|(millis, agg)| {
                let timestamp = Utc.timestamp_millis_opt(millis).single()?;
                let value = agg.value(query.statistic)?;
                Some(StatisticBucket { timestamp, value })
            })
            .collect())
    }

    /// Distinct stored metrics matching `filter`, sorted by identity.
    pub fn list_metrics(&self, filter: &MetricFilter) -> Vec<MetricSummary> {
        let mut metrics: Vec<MetricSummary> = self
            .series
            .iter()
            .filter(|entry| filter.matches(entry.key()))
            .filter_map(|entry| {
                let series = entry.value().read();
                (!series.is_empty()).then(|| MetricSummary {
                    identity: entry.key().clone(),
                    unit: series.unit(),
                })
            })
            .collect();
        metrics.sort_by(|a, b| a.identity.cmp(&b.identity));
        metrics
    }

    /// Drop every series.
    pub fn clear(&self) {
        let dropped = self.series.len();
        self.series.clear();
        tracing::debug!(series = dropped, "Metric store cleared");
    }

    /// Remove datapoints older than `cutoff` and any series left empty.
    pub fn purge_older_than(&self, cutoff: Timestamp) -> usize {
        let mut removed = 0;
        let mut emptied = Vec::new();
        for entry in self.series.iter() {
            let mut series = entry.value().write();
            removed += series.purge_before(&cutoff);
            if series.is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for identity in &emptied {
            self.remove_if_empty(identity);
        }
        removed
    }

    /// Number of series holding at least one datapoint.
    pub fn series_count(&self) -> usize {
        self.series
            .iter()
            .filter(|entry| !entry.value().read().is_empty())
            .count()
    }

    pub fn datapoint_count(&self) -> usize {
        self.series.iter().map(|entry| entry.value().read().len()).sum()
    }

    /// Copy every series out for persistence or the raw-metrics endpoint.
    pub fn export(&self) -> Vec<SeriesSnapshot> {
        let mut snapshots: Vec<SeriesSnapshot> = self
            .series
            .iter()
            .filter_map(|entry| {
                let series = entry.value().read();
                (!series.is_empty()).then(|| SeriesSnapshot {
                    identity: entry.key().clone(),
                    unit: series.unit(),
                    datapoints: series.datapoints().to_vec(),
                })
            })
            .collect();
        snapshots.sort_by(|a, b| a.identity.cmp(&b.identity));
        snapshots
    }

    /// Replace the store contents with `snapshots`.
    pub fn import(&self, snapshots: Vec<SeriesSnapshot>) {
        self.series.clear();
        for snapshot in snapshots {
            let (identity, series) = Series::from_snapshot(snapshot);
            self.series.insert(identity, Arc::new(RwLock::new(series)));
        }
    }

    // ---- private helpers ----

    fn handle_or_create(&self, identity: &MetricIdentity) -> SeriesHandle {
        if let Some(existing) = self.series.get(identity) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.series.entry(identity.clone()).or_default().value())
    }

    /// Drop the series for `identity` if it holds no datapoints. A series
    /// locked by a writer is left alone; a removed series is retired so a
    /// writer still holding its handle starts over.
    fn remove_if_empty(&self, identity: &MetricIdentity) {
        self.series
            .remove_if(identity, |_, handle| match handle.try_write() {
                Some(mut series) if series.is_empty() => {
                    series.retire();
                    true
                }
                _ => false,
            });
    }

    fn matching_handles(&self, target: &MetricTarget) -> Vec<SeriesHandle> {
        match target {
            MetricTarget::Identity(identity) => self
                .series
                .get(identity)
                .map(|entry| vec![Arc::clone(entry.value())])
                .unwrap_or_default(),
            MetricTarget::Matching(_) => self
                .series
                .iter()
                .filter(|entry| target.matches(entry.key()))
                .map(|entry| Arc::clone(entry.value()))
                .collect(),
        }
    }
}

/// A unit filter only matches series pinned to that unit; a series that
/// never received a unit counts as `None`.
fn unit_matches(series_unit: Option<StandardUnit>, filter: Option<StandardUnit>) -> bool {
    match filter {
        None => true,
        Some(wanted) => series_unit.unwrap_or(StandardUnit::None) == wanted,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
