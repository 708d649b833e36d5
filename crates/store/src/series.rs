//! One metric series: a timestamp-ordered vector of datapoints.

use serde::{Deserialize, Serialize};

use metricwatch_core::error::CoreError;
use metricwatch_core::metric::{Datapoint, MetricIdentity, StandardUnit};
use metricwatch_core::types::Timestamp;

#[derive(Debug, Default)]
pub struct Series {
    /// First explicit unit ever stored; later datapoints must agree.
    unit: Option<StandardUnit>,
    /// Sorted by timestamp; equal timestamps keep insertion order.
    points: Vec<Datapoint>,
    /// Set when the series is dropped from the store index. Writers holding
    /// a stale handle must look the identity up again.
    retired: bool,
}

impl Series {
    pub fn unit(&self) -> Option<StandardUnit> {
        self.unit
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    /// Validate a batch against this series without changing it. Returns
    /// the unit the series is pinned to once the batch is applied.
    pub fn check_batch(
        &self,
        identity: &MetricIdentity,
        datapoints: &[Datapoint],
    ) -> Result<Option<StandardUnit>, CoreError> {
        let mut unit = self.unit;
        for dp in datapoints {
            dp.validate()?;
            match (unit, dp.unit) {
                (_, None) => {}
                (None, Some(new)) => unit = Some(new),
                (Some(existing), Some(new)) if existing == new => {}
                (Some(existing), Some(new)) => {
                    return Err(CoreError::validation(format!(
                        "Unit {new} is inconsistent with unit {existing} already \
                         stored for metric {identity}"
                    )));
                }
            }
        }
        Ok(unit)
    }

    /// Insert a batch previously accepted by [`Series::check_batch`].
    pub fn apply_batch(&mut self, unit: Option<StandardUnit>, datapoints: Vec<Datapoint>) {
        self.unit = unit;
        for dp in datapoints {
            self.insert(dp);
        }
    }

    fn insert(&mut self, datapoint: Datapoint) {
        let at_end = self
            .points
            .last()
            .map_or(true, |last| last.timestamp <= datapoint.timestamp);
        if at_end {
            self.points.push(datapoint);
        } else {
            let idx = self
                .points
                .partition_point(|p| p.timestamp <= datapoint.timestamp);
            self.points.insert(idx, datapoint);
        }
    }

    /// Datapoints with `start <= timestamp < end`.
    pub fn range(&self, start: &Timestamp, end: &Timestamp) -> &[Datapoint] {
        let lo = self.points.partition_point(|p| p.timestamp < *start);
        let hi = self.points.partition_point(|p| p.timestamp < *end);
        &self.points[lo..hi.max(lo)]
    }

    pub fn datapoints(&self) -> &[Datapoint] {
        &self.points
    }

    /// Drop datapoints older than `cutoff`; returns how many were removed.
    pub fn purge_before(&mut self, cutoff: &Timestamp) -> usize {
        let idx = self.points.partition_point(|p| p.timestamp < *cutoff);
        self.points.drain(..idx).count()
    }

    pub fn from_snapshot(snapshot: SeriesSnapshot) -> (MetricIdentity, Self) {
        let mut points = snapshot.datapoints;
        points.sort_by_key(|p| p.timestamp);
        (
            snapshot.identity,
            Self {
                unit: snapshot.unit,
                points,
                retired: false,
            },
        )
    }
}

/// Serializable copy of one series, used for state persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub identity: MetricIdentity,
    #[serde(default)]
    pub unit: Option<StandardUnit>,
    pub datapoints: Vec<Datapoint>,
}
