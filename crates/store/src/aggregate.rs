//! Per-bucket statistic accumulation.

use metricwatch_core::metric::DatapointValue;
use metricwatch_core::statistic::Statistic;

/// Running aggregate for one period bucket.
///
/// Single values contribute to every statistic and are kept for
/// percentiles. Statistic sets merge their counts, sums and extremes but
/// carry no raw values, so they never contribute to percentiles.
#[derive(Debug, Clone)]
pub struct BucketAggregate {
    sample_count: f64,
    sum: f64,
    minimum: f64,
    maximum: f64,
    values: Vec<f64>,
}

impl Default for BucketAggregate {
    fn default() -> Self {
        Self {
            sample_count: 0.0,
            sum: 0.0,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
            values: Vec::new(),
        }
    }
}

impl BucketAggregate {
    pub fn add(&mut self, value: &DatapointValue) {
        match value {
            DatapointValue::Single(v) => {
                self.sample_count += 1.0;
                self.sum += v;
                self.minimum = self.minimum.min(*v);
                self.maximum = self.maximum.max(*v);
                self.values.push(*v);
            }
            DatapointValue::StatisticSet(set) => {
                self.sample_count += set.sample_count;
                self.sum += set.sum;
                self.minimum = self.minimum.min(set.minimum);
                self.maximum = self.maximum.max(set.maximum);
            }
        }
    }

    /// Compute `stat` for this bucket, or `None` if it has nothing to say.
    pub fn value(&self, stat: Statistic) -> Option<f64> {
        if self.sample_count <= 0.0 && self.values.is_empty() {
            return None;
        }
        match stat {
            Statistic::Average => Some(self.sum / self.sample_count),
            Statistic::Sum => Some(self.sum),
            Statistic::Minimum => Some(self.minimum),
            Statistic::Maximum => Some(self.maximum),
            Statistic::SampleCount => Some(self.sample_count),
            Statistic::Percentile(p) => percentile(&self.values, p),
        }
    }
}

/// Linear-interpolated `p`-th percentile (0..=100) of `values`.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}
