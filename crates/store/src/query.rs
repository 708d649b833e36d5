//! Statistic queries and period-grid alignment.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use metricwatch_core::error::CoreError;
use metricwatch_core::metric::{MetricIdentity, StandardUnit};
use metricwatch_core::statistic::Statistic;
use metricwatch_core::types::{RequestContext, Timestamp};
use metricwatch_core::validation::validate_query_period;

/// Dimension constraint in a [`MetricFilter`]. A missing value matches any
/// value of the named dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Pattern over metric identities within one account/region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFilter {
    pub context: RequestContext,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<DimensionFilter>,
}

impl MetricFilter {
    pub fn all(context: RequestContext) -> Self {
        Self {
            context,
            namespace: None,
            metric_name: None,
            dimensions: Vec::new(),
        }
    }

    pub fn matches(&self, identity: &MetricIdentity) -> bool {
        if identity.context != self.context {
            return false;
        }
        if self.namespace.as_deref().is_some_and(|ns| ns != identity.namespace) {
            return false;
        }
        if self
            .metric_name
            .as_deref()
            .is_some_and(|name| name != identity.metric_name)
        {
            return false;
        }
        self.dimensions.iter().all(|filter| {
            identity.dimensions().iter().any(|dim| {
                dim.name == filter.name
                    && filter.value.as_deref().map_or(true, |v| v == dim.value)
            })
        })
    }
}

/// What a query reads: one exact series, or every series matching a
/// pattern (merged into the same buckets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricTarget {
    Identity(MetricIdentity),
    Matching(MetricFilter),
}

impl MetricTarget {
    pub fn matches(&self, identity: &MetricIdentity) -> bool {
        match self {
            MetricTarget::Identity(target) => target == identity,
            MetricTarget::Matching(filter) => filter.matches(identity),
        }
    }
}

/// One statistic range query over `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticQuery {
    pub target: MetricTarget,
    pub start: Timestamp,
    pub end: Timestamp,
    pub period_secs: u32,
    pub statistic: Statistic,
    #[serde(default)]
    pub unit: Option<StandardUnit>,
}

impl StatisticQuery {
    pub fn new(
        identity: MetricIdentity,
        start: Timestamp,
        end: Timestamp,
        period_secs: u32,
        statistic: Statistic,
    ) -> Self {
        Self {
            target: MetricTarget::Identity(identity),
            start,
            end,
            period_secs,
            statistic,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Option<StandardUnit>) -> Self {
        self.unit = unit;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_query_period(self.period_secs)?;
        if self.start >= self.end {
            return Err(CoreError::validation(format!(
                "The parameter StartTime ({}) must be before EndTime ({})",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// One non-empty bucket of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticBucket {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// Start (in epoch milliseconds) of the `period_secs` bucket containing
/// `timestamp`. Buckets are multiples of the period since the Unix epoch.
pub fn bucket_start_millis(timestamp: &Timestamp, period_secs: u32) -> i64 {
    let period_ms = i64::from(period_secs.max(1)) * 1000;
    timestamp.timestamp_millis().div_euclid(period_ms) * period_ms
}

/// Start of the `period_secs` bucket containing `timestamp`.
pub fn align_to_period(timestamp: &Timestamp, period_secs: u32) -> Timestamp {
    let millis = bucket_start_millis(timestamp, period_secs);
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(*timestamp)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use metricwatch_core::metric::Dimension;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new("000000000000", "us-east-1")
    }

    #[test]
    fn alignment_is_absolute_not_query_relative() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 10, 7, 42).unwrap();
        assert_eq!(
            align_to_period(&t, 300),
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 5, 0).unwrap()
        );
        assert_eq!(
            align_to_period(&t, 60),
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 7, 0).unwrap()
        );
    }

    #[test]
    fn filter_matches_dimension_subsets() {
        let identity = MetricIdentity::new(
            ctx(),
            "App",
            "Latency",
            vec![Dimension::new("Host", "h1"), Dimension::new("Stage", "prod")],
        )
        .unwrap();

        let mut filter = MetricFilter::all(ctx());
        assert!(filter.matches(&identity));

        filter.dimensions.push(DimensionFilter {
            name: "Host".into(),
            value: None,
        });
        assert!(filter.matches(&identity));

        filter.dimensions.push(DimensionFilter {
            name: "Stage".into(),
            value: Some("dev".into()),
        });
        assert!(!filter.matches(&identity));
    }

    #[test]
    fn filter_is_scoped_to_context() {
        let identity = MetricIdentity::new(ctx(), "App", "Latency", vec![]).unwrap();
        let other = MetricFilter::all(RequestContext::new("111111111111", "us-east-1"));
        assert!(!other.matches(&identity));
    }

    #[test]
    fn rejects_inverted_range() {
        let identity = MetricIdentity::new(ctx(), "App", "Latency", vec![]).unwrap();
        let t = Utc::now();
        let query = StatisticQuery::new(identity, t, t, 60, Statistic::Sum);
        assert!(query.validate().is_err());
    }
}
