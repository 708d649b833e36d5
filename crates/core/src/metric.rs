//! Metric identities and datapoints.
//!
//! A [`MetricIdentity`] names one time series. Dimensions are sorted on
//! construction (and on deserialization) so that two identities built from
//! the same dimension set in different orders compare and hash equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{RequestContext, Timestamp};

/// Maximum number of dimensions on one metric.
pub const MAX_DIMENSIONS: usize = 30;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Units accepted on datapoints and query filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StandardUnit {
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    BytesPerSecond,
    KilobytesPerSecond,
    MegabytesPerSecond,
    GigabytesPerSecond,
    TerabytesPerSecond,
    BitsPerSecond,
    KilobitsPerSecond,
    MegabitsPerSecond,
    GigabitsPerSecond,
    TerabitsPerSecond,
    CountPerSecond,
    None,
}

const UNIT_NAMES: &[(StandardUnit, &str)] = &[
    (StandardUnit::Seconds, "Seconds"),
    (StandardUnit::Microseconds, "Microseconds"),
    (StandardUnit::Milliseconds, "Milliseconds"),
    (StandardUnit::Bytes, "Bytes"),
    (StandardUnit::Kilobytes, "Kilobytes"),
    (StandardUnit::Megabytes, "Megabytes"),
    (StandardUnit::Gigabytes, "Gigabytes"),
    (StandardUnit::Terabytes, "Terabytes"),
    (StandardUnit::Bits, "Bits"),
    (StandardUnit::Kilobits, "Kilobits"),
    (StandardUnit::Megabits, "Megabits"),
    (StandardUnit::Gigabits, "Gigabits"),
    (StandardUnit::Terabits, "Terabits"),
    (StandardUnit::Percent, "Percent"),
    (StandardUnit::Count, "Count"),
    (StandardUnit::BytesPerSecond, "Bytes/Second"),
    (StandardUnit::KilobytesPerSecond, "Kilobytes/Second"),
    (StandardUnit::MegabytesPerSecond, "Megabytes/Second"),
    (StandardUnit::GigabytesPerSecond, "Gigabytes/Second"),
    (StandardUnit::TerabytesPerSecond, "Terabytes/Second"),
    (StandardUnit::BitsPerSecond, "Bits/Second"),
    (StandardUnit::KilobitsPerSecond, "Kilobits/Second"),
    (StandardUnit::MegabitsPerSecond, "Megabits/Second"),
    (StandardUnit::GigabitsPerSecond, "Gigabits/Second"),
    (StandardUnit::TerabitsPerSecond, "Terabits/Second"),
    (StandardUnit::CountPerSecond, "Count/Second"),
    (StandardUnit::None, "None"),
];

impl StandardUnit {
    pub fn as_str(self) -> &'static str {
        UNIT_NAMES
            .iter()
            .find(|(unit, _)| *unit == self)
            .map(|(_, name)| *name)
            .unwrap_or("None")
    }
}

impl FromStr for StandardUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UNIT_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(unit, _)| *unit)
            .ok_or_else(|| CoreError::validation(format!("Unsupported unit: {s}")))
    }
}

impl TryFrom<String> for StandardUnit {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StandardUnit> for String {
    fn from(unit: StandardUnit) -> Self {
        unit.as_str().to_string()
    }
}

impl fmt::Display for StandardUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Key of one metric series.
///
/// The unit is deliberately not part of the key: a series pins the first
/// explicit unit it receives and later datapoints must agree with it (see
/// `metricwatch_store`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "IdentityRepr")]
pub struct MetricIdentity {
    pub context: RequestContext,
    pub namespace: String,
    pub metric_name: String,
    dimensions: Vec<Dimension>,
}

#[derive(Deserialize)]
struct IdentityRepr {
    context: RequestContext,
    namespace: String,
    metric_name: String,
    #[serde(default)]
    dimensions: Vec<Dimension>,
}

impl From<IdentityRepr> for MetricIdentity {
    fn from(repr: IdentityRepr) -> Self {
        Self::new_unchecked(repr.context, repr.namespace, repr.metric_name, repr.dimensions)
    }
}

impl MetricIdentity {
    /// Build a validated identity. Dimensions are sorted by name, then value.
    pub fn new(
        context: RequestContext,
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        dimensions: Vec<Dimension>,
    ) -> Result<Self, CoreError> {
        let identity = Self::new_unchecked(context, namespace, metric_name, dimensions);
        identity.validate()?;
        Ok(identity)
    }

    fn new_unchecked(
        context: RequestContext,
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        mut dimensions: Vec<Dimension>,
    ) -> Self {
        dimensions.sort();
        Self {
            context,
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            dimensions,
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.namespace.trim().is_empty() {
            return Err(CoreError::validation("Namespace must not be empty"));
        }
        if self.metric_name.trim().is_empty() {
            return Err(CoreError::validation("MetricName must not be empty"));
        }
        if self.dimensions.len() > MAX_DIMENSIONS {
            return Err(CoreError::validation(format!(
                "A metric may have at most {MAX_DIMENSIONS} dimensions, got {}",
                self.dimensions.len()
            )));
        }
        for pair in self.dimensions.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(CoreError::validation(format!(
                    "Duplicate dimension name: {}",
                    pair[0].name
                )));
            }
        }
        if let Some(dim) = self.dimensions.iter().find(|d| d.name.is_empty()) {
            return Err(CoreError::validation(format!(
                "Dimension name must not be empty (value {:?})",
                dim.value
            )));
        }
        Ok(())
    }

    /// Sorted dimension set.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.metric_name)?;
        for dim in &self.dimensions {
            write!(f, " {}={}", dim.name, dim.value)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Datapoints
// ---------------------------------------------------------------------------

/// Pre-aggregated submission covering many samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticSet {
    pub sample_count: f64,
    pub sum: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl StatisticSet {
    pub fn validate(&self) -> Result<(), CoreError> {
        let fields = [self.sample_count, self.sum, self.minimum, self.maximum];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::validation(
                "StatisticValues must contain only finite numbers",
            ));
        }
        if self.sample_count < 0.0 {
            return Err(CoreError::validation(format!(
                "SampleCount must not be negative, got {}",
                self.sample_count
            )));
        }
        if self.minimum > self.maximum {
            return Err(CoreError::validation(format!(
                "Minimum ({}) must not exceed Maximum ({})",
                self.minimum, self.maximum
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatapointValue {
    Single(f64),
    StatisticSet(StatisticSet),
}

/// One observation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: Timestamp,
    pub value: DatapointValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<StandardUnit>,
}

impl Datapoint {
    pub fn single(timestamp: Timestamp, value: f64) -> Self {
        Self {
            timestamp,
            value: DatapointValue::Single(value),
            unit: None,
        }
    }

    pub fn statistic_set(timestamp: Timestamp, set: StatisticSet) -> Self {
        Self {
            timestamp,
            value: DatapointValue::StatisticSet(set),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: StandardUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Checks that do not depend on previously stored data.
    pub fn validate(&self) -> Result<(), CoreError> {
        match &self.value {
            DatapointValue::Single(v) if !v.is_finite() => Err(CoreError::validation(format!(
                "Value must be a finite number, got {v}"
            ))),
            DatapointValue::Single(_) => Ok(()),
            DatapointValue::StatisticSet(set) => set.validate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new("000000000000", "us-east-1")
    }

    #[test]
    fn dimension_order_does_not_affect_identity() {
        let a = MetricIdentity::new(
            ctx(),
            "App",
            "Latency",
            vec![Dimension::new("Service", "api"), Dimension::new("Host", "h1")],
        )
        .unwrap();
        let b = MetricIdentity::new(
            ctx(),
            "App",
            "Latency",
            vec![Dimension::new("Host", "h1"), Dimension::new("Service", "api")],
        )
        .unwrap();

        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn deserialized_identity_is_normalized() {
        let json = serde_json::json!({
            "context": {"account_id": "1", "region": "eu-west-1"},
            "namespace": "App",
            "metric_name": "Errors",
            "dimensions": [
                {"name": "Z", "value": "1"},
                {"name": "A", "value": "2"}
            ]
        });
        let identity: MetricIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(identity.dimensions()[0].name, "A");
        assert_eq!(identity.dimensions()[1].name, "Z");
    }

    #[test]
    fn rejects_duplicate_dimension_names() {
        let result = MetricIdentity::new(
            ctx(),
            "App",
            "Latency",
            vec![Dimension::new("Host", "a"), Dimension::new("Host", "b")],
        );
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_empty_namespace() {
        let result = MetricIdentity::new(ctx(), " ", "Latency", vec![]);
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn unit_round_trips_through_its_wire_name() {
        let unit: StandardUnit = "Count/Second".parse().unwrap();
        assert_eq!(unit, StandardUnit::CountPerSecond);
        assert_eq!(
            serde_json::to_value(unit).unwrap(),
            serde_json::json!("Count/Second")
        );
        assert!("Furlongs".parse::<StandardUnit>().is_err());
    }

    #[test]
    fn negative_sample_count_is_invalid() {
        let dp = Datapoint::statistic_set(
            Utc::now(),
            StatisticSet {
                sample_count: -1.0,
                sum: 0.0,
                minimum: 0.0,
                maximum: 0.0,
            },
        );
        assert_matches!(dp.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn non_finite_value_is_invalid() {
        assert!(Datapoint::single(Utc::now(), f64::NAN).validate().is_err());
        assert!(Datapoint::single(Utc::now(), 1.5).validate().is_ok());
    }
}
