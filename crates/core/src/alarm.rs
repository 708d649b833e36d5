//! Metric alarm definitions and their persisted runtime state.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metric::{MetricIdentity, StandardUnit};
use crate::statistic::Statistic;
use crate::types::{RequestContext, Timestamp};

/// Reason recorded on an alarm that has not been evaluated yet.
pub const INITIAL_STATE_REASON: &str = "Unchecked: Initial alarm creation";

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl ComparisonOperator {
    /// Whether `value` breaches `threshold` under this operator.
    pub fn is_breaching(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThanThreshold => value > threshold,
            ComparisonOperator::GreaterThanOrEqualToThreshold => value >= threshold,
            ComparisonOperator::LessThanThreshold => value < threshold,
            ComparisonOperator::LessThanOrEqualToThreshold => value <= threshold,
        }
    }

    /// Human-readable phrase used in state reasons.
    pub fn phrase(self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThanThreshold => "greater than",
            ComparisonOperator::GreaterThanOrEqualToThreshold => "greater than or equal to",
            ComparisonOperator::LessThanThreshold => "less than",
            ComparisonOperator::LessThanOrEqualToThreshold => "less than or equal to",
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GreaterThanThreshold" => Ok(Self::GreaterThanThreshold),
            "GreaterThanOrEqualToThreshold" => Ok(Self::GreaterThanOrEqualToThreshold),
            "LessThanThreshold" => Ok(Self::LessThanThreshold),
            "LessThanOrEqualToThreshold" => Ok(Self::LessThanOrEqualToThreshold),
            other => Err(CoreError::validation(format!(
                "Unsupported ComparisonOperator: {other}"
            ))),
        }
    }
}

/// How periods without datapoints are treated (`TreatMissingData`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingDataPolicy {
    #[default]
    #[serde(rename = "missing")]
    Missing,
    #[serde(rename = "ignore")]
    Ignore,
    #[serde(rename = "breaching")]
    Breaching,
    #[serde(rename = "notBreaching")]
    NotBreaching,
}

impl FromStr for MissingDataPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(Self::Missing),
            "ignore" => Ok(Self::Ignore),
            "breaching" => Ok(Self::Breaching),
            "notBreaching" => Ok(Self::NotBreaching),
            other => Err(CoreError::validation(format!(
                "Option {other} is not supported. Supported options for parameter \
                 TreatMissingData are missing, ignore, breaching and notBreaching."
            ))),
        }
    }
}

/// `EvaluateLowSampleCountPercentile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LowSampleCountPolicy {
    Evaluate,
    Ignore,
}

impl FromStr for LowSampleCountPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evaluate" => Ok(Self::Evaluate),
            "ignore" => Ok(Self::Ignore),
            other => Err(CoreError::validation(format!(
                "Option {other} is not supported. Supported options for parameter \
                 EvaluateLowSampleCountPercentile are evaluate and ignore."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ALARM")]
    Alarm,
    #[serde(rename = "INSUFFICIENT_DATA")]
    InsufficientData,
}

impl AlarmState {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmState::Ok => "OK",
            AlarmState::Alarm => "ALARM",
            AlarmState::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl FromStr for AlarmState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(AlarmState::Ok),
            "ALARM" => Ok(AlarmState::Alarm),
            "INSUFFICIENT_DATA" => Ok(AlarmState::InsufficientData),
            other => Err(CoreError::validation(format!("Unsupported StateValue: {other}"))),
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// Action targets (SNS topic ARNs, webhook URLs, ...) per target state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmActions {
    #[serde(default)]
    pub ok: Vec<String>,
    #[serde(default)]
    pub alarm: Vec<String>,
    #[serde(default)]
    pub insufficient_data: Vec<String>,
}

impl AlarmActions {
    pub fn for_state(&self, state: AlarmState) -> &[String] {
        match state {
            AlarmState::Ok => &self.ok,
            AlarmState::Alarm => &self.alarm,
            AlarmState::InsufficientData => &self.insufficient_data,
        }
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &String> {
        self.ok
            .iter()
            .chain(self.alarm.iter())
            .chain(self.insufficient_data.iter())
    }
}

/// A metric alarm as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub metric: MetricIdentity,
    #[serde(default)]
    pub unit: Option<StandardUnit>,
    pub statistic: Statistic,
    pub period_secs: u32,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
    pub threshold: f64,
    pub comparison_operator: ComparisonOperator,
    #[serde(default)]
    pub treat_missing_data: MissingDataPolicy,
    #[serde(default)]
    pub evaluate_low_sample_count_percentile: Option<LowSampleCountPolicy>,
    pub actions_enabled: bool,
    #[serde(default)]
    pub actions: AlarmActions,
    pub configuration_updated_at: Timestamp,
}

impl AlarmDefinition {
    pub fn context(&self) -> &RequestContext {
        &self.metric.context
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.period_secs))
    }

    /// Structural checks on the evaluation window and period.
    pub fn validate(&self) -> Result<(), CoreError> {
        crate::validation::validate_alarm_name(&self.name)?;
        crate::validation::validate_period(self.period_secs)?;
        if self.evaluation_periods == 0 {
            return Err(CoreError::validation(
                "EvaluationPeriods must be at least 1",
            ));
        }
        if self.datapoints_to_alarm == 0 || self.datapoints_to_alarm > self.evaluation_periods {
            return Err(CoreError::validation(format!(
                "DatapointsToAlarm must be between 1 and EvaluationPeriods ({}), got {}",
                self.evaluation_periods, self.datapoints_to_alarm
            )));
        }
        if !self.threshold.is_finite() {
            return Err(CoreError::validation("Threshold must be a finite number"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Breaching,
    NotBreaching,
    Missing,
}

/// Result of evaluating one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodOutcome {
    pub period_start: Timestamp,
    pub kind: OutcomeKind,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Mutable evaluation state of one alarm, persisted after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRuntimeState {
    pub state: AlarmState,
    pub reason: String,
    #[serde(default)]
    pub reason_data: Option<serde_json::Value>,
    pub state_updated_at: Timestamp,
    #[serde(default)]
    pub last_evaluated_at: Option<Timestamp>,
    /// Oldest first; never longer than the alarm's evaluation periods.
    #[serde(default)]
    pub recent_outcomes: VecDeque<PeriodOutcome>,
}

impl AlarmRuntimeState {
    pub fn initial(now: Timestamp) -> Self {
        Self {
            state: AlarmState::InsufficientData,
            reason: INITIAL_STATE_REASON.to_string(),
            reason_data: None,
            state_updated_at: now,
            last_evaluated_at: None,
            recent_outcomes: VecDeque::new(),
        }
    }

    /// Append an outcome, keeping at most `capacity` entries.
    ///
    /// An outcome for the period already at the head of the buffer replaces
    /// it, so re-evaluating a period never counts it twice.
    pub fn record(&mut self, outcome: PeriodOutcome, capacity: usize) {
        match self.recent_outcomes.back_mut() {
            Some(last) if last.period_start == outcome.period_start => *last = outcome,
            _ => self.recent_outcomes.push_back(outcome),
        }
        self.truncate_to(capacity);
    }

    /// Drop the oldest outcomes beyond `capacity`.
    pub fn truncate_to(&mut self, capacity: usize) {
        while self.recent_outcomes.len() > capacity.max(1) {
            self.recent_outcomes.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn outcome(minute: u32, kind: OutcomeKind) -> PeriodOutcome {
        PeriodOutcome {
            period_start: Utc.with_ymd_and_hms(2026, 1, 1, 10, minute, 0).unwrap(),
            kind,
            value: None,
        }
    }

    #[test]
    fn operators_compare_against_threshold() {
        assert!(ComparisonOperator::GreaterThanThreshold.is_breaching(11.0, 10.0));
        assert!(!ComparisonOperator::GreaterThanThreshold.is_breaching(10.0, 10.0));
        assert!(ComparisonOperator::GreaterThanOrEqualToThreshold.is_breaching(10.0, 10.0));
        assert!(ComparisonOperator::LessThanThreshold.is_breaching(9.0, 10.0));
        assert!(ComparisonOperator::LessThanOrEqualToThreshold.is_breaching(10.0, 10.0));
    }

    #[test]
    fn missing_data_tokens_parse() {
        assert_eq!(
            "notBreaching".parse::<MissingDataPolicy>().unwrap(),
            MissingDataPolicy::NotBreaching
        );
        assert!("sometimes".parse::<MissingDataPolicy>().is_err());
        assert!("evaluate".parse::<LowSampleCountPolicy>().is_ok());
        assert!("skip".parse::<LowSampleCountPolicy>().is_err());
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut runtime = AlarmRuntimeState::initial(Utc::now());
        for minute in 0..5 {
            runtime.record(outcome(minute, OutcomeKind::Breaching), 3);
        }
        assert_eq!(runtime.recent_outcomes.len(), 3);
        assert_eq!(
            runtime.recent_outcomes.front().unwrap().period_start,
            outcome(2, OutcomeKind::Breaching).period_start
        );
    }

    #[test]
    fn ring_buffer_replaces_same_period() {
        let mut runtime = AlarmRuntimeState::initial(Utc::now());
        runtime.record(outcome(1, OutcomeKind::Missing), 3);
        runtime.record(outcome(1, OutcomeKind::Breaching), 3);
        assert_eq!(runtime.recent_outcomes.len(), 1);
        assert_eq!(runtime.recent_outcomes[0].kind, OutcomeKind::Breaching);
    }

    #[test]
    fn state_serializes_with_wire_names() {
        assert_eq!(
            serde_json::to_value(AlarmState::InsufficientData).unwrap(),
            serde_json::json!("INSUFFICIENT_DATA")
        );
        assert_eq!(
            serde_json::to_value(MissingDataPolicy::NotBreaching).unwrap(),
            serde_json::json!("notBreaching")
        );
    }
}
