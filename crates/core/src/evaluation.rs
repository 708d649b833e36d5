//! Alarm state machine.
//!
//! Pure logic: no store access and no clock. The scheduler fetches the
//! period statistic, turns it into a [`PeriodOutcome`] with [`classify`],
//! records it in the alarm's ring buffer and then asks [`evaluate`] for the
//! next state.

use std::collections::VecDeque;

use serde_json::json;

use crate::alarm::{AlarmDefinition, AlarmState, MissingDataPolicy, OutcomeKind, PeriodOutcome};

/// Next state computed for an alarm, with the reason to record if the state
/// changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: AlarmState,
    pub reason: String,
    pub reason_data: serde_json::Value,
}

/// Turn one period's statistic (or its absence) into an outcome.
///
/// Returns `None` when the period must be dropped from the window
/// entirely (`TreatMissingData = ignore`).
pub fn classify(definition: &AlarmDefinition, value: Option<f64>) -> Option<OutcomeKind> {
    match value {
        Some(v) if definition
            .comparison_operator
            .is_breaching(v, definition.threshold) =>
        {
            Some(OutcomeKind::Breaching)
        }
        Some(_) => Some(OutcomeKind::NotBreaching),
        None => match definition.treat_missing_data {
            MissingDataPolicy::Missing => Some(OutcomeKind::Missing),
            MissingDataPolicy::Ignore => None,
            MissingDataPolicy::Breaching => Some(OutcomeKind::Breaching),
            MissingDataPolicy::NotBreaching => Some(OutcomeKind::NotBreaching),
        },
    }
}

/// Decide the next state from the most recent outcomes (oldest first).
///
/// Only the newest `evaluation_periods` entries are considered. While fewer
/// than N outcomes exist the alarm stays `INSUFFICIENT_DATA`, unless the
/// missing-data policy is `breaching` or `notBreaching`: the periods not yet
/// observed then count as that outcome and the full rule applies.
///
/// - `datapoints_to_alarm` or more breaching: `ALARM`.
/// - Every period missing: `INSUFFICIENT_DATA`.
/// - No breaching period: `OK`.
/// - Anything else: `previous` is kept.
pub fn evaluate(
    definition: &AlarmDefinition,
    outcomes: &VecDeque<PeriodOutcome>,
    previous: AlarmState,
) -> Decision {
    let n = definition.evaluation_periods.max(1) as usize;
    let m = definition.datapoints_to_alarm.max(1) as usize;
    let window: Vec<&PeriodOutcome> = outcomes.iter().skip(outcomes.len().saturating_sub(n)).collect();
    let unobserved = n - window.len();

    let mut breaching = count(&window, OutcomeKind::Breaching);
    let missing = count(&window, OutcomeKind::Missing);
    let op = definition.comparison_operator.phrase();
    let threshold = definition.threshold;

    if unobserved > 0 {
        match definition.treat_missing_data {
            MissingDataPolicy::Breaching => breaching += unobserved,
            MissingDataPolicy::NotBreaching => {}
            MissingDataPolicy::Missing | MissingDataPolicy::Ignore => {
                return Decision {
                    state: AlarmState::InsufficientData,
                    reason: format!(
                        "Insufficient Data: {} of {n} evaluation periods observed.",
                        window.len()
                    ),
                    reason_data: reason_data(definition, &window),
                };
            }
        }
    }

    let (state, reason) = if breaching >= m {
        (
            AlarmState::Alarm,
            format!(
                "Threshold Crossed: {breaching} out of the last {n} datapoints {} \
                 {op} the threshold ({threshold}) (minimum {m} datapoints for \
                 {previous} -> ALARM transition).",
                datapoint_summary(&window),
            ),
        )
    } else if missing == n {
        (
            AlarmState::InsufficientData,
            format!("Insufficient Data: no datapoints in the last {n} periods."),
        )
    } else if breaching == 0 {
        (
            AlarmState::Ok,
            format!(
                "Threshold Crossed: {} datapoints {} were not {op} the threshold ({threshold}).",
                n - missing,
                datapoint_summary(&window),
            ),
        )
    } else {
        (
            previous,
            format!(
                "No change: {breaching} of the last {n} datapoints {op} the threshold \
                 ({threshold}), below the {m} required."
            ),
        )
    };

    Decision {
        state,
        reason,
        reason_data: reason_data(definition, &window),
    }
}

fn count(window: &[&PeriodOutcome], kind: OutcomeKind) -> usize {
    window.iter().filter(|o| o.kind == kind).count()
}

/// `[12.5 (10:05:00), 9.0 (10:00:00)]`, newest first.
fn datapoint_summary(window: &[&PeriodOutcome]) -> String {
    let items: Vec<String> = window
        .iter()
        .rev()
        .filter_map(|o| {
            o.value
                .map(|v| format!("{v} ({})", o.period_start.format("%d/%m/%y %H:%M:%S")))
        })
        .collect();
    format!("[{}]", items.join(", "))
}

fn reason_data(definition: &AlarmDefinition, window: &[&PeriodOutcome]) -> serde_json::Value {
    let evaluated: Vec<serde_json::Value> = window
        .iter()
        .rev()
        .map(|o| {
            json!({
                "timestamp": o.period_start,
                "value": o.value,
                "outcome": o.kind,
            })
        })
        .collect();
    let recent: Vec<f64> = window.iter().rev().filter_map(|o| o.value).collect();

    json!({
        "version": "1.0",
        "statistic": definition.statistic.to_string(),
        "period": definition.period_secs,
        "threshold": definition.threshold,
        "recentDatapoints": recent,
        "evaluatedDatapoints": evaluated,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
