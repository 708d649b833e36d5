//! Alarm operations: PutMetricAlarm, DescribeAlarms, DeleteAlarms,
//! SetAlarmState and Enable/DisableAlarmActions.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use metricwatch_alarms::StoredAlarm;
use metricwatch_core::alarm::{
    AlarmActions, AlarmDefinition, AlarmState, ComparisonOperator, LowSampleCountPolicy,
    MissingDataPolicy,
};
use metricwatch_core::arn::alarm_arn;
use metricwatch_core::error::CoreError;
use metricwatch_core::metric::MetricIdentity;
use metricwatch_core::statistic::Statistic;
use metricwatch_core::types::{RequestContext, Timestamp};

use super::{parse_unit, AlarmNamesInput, MonitoringService, WireDimension};

/// Upper bound on targets in each of the three action lists.
pub const MAX_ACTIONS_PER_STATE: usize = 5;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutMetricAlarmInput {
    pub alarm_name: String,
    #[serde(default)]
    pub alarm_description: Option<String>,
    #[serde(default)]
    pub actions_enabled: Option<bool>,
    #[serde(default, rename = "OKActions")]
    pub ok_actions: Vec<String>,
    #[serde(default)]
    pub alarm_actions: Vec<String>,
    #[serde(default)]
    pub insufficient_data_actions: Vec<String>,
    pub metric_name: String,
    pub namespace: String,
    #[serde(default)]
    pub statistic: Option<String>,
    #[serde(default)]
    pub extended_statistic: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<WireDimension>,
    pub period: u32,
    #[serde(default)]
    pub unit: Option<String>,
    pub evaluation_periods: u32,
    /// Defaults to `EvaluationPeriods`.
    #[serde(default)]
    pub datapoints_to_alarm: Option<u32>,
    pub threshold: f64,
    pub comparison_operator: String,
    #[serde(default)]
    pub treat_missing_data: Option<String>,
    #[serde(default)]
    pub evaluate_low_sample_count_percentile: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeAlarmsInput {
    #[serde(default)]
    pub alarm_names: Option<Vec<String>>,
    #[serde(default)]
    pub alarm_name_prefix: Option<String>,
    #[serde(default)]
    pub action_prefix: Option<String>,
    #[serde(default)]
    pub state_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetAlarmStateInput {
    pub state_value: String,
    pub state_reason: String,
    /// JSON document, passed as a string.
    #[serde(default)]
    pub state_reason_data: Option<String>,
}

/// An alarm as returned by PutMetricAlarm and DescribeAlarms.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricAlarmView {
    pub alarm_name: String,
    pub alarm_arn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_description: Option<String>,
    pub alarm_configuration_updated_timestamp: Timestamp,
    pub actions_enabled: bool,
    #[serde(rename = "OKActions")]
    pub ok_actions: Vec<String>,
    pub alarm_actions: Vec<String>,
    pub insufficient_data_actions: Vec<String>,
    pub state_value: AlarmState,
    pub state_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_reason_data: Option<String>,
    pub state_updated_timestamp: Timestamp,
    pub metric_name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_statistic: Option<String>,
    pub dimensions: Vec<WireDimension>,
    pub period: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
    pub threshold: f64,
    pub comparison_operator: ComparisonOperator,
    pub treat_missing_data: MissingDataPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluate_low_sample_count_percentile: Option<LowSampleCountPolicy>,
}

impl From<&StoredAlarm> for MetricAlarmView {
    fn from(alarm: &StoredAlarm) -> Self {
        let def = &alarm.definition;
        let runtime = &alarm.runtime;
        let (statistic, extended_statistic) = if def.statistic.is_percentile() {
            (None, Some(def.statistic.to_string()))
        } else {
            (Some(def.statistic.to_string()), None)
        };

        Self {
            alarm_name: def.name.clone(),
            alarm_arn: def.arn.clone(),
            alarm_description: def.description.clone(),
            alarm_configuration_updated_timestamp: def.configuration_updated_at,
            actions_enabled: def.actions_enabled,
            ok_actions: def.actions.ok.clone(),
            alarm_actions: def.actions.alarm.clone(),
            insufficient_data_actions: def.actions.insufficient_data.clone(),
            state_value: runtime.state,
            state_reason: runtime.reason.clone(),
            state_reason_data: runtime.reason_data.as_ref().map(|v| v.to_string()),
            state_updated_timestamp: runtime.state_updated_at,
            metric_name: def.metric.metric_name.clone(),
            namespace: def.metric.namespace.clone(),
            statistic,
            extended_statistic,
            dimensions: def.metric.dimensions().iter().map(Into::into).collect(),
            period: def.period_secs,
            unit: def.unit.map(|u| u.as_str().to_string()),
            evaluation_periods: def.evaluation_periods,
            datapoints_to_alarm: def.datapoints_to_alarm,
            threshold: def.threshold,
            comparison_operator: def.comparison_operator,
            treat_missing_data: def.treat_missing_data,
            evaluate_low_sample_count_percentile: def.evaluate_low_sample_count_percentile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeAlarmsOutput {
    pub metric_alarms: Vec<MetricAlarmView>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl MonitoringService {
    /// Create or update an alarm and (re-)arm its evaluation job.
    ///
    /// Updating keeps the runtime state; the outcome buffer is trimmed to
    /// the new evaluation periods.
    pub async fn put_metric_alarm(
        &self,
        context: &RequestContext,
        input: PutMetricAlarmInput,
    ) -> Result<MetricAlarmView, CoreError> {
        let definition = build_definition(context, input, Utc::now())?;
        let stored = self.registry.put_alarm(definition).await?;
        self.scheduler.start(&stored.definition).await;

        tracing::info!(
            arn = %stored.definition.arn,
            period_secs = stored.definition.period_secs,
            "Metric alarm stored"
        );
        Ok(MetricAlarmView::from(&stored))
    }

    /// Alarms of the calling account/region, sorted by name.
    ///
    /// Only one filter applies, in this order: `ActionPrefix`,
    /// `AlarmNamePrefix`, `AlarmNames`, `StateValue`.
    pub async fn describe_alarms(
        &self,
        context: &RequestContext,
        input: DescribeAlarmsInput,
    ) -> Result<DescribeAlarmsOutput, CoreError> {
        let state_value = input
            .state_value
            .as_deref()
            .map(str::parse::<AlarmState>)
            .transpose()?;

        let alarms = self.registry.list(context).await?;
        let selected: Vec<&StoredAlarm> = if let Some(prefix) = &input.action_prefix {
            alarms
                .iter()
                .filter(|a| a.definition.actions.iter_all().any(|t| t.starts_with(prefix.as_str())))
                .collect()
        } else if let Some(prefix) = &input.alarm_name_prefix {
            alarms
                .iter()
                .filter(|a| a.definition.name.starts_with(prefix.as_str()))
                .collect()
        } else if let Some(names) = &input.alarm_names {
            alarms
                .iter()
                .filter(|a| names.contains(&a.definition.name))
                .collect()
        } else if let Some(state) = state_value {
            alarms.iter().filter(|a| a.runtime.state == state).collect()
        } else {
            alarms.iter().collect()
        };

        Ok(DescribeAlarmsOutput {
            metric_alarms: selected.into_iter().map(MetricAlarmView::from).collect(),
        })
    }

    /// Delete the named alarms and cancel their jobs. Nothing is deleted
    /// if any name is unknown.
    pub async fn delete_alarms(
        &self,
        context: &RequestContext,
        input: AlarmNamesInput,
    ) -> Result<usize, CoreError> {
        let mut arns = Vec::with_capacity(input.alarm_names.len());
        for name in &input.alarm_names {
            arns.push(self.resolve_alarm(context, name).await?.definition.arn);
        }

        for arn in &arns {
            self.scheduler.delete(arn).await;
            self.registry.remove(arn).await?;
            tracing::info!(arn = %arn, "Metric alarm deleted");
        }
        Ok(arns.len())
    }

    /// Force the state of one alarm until its next evaluation.
    pub async fn set_alarm_state(
        &self,
        context: &RequestContext,
        name: &str,
        input: SetAlarmStateInput,
    ) -> Result<(), CoreError> {
        let state: AlarmState = input.state_value.parse()?;
        let reason_data = input
            .state_reason_data
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|e| {
                CoreError::validation(format!("StateReasonData must be valid JSON: {e}"))
            })?;

        let alarm = self.resolve_alarm(context, name).await?;
        self.scheduler
            .set_state(&alarm.definition.arn, state, input.state_reason, reason_data)
            .await?;
        Ok(())
    }

    pub async fn enable_alarm_actions(
        &self,
        context: &RequestContext,
        input: AlarmNamesInput,
    ) -> Result<(), CoreError> {
        self.set_actions_enabled(context, input, true).await
    }

    pub async fn disable_alarm_actions(
        &self,
        context: &RequestContext,
        input: AlarmNamesInput,
    ) -> Result<(), CoreError> {
        self.set_actions_enabled(context, input, false).await
    }

    /// Unknown names are skipped. The running job picks the flag up on its
    /// next tick.
    async fn set_actions_enabled(
        &self,
        context: &RequestContext,
        input: AlarmNamesInput,
        enabled: bool,
    ) -> Result<(), CoreError> {
        for name in &input.alarm_names {
            let Some(alarm) = self.registry.find_by_name(context, name).await? else {
                tracing::debug!(alarm = %name, "Skipping unknown alarm");
                continue;
            };
            match self
                .registry
                .set_actions_enabled(&alarm.definition.arn, enabled)
                .await
            {
                Ok(true) => tracing::info!(alarm = %name, enabled, "Alarm actions toggled"),
                Ok(false) => {}
                Err(CoreError::NotFound { .. }) => {
                    tracing::debug!(alarm = %name, "Alarm deleted before actions were toggled");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn build_definition(
    context: &RequestContext,
    input: PutMetricAlarmInput,
    now: Timestamp,
) -> Result<AlarmDefinition, CoreError> {
    let statistic = match (input.statistic.as_deref(), input.extended_statistic.as_deref()) {
        (Some(simple), None) => Statistic::parse_simple(simple)?,
        (None, Some(extended)) => Statistic::parse_extended(extended)?,
        (Some(_), Some(_)) => {
            return Err(CoreError::validation(
                "The parameters Statistic and ExtendedStatistic are mutually exclusive.",
            ))
        }
        (None, None) => {
            return Err(CoreError::validation(
                "One of Statistic or ExtendedStatistic must be specified.",
            ))
        }
    };

    let comparison_operator: ComparisonOperator = input.comparison_operator.parse()?;
    let treat_missing_data = input
        .treat_missing_data
        .as_deref()
        .map(str::parse::<MissingDataPolicy>)
        .transpose()?
        .unwrap_or_default();
    let evaluate_low_sample_count_percentile = input
        .evaluate_low_sample_count_percentile
        .as_deref()
        .map(str::parse::<LowSampleCountPolicy>)
        .transpose()?;
    let unit = parse_unit(input.unit.as_deref())?;

    let actions = AlarmActions {
        ok: input.ok_actions,
        alarm: input.alarm_actions,
        insufficient_data: input.insufficient_data_actions,
    };
    for (field, targets) in [
        ("OKActions", &actions.ok),
        ("AlarmActions", &actions.alarm),
        ("InsufficientDataActions", &actions.insufficient_data),
    ] {
        if targets.len() > MAX_ACTIONS_PER_STATE {
            return Err(CoreError::validation(format!(
                "The collection {field} must not have more than {MAX_ACTIONS_PER_STATE} items."
            )));
        }
        if targets.iter().any(|t| t.trim().is_empty()) {
            return Err(CoreError::validation(format!(
                "The collection {field} must not contain empty targets."
            )));
        }
    }

    let metric = MetricIdentity::new(
        context.clone(),
        input.namespace,
        input.metric_name,
        input.dimensions.into_iter().map(Into::into).collect(),
    )?;

    let definition = AlarmDefinition {
        arn: alarm_arn(context, &input.alarm_name),
        name: input.alarm_name,
        description: input.alarm_description,
        metric,
        unit,
        statistic,
        period_secs: input.period,
        evaluation_periods: input.evaluation_periods,
        datapoints_to_alarm: input.datapoints_to_alarm.unwrap_or(input.evaluation_periods),
        threshold: input.threshold,
        comparison_operator,
        treat_missing_data,
        evaluate_low_sample_count_percentile,
        actions_enabled: input.actions_enabled.unwrap_or(true),
        actions,
        configuration_updated_at: now,
    };
    definition.validate()?;
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn input() -> PutMetricAlarmInput {
        serde_json::from_value(serde_json::json!({
            "AlarmName": "cpu-high",
            "MetricName": "CPUUtilization",
            "Namespace": "AWS/EC2",
            "Statistic": "Average",
            "Dimensions": [{"Name": "InstanceId", "Value": "i-123"}],
            "Period": 60,
            "EvaluationPeriods": 3,
            "Threshold": 80.0,
            "ComparisonOperator": "GreaterThanThreshold",
            "OKActions": ["arn:aws:sns:us-east-1:000000000000:ok"]
        }))
        .unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("000000000000", "us-east-1")
    }

    #[test]
    fn builds_definition_with_defaults() {
        let def = build_definition(&ctx(), input(), Utc::now()).unwrap();
        assert_eq!(def.arn, "arn:aws:cloudwatch:us-east-1:000000000000:alarm:cpu-high");
        assert_eq!(def.datapoints_to_alarm, 3);
        assert!(def.actions_enabled);
        assert_eq!(def.treat_missing_data, MissingDataPolicy::Missing);
        assert_eq!(def.actions.ok.len(), 1);
    }

    #[test]
    fn extended_statistic_must_be_percentile() {
        let mut input = input();
        input.statistic = None;
        input.extended_statistic = Some("tm99".into());
        assert_matches!(
            build_definition(&ctx(), input, Utc::now()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn accepts_percentile_extended_statistic() {
        let mut input = input();
        input.statistic = None;
        input.extended_statistic = Some("p99.5".into());
        let def = build_definition(&ctx(), input, Utc::now()).unwrap();
        assert_eq!(def.statistic, Statistic::Percentile(99.5));
    }

    #[test]
    fn statistic_and_extended_statistic_are_exclusive() {
        let mut input = input();
        input.extended_statistic = Some("p90".into());
        assert_matches!(
            build_definition(&ctx(), input, Utc::now()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn rejects_unknown_policy_tokens() {
        let mut bad_missing = input();
        bad_missing.treat_missing_data = Some("sometimes".into());
        assert_matches!(
            build_definition(&ctx(), bad_missing, Utc::now()),
            Err(CoreError::Validation(_))
        );

        let mut bad_low_sample = input();
        bad_low_sample.evaluate_low_sample_count_percentile = Some("skip".into());
        assert_matches!(
            build_definition(&ctx(), bad_low_sample, Utc::now()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn rejects_datapoints_to_alarm_above_window() {
        let mut input = input();
        input.datapoints_to_alarm = Some(4);
        assert_matches!(
            build_definition(&ctx(), input, Utc::now()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn rejects_too_many_actions() {
        let mut input = input();
        input.alarm_actions = (0..6).map(|i| format!("arn:aws:sns:us-east-1:0:t{i}")).collect();
        assert_matches!(
            build_definition(&ctx(), input, Utc::now()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn view_splits_simple_and_extended_statistic() {
        let def = build_definition(&ctx(), input(), Utc::now()).unwrap();
        let view = MetricAlarmView::from(&StoredAlarm::new(def));
        assert_eq!(view.statistic.as_deref(), Some("Average"));
        assert_eq!(view.extended_statistic, None);
        assert_eq!(view.state_value, AlarmState::InsufficientData);
        assert_eq!(view.state_reason, "Unchecked: Initial alarm creation");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["OKActions"][0], "arn:aws:sns:us-east-1:000000000000:ok");
        assert_eq!(json["StateValue"], "INSUFFICIENT_DATA");
        assert_eq!(json["TreatMissingData"], "missing");
    }
}
