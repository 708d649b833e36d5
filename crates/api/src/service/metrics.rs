//! Metric ingestion and query operations.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use metricwatch_core::error::CoreError;
use metricwatch_core::metric::{Datapoint, DatapointValue, MetricIdentity, StatisticSet};
use metricwatch_core::statistic::Statistic;
use metricwatch_core::types::{RequestContext, Timestamp};
use metricwatch_store::{DimensionFilter, MetricFilter, StatisticQuery};

use super::{parse_unit, MonitoringService, WireDimension};

/// Upper bound on datums in one PutMetricData call.
pub const MAX_METRIC_DATA: usize = 1000;

/// Upper bound on queries in one GetMetricData call.
pub const MAX_METRIC_DATA_QUERIES: usize = 500;

// ---------------------------------------------------------------------------
// PutMetricData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticValues {
    pub sample_count: f64,
    pub sum: f64,
    pub minimum: f64,
    pub maximum: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: Vec<WireDimension>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Defaults to the time of the call.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub statistic_values: Option<StatisticValues>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutMetricDataInput {
    pub namespace: String,
    pub metric_data: Vec<MetricDatum>,
}

// ---------------------------------------------------------------------------
// GetMetricData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricInput {
    pub namespace: String,
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: Vec<WireDimension>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricStat {
    pub metric: MetricInput,
    pub period: u32,
    pub stat: String,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDataQuery {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub metric_stat: Option<MetricStat>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub return_data: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ScanBy {
    TimestampAscending,
    #[default]
    TimestampDescending,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetMetricDataInput {
    pub metric_data_queries: Vec<MetricDataQuery>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    #[serde(default)]
    pub scan_by: ScanBy,
    /// Cap on datapoints returned across all queries.
    #[serde(default)]
    pub max_datapoints: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultStatus {
    Complete,
    InternalError,
    PartialData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageData {
    pub code: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDataResult {
    pub id: String,
    pub label: String,
    pub timestamps: Vec<Timestamp>,
    pub values: Vec<f64>,
    pub status_code: ResultStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageData>,
}

impl MetricDataResult {
    fn failed(id: String, label: String, message: String) -> Self {
        Self {
            id,
            label,
            timestamps: Vec::new(),
            values: Vec::new(),
            status_code: ResultStatus::InternalError,
            messages: vec![MessageData {
                code: "InternalError".to_string(),
                value: message,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetMetricDataOutput {
    pub metric_data_results: Vec<MetricDataResult>,
}

// ---------------------------------------------------------------------------
// ListMetrics / raw export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DimensionFilterInput {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListMetricsInput {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<DimensionFilterInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricView {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<WireDimension>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListMetricsOutput {
    pub metrics: Vec<MetricView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDimension {
    pub n: String,
    pub v: String,
}

/// One stored datapoint in the compact raw-export shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawMetric {
    pub ns: String,
    pub n: String,
    pub d: Vec<RawDimension>,
    pub account: String,
    pub region: String,
    pub t: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<StatisticSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawMetrics {
    pub metrics: Vec<RawMetric>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl MonitoringService {
    /// Store a batch of datums. Every datum, including its unit against the
    /// series it lands in, is checked before anything is stored; returns the
    /// number of datapoints written.
    pub async fn put_metric_data(
        &self,
        context: &RequestContext,
        input: PutMetricDataInput,
    ) -> Result<usize, CoreError> {
        if input.metric_data.is_empty() {
            return Err(CoreError::validation("The parameter MetricData is required."));
        }
        if input.metric_data.len() > MAX_METRIC_DATA {
            return Err(CoreError::validation(format!(
                "The collection MetricData must not have more than {MAX_METRIC_DATA} items."
            )));
        }

        let now = Utc::now();
        let mut batches: BTreeMap<MetricIdentity, Vec<Datapoint>> = BTreeMap::new();
        for datum in input.metric_data {
            let MetricDatum {
                metric_name,
                dimensions,
                unit,
                timestamp,
                value,
                statistic_values,
            } = datum;

            let identity = MetricIdentity::new(
                context.clone(),
                &input.namespace,
                metric_name,
                dimensions.into_iter().map(Into::into).collect(),
            )?;
            let timestamp = timestamp.unwrap_or(now);
            let mut datapoint = match (value, statistic_values) {
                (Some(v), None) => Datapoint::single(timestamp, v),
                (None, Some(s)) => Datapoint::statistic_set(
                    timestamp,
                    StatisticSet {
                        sample_count: s.sample_count,
                        sum: s.sum,
                        minimum: s.minimum,
                        maximum: s.maximum,
                    },
                ),
                (Some(_), Some(_)) => {
                    return Err(CoreError::validation(
                        "The parameters Value and StatisticValues are mutually exclusive.",
                    ))
                }
                (None, None) => {
                    return Err(CoreError::validation(
                        "One of Value or StatisticValues must be specified.",
                    ))
                }
            };
            if let Some(unit) = parse_unit(unit.as_deref())? {
                datapoint = datapoint.with_unit(unit);
            }
            datapoint.validate()?;
            batches.entry(identity).or_default().push(datapoint);
        }

        let stored = self.store.put_batches(batches)?;

        tracing::debug!(
            account = %context.account_id,
            region = %context.region,
            namespace = %input.namespace,
            count = stored,
            "Metric data stored"
        );
        Ok(stored)
    }

    /// Run every query over `[start_time, end_time)`. A query that cannot
    /// be answered gets an `InternalError` status of its own instead of
    /// failing the call.
    pub async fn get_metric_data(
        &self,
        context: &RequestContext,
        input: GetMetricDataInput,
    ) -> Result<GetMetricDataOutput, CoreError> {
        validate_queries(&input)?;

        let GetMetricDataInput {
            metric_data_queries,
            start_time,
            end_time,
            scan_by,
            max_datapoints,
        } = input;
        let mut budget = max_datapoints.unwrap_or(usize::MAX);
        let mut results = Vec::with_capacity(metric_data_queries.len());

        for query in metric_data_queries {
            if query.return_data == Some(false) {
                continue;
            }
            let mut result = self.run_query(context, query, start_time, end_time);
            if scan_by == ScanBy::TimestampDescending {
                result.timestamps.reverse();
                result.values.reverse();
            }
            if result.values.len() > budget {
                result.timestamps.truncate(budget);
                result.values.truncate(budget);
                result.status_code = ResultStatus::PartialData;
            }
            budget -= result.values.len();
            results.push(result);
        }

        Ok(GetMetricDataOutput {
            metric_data_results: results,
        })
    }

    fn run_query(
        &self,
        context: &RequestContext,
        query: MetricDataQuery,
        start: Timestamp,
        end: Timestamp,
    ) -> MetricDataResult {
        let Some(stat) = query.metric_stat else {
            let label = query.label.unwrap_or_else(|| query.id.clone());
            let message = match query.expression {
                Some(expr) => format!("Metric math expressions are not supported: {expr}"),
                None => "One of MetricStat or Expression must be specified.".to_string(),
            };
            return MetricDataResult::failed(query.id, label, message);
        };
        let label = query
            .label
            .unwrap_or_else(|| stat.metric.metric_name.clone());

        let statistic = match stat.stat.parse::<Statistic>() {
            Ok(statistic) => statistic,
            Err(_) => {
                let message = format!("The value {} for parameter Stat is not supported.", stat.stat);
                return MetricDataResult::failed(query.id, label, message);
            }
        };

        let answer = parse_unit(stat.unit.as_deref()).and_then(|unit| {
            let identity = MetricIdentity::new(
                context.clone(),
                stat.metric.namespace,
                stat.metric.metric_name,
                stat.metric.dimensions.into_iter().map(Into::into).collect(),
            )?;
            let statistic_query = StatisticQuery::new(
                identity,
                start,
                end,
                stat.period,
                statistic,
            )
            .with_unit(unit);
            self.store.query(&statistic_query)
        });

        match answer {
            Ok(buckets) => MetricDataResult {
                id: query.id,
                label,
                timestamps: buckets.iter().map(|b| b.timestamp).collect(),
                values: buckets.iter().map(|b| b.value).collect(),
                status_code: ResultStatus::Complete,
                messages: Vec::new(),
            },
            Err(e) => MetricDataResult::failed(query.id, label, e.to_string()),
        }
    }

    /// Distinct metrics with stored datapoints, filtered by namespace, name
    /// and dimensions.
    pub async fn list_metrics(
        &self,
        context: &RequestContext,
        input: ListMetricsInput,
    ) -> Result<ListMetricsOutput, CoreError> {
        let filter = MetricFilter {
            context: context.clone(),
            namespace: input.namespace,
            metric_name: input.metric_name,
            dimensions: input
                .dimensions
                .into_iter()
                .map(|d| DimensionFilter {
                    name: d.name,
                    value: d.value,
                })
                .collect(),
        };

        let metrics = self
            .store
            .list_metrics(&filter)
            .into_iter()
            .map(|summary| MetricView {
                namespace: summary.identity.namespace.clone(),
                metric_name: summary.identity.metric_name.clone(),
                dimensions: summary.identity.dimensions().iter().map(Into::into).collect(),
            })
            .collect();
        Ok(ListMetricsOutput { metrics })
    }

    /// Every stored datapoint of every account and region.
    pub async fn raw_metrics(&self) -> RawMetrics {
        let mut metrics = Vec::new();
        for series in self.store.export() {
            let identity = &series.identity;
            let dims: Vec<RawDimension> = identity
                .dimensions()
                .iter()
                .map(|d| RawDimension {
                    n: d.name.clone(),
                    v: d.value.clone(),
                })
                .collect();
            for dp in series.datapoints {
                let (v, s) = match dp.value {
                    DatapointValue::Single(v) => (Some(v), None),
                    DatapointValue::StatisticSet(set) => (None, Some(set)),
                };
                metrics.push(RawMetric {
                    ns: identity.namespace.clone(),
                    n: identity.metric_name.clone(),
                    d: dims.clone(),
                    account: identity.context.account_id.clone(),
                    region: identity.context.region.clone(),
                    t: dp.timestamp,
                    v,
                    s,
                });
            }
        }
        RawMetrics { metrics }
    }
}

fn validate_queries(input: &GetMetricDataInput) -> Result<(), CoreError> {
    let queries = &input.metric_data_queries;
    if queries.is_empty() {
        return Err(CoreError::validation(
            "The parameter MetricDataQueries is required.",
        ));
    }
    if queries.len() > MAX_METRIC_DATA_QUERIES {
        return Err(CoreError::validation(format!(
            "The collection MetricDataQueries must not have more than \
             {MAX_METRIC_DATA_QUERIES} items."
        )));
    }
    if input.start_time >= input.end_time {
        return Err(CoreError::validation(
            "The parameter StartTime must be less than the parameter EndTime.",
        ));
    }

    let mut seen = HashSet::new();
    for query in queries {
        if !query.id.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(CoreError::validation(format!(
                "The value {} for parameter MetricDataQueries.Id is invalid: it must \
                 start with a lowercase letter.",
                query.id
            )));
        }
        if !seen.insert(query.id.as_str()) {
            return Err(CoreError::validation(format!(
                "The value {} for parameter MetricDataQueries.Id is not unique.",
                query.id
            )));
        }
    }
    Ok(())
}
