//! Operation facade consumed by the HTTP handlers.
//!
//! [`MonitoringService`] wires the metric store, the alarm registry and the
//! alarm scheduler together and implements the monitoring operations on top
//! of them. Every operation takes an explicit [`RequestContext`]; nothing in
//! here keeps a notion of a current account or region.
//!
//! - [`metrics`] -- PutMetricData, GetMetricData, ListMetrics, raw export.
//! - [`alarms`] -- PutMetricAlarm, DescribeAlarms, DeleteAlarms,
//!   SetAlarmState, Enable/DisableAlarmActions.
//! - [`lifecycle`] -- start/stop/reset/restore hooks and state snapshots.

pub mod alarms;
pub mod lifecycle;
pub mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use metricwatch_alarms::{AlarmRegistry, AlarmScheduler, InMemoryAlarmRegistry, StoredAlarm};
use metricwatch_core::error::CoreError;
use metricwatch_core::metric::{Dimension, StandardUnit};
use metricwatch_core::types::RequestContext;
use metricwatch_events::{ActionDispatcher, EventBus};
use metricwatch_store::{MetricStore, StoreSource};

use crate::config::ServerConfig;

/// Dimension as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireDimension {
    pub name: String,
    pub value: String,
}

impl From<WireDimension> for Dimension {
    fn from(d: WireDimension) -> Self {
        Dimension::new(d.name, d.value)
    }
}

impl From<&Dimension> for WireDimension {
    fn from(d: &Dimension) -> Self {
        Self {
            name: d.name.clone(),
            value: d.value.clone(),
        }
    }
}

/// Body of the operations that only take a list of alarm names.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlarmNamesInput {
    pub alarm_names: Vec<String>,
}

pub struct MonitoringService {
    store: Arc<MetricStore>,
    registry: Arc<dyn AlarmRegistry>,
    scheduler: AlarmScheduler,
    bus: Arc<EventBus>,
    state_file: Option<PathBuf>,
}

impl MonitoringService {
    /// Build the store, an in-memory registry, the event bus and the
    /// scheduler. No job is armed until [`MonitoringService::on_start`].
    pub fn new(config: &ServerConfig) -> Self {
        let store = Arc::new(MetricStore::new());
        let registry: Arc<dyn AlarmRegistry> = Arc::new(InMemoryAlarmRegistry::new());
        let bus = Arc::new(EventBus::default());
        let scheduler = AlarmScheduler::new(
            Arc::clone(&registry),
            Arc::new(StoreSource::new(Arc::clone(&store))),
            Arc::new(ActionDispatcher::new(Arc::clone(&bus))),
            Arc::clone(&bus),
            config.scheduler_config(),
        );

        Self {
            store,
            registry,
            scheduler,
            bus,
            state_file: config.state_file.clone(),
        }
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &AlarmScheduler {
        &self.scheduler
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Look an alarm up by name, failing with `NotFound`.
    async fn resolve_alarm(
        &self,
        context: &RequestContext,
        name: &str,
    ) -> Result<StoredAlarm, CoreError> {
        self.registry
            .find_by_name(context, name)
            .await?
            .ok_or_else(|| CoreError::alarm_not_found(name))
    }
}

fn parse_unit(unit: Option<&str>) -> Result<Option<StandardUnit>, CoreError> {
    unit.map(str::parse::<StandardUnit>).transpose()
}
