//! Alarm registry: durable home of alarm definitions and runtime state.
//!
//! The scheduler re-reads definitions from the registry on every tick and
//! writes the runtime state back afterwards, so the registry is the only
//! place either lives. [`InMemoryAlarmRegistry`] is the process-local
//! implementation; its contents can be snapshotted for state persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use metricwatch_core::alarm::{AlarmDefinition, AlarmRuntimeState};
use metricwatch_core::error::CoreError;
use metricwatch_core::types::RequestContext;

/// One alarm as persisted: its definition and its evaluation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAlarm {
    pub definition: AlarmDefinition,
    pub runtime: AlarmRuntimeState,
}

impl StoredAlarm {
    /// A freshly created alarm in its initial `INSUFFICIENT_DATA` state.
    pub fn new(definition: AlarmDefinition) -> Self {
        let runtime = AlarmRuntimeState::initial(definition.configuration_updated_at);
        Self {
            definition,
            runtime,
        }
    }
}

/// Storage for alarm definitions and their runtime state.
#[async_trait]
pub trait AlarmRegistry: Send + Sync {
    /// Insert or replace a definition. Replacing keeps the runtime state,
    /// with the outcome buffer trimmed to the new evaluation periods.
    async fn put_alarm(&self, definition: AlarmDefinition) -> Result<StoredAlarm, CoreError>;

    async fn get(&self, arn: &str) -> Result<Option<StoredAlarm>, CoreError>;

    async fn find_by_name(
        &self,
        context: &RequestContext,
        name: &str,
    ) -> Result<Option<StoredAlarm>, CoreError>;

    /// Every alarm of one account/region, sorted by name.
    async fn list(&self, context: &RequestContext) -> Result<Vec<StoredAlarm>, CoreError>;

    /// Every alarm across all accounts and regions.
    async fn list_all(&self) -> Result<Vec<StoredAlarm>, CoreError>;

    /// Persist the runtime state of an existing alarm. Fails with
    /// `NotFound` if the alarm was removed in the meantime.
    async fn save_runtime(&self, arn: &str, runtime: AlarmRuntimeState) -> Result<(), CoreError>;

    /// Set `actions_enabled` on an existing definition in place. Returns
    /// `false` when the flag already had that value.
    async fn set_actions_enabled(&self, arn: &str, enabled: bool) -> Result<bool, CoreError>;

    async fn remove(&self, arn: &str) -> Result<Option<StoredAlarm>, CoreError>;

    async fn clear(&self) -> Result<(), CoreError>;

    /// Replace the whole registry content.
    async fn restore(&self, alarms: Vec<StoredAlarm>) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Registry kept in process memory, keyed by alarm ARN.
#[derive(Debug, Default)]
pub struct InMemoryAlarmRegistry {
    alarms: RwLock<BTreeMap<String, StoredAlarm>>,
}

impl InMemoryAlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlarmRegistry for InMemoryAlarmRegistry {
    async fn put_alarm(&self, definition: AlarmDefinition) -> Result<StoredAlarm, CoreError> {
        let mut alarms = self.alarms.write().await;
        let stored = match alarms.remove(&definition.arn) {
            Some(existing) => {
                let mut runtime = existing.runtime;
                runtime.truncate_to(definition.evaluation_periods as usize);
                StoredAlarm {
                    definition,
                    runtime,
                }
            }
            None => StoredAlarm::new(definition),
        };
        alarms.insert(stored.definition.arn.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, arn: &str) -> Result<Option<StoredAlarm>, CoreError> {
        Ok(self.alarms.read().await.get(arn).cloned())
    }

    async fn find_by_name(
        &self,
        context: &RequestContext,
        name: &str,
    ) -> Result<Option<StoredAlarm>, CoreError> {
        Ok(self
            .alarms
            .read()
            .await
            .values()
            .find(|a| a.definition.name == name && a.definition.context() == context)
            .cloned())
    }

    async fn list(&self, context: &RequestContext) -> Result<Vec<StoredAlarm>, CoreError> {
        let mut alarms: Vec<StoredAlarm> = self
            .alarms
            .read()
            .await
            .values()
            .filter(|a| a.definition.context() == context)
            .cloned()
            .collect();
        alarms.sort_by(|a, b| a.definition.name.cmp(&b.definition.name));
        Ok(alarms)
    }

    async fn list_all(&self) -> Result<Vec<StoredAlarm>, CoreError> {
        Ok(self.alarms.read().await.values().cloned().collect())
    }

    async fn save_runtime(&self, arn: &str, runtime: AlarmRuntimeState) -> Result<(), CoreError> {
        let mut alarms = self.alarms.write().await;
        let stored = alarms
            .get_mut(arn)
            .ok_or_else(|| CoreError::alarm_not_found(arn))?;
        stored.runtime = runtime;
        Ok(())
    }

    async fn set_actions_enabled(&self, arn: &str, enabled: bool) -> Result<bool, CoreError> {
        let mut alarms = self.alarms.write().await;
        let stored = alarms
            .get_mut(arn)
            .ok_or_else(|| CoreError::alarm_not_found(arn))?;
        let changed = stored.definition.actions_enabled != enabled;
        stored.definition.actions_enabled = enabled;
        Ok(changed)
    }

    async fn remove(&self, arn: &str) -> Result<Option<StoredAlarm>, CoreError> {
        Ok(self.alarms.write().await.remove(arn))
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.alarms.write().await.clear();
        Ok(())
    }

    async fn restore(&self, alarms: Vec<StoredAlarm>) -> Result<(), CoreError> {
        let restored: BTreeMap<String, StoredAlarm> = alarms
            .into_iter()
            .map(|a| (a.definition.arn.clone(), a))
            .collect();
        *self.alarms.write().await = restored;
        Ok(())
    }
}
