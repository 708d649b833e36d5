//! Start/stop/reset/restore hooks and state snapshots.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use metricwatch_core::error::CoreError;

use super::MonitoringService;
use crate::persistence::{self, StateSnapshot, SNAPSHOT_VERSION};

/// What a save or restore touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistSummary {
    pub path: PathBuf,
    pub alarms: usize,
    pub series: usize,
}

impl MonitoringService {
    /// Load the state file if one is configured and present, then arm a
    /// job for every alarm.
    pub async fn on_start(&self) -> Result<(), CoreError> {
        if let Some(path) = &self.state_file {
            match persistence::read_snapshot(path).await? {
                Some(snapshot) => {
                    let summary = self.apply_snapshot(path, snapshot).await?;
                    tracing::info!(
                        path = %path.display(),
                        alarms = summary.alarms,
                        series = summary.series,
                        "State restored from file"
                    );
                }
                None => {
                    tracing::info!(path = %path.display(), "No state file yet, starting empty");
                }
            }
        }

        let armed = self.scheduler.restart_existing_alarms().await?;
        tracing::info!(alarms = armed, "Monitoring service started");
        Ok(())
    }

    /// Stop every alarm job, then write the state file if one is configured.
    pub async fn on_stop(&self) -> Result<(), CoreError> {
        self.scheduler.shutdown().await;
        if self.state_file.is_some() {
            self.save_state().await?;
        }
        tracing::info!("Monitoring service stopped");
        Ok(())
    }

    /// Cancel every job and drop all alarms and metrics. The scheduler
    /// stays usable.
    pub async fn on_state_reset(&self) -> Result<(), CoreError> {
        let cancelled = self.scheduler.cancel_all().await;
        self.registry.clear().await?;
        self.store.clear();
        tracing::info!(jobs = cancelled, "Monitoring state reset");
        Ok(())
    }

    /// Replace the in-memory state with the state file and re-arm every
    /// alarm.
    pub async fn on_state_restore(&self) -> Result<PersistSummary, CoreError> {
        let path = self.require_state_file()?;
        let snapshot = persistence::read_snapshot(path)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "State file",
                name: path.display().to_string(),
            })?;

        self.scheduler.cancel_all().await;
        let summary = self.apply_snapshot(path, snapshot).await?;
        self.scheduler.restart_existing_alarms().await?;

        tracing::info!(
            path = %path.display(),
            alarms = summary.alarms,
            series = summary.series,
            "State restored"
        );
        Ok(summary)
    }

    /// Write the current state to the state file.
    pub async fn save_state(&self) -> Result<PersistSummary, CoreError> {
        let path = self.require_state_file()?;
        let snapshot = self.snapshot().await?;
        let summary = PersistSummary {
            path: path.to_path_buf(),
            alarms: snapshot.alarms.len(),
            series: snapshot.metrics.len(),
        };
        persistence::write_snapshot(path, &snapshot).await?;

        tracing::info!(
            path = %path.display(),
            alarms = summary.alarms,
            series = summary.series,
            "State saved"
        );
        Ok(summary)
    }

    /// Point-in-time copy of every alarm and series.
    pub async fn snapshot(&self) -> Result<StateSnapshot, CoreError> {
        Ok(StateSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            alarms: self.registry.list_all().await?,
            metrics: self.store.export(),
        })
    }

    async fn apply_snapshot(
        &self,
        path: &Path,
        snapshot: StateSnapshot,
    ) -> Result<PersistSummary, CoreError> {
        let summary = PersistSummary {
            path: path.to_path_buf(),
            alarms: snapshot.alarms.len(),
            series: snapshot.metrics.len(),
        };
        self.registry.restore(snapshot.alarms).await?;
        self.store.import(snapshot.metrics);
        Ok(summary)
    }

    fn require_state_file(&self) -> Result<&Path, CoreError> {
        self.state_file
            .as_deref()
            .ok_or_else(|| CoreError::Unavailable("STATE_FILE is not configured".to_string()))
    }
}
