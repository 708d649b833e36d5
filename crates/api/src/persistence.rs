//! JSON state snapshots on disk.
//!
//! A snapshot holds every alarm (definition and runtime state) and every
//! metric series. Writes go to a sibling temp file that is renamed over the
//! target, so a crash mid-write never leaves a truncated snapshot behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use metricwatch_alarms::StoredAlarm;
use metricwatch_core::error::CoreError;
use metricwatch_core::types::Timestamp;
use metricwatch_store::SeriesSnapshot;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub saved_at: Timestamp,
    #[serde(default)]
    pub alarms: Vec<StoredAlarm>,
    #[serde(default)]
    pub metrics: Vec<SeriesSnapshot>,
}

pub async fn write_snapshot(path: &Path, snapshot: &StateSnapshot) -> Result<(), CoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| CoreError::Internal(format!("Failed to encode state snapshot: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            CoreError::Internal(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| CoreError::Internal(format!("Failed to write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CoreError::Internal(format!("Failed to replace {}: {e}", path.display())))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "State snapshot written");
    Ok(())
}

/// Read a snapshot. A missing file is `Ok(None)`.
pub async fn read_snapshot(path: &Path) -> Result<Option<StateSnapshot>, CoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CoreError::Internal(format!(
                "Failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let snapshot: StateSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
        CoreError::Internal(format!("Failed to decode {}: {e}", path.display()))
    })?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CoreError::validation(format!(
            "Unsupported state snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    Ok(Some(snapshot))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn empty_snapshot() -> StateSnapshot {
        StateSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            alarms: Vec::new(),
            metrics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let read = read_snapshot(&dir.path().join("absent.json")).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn writes_into_nested_directory_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let snapshot = empty_snapshot();

        write_snapshot(&path, &snapshot).await.unwrap();

        assert_eq!(read_snapshot(&path).await.unwrap(), Some(snapshot));
        assert!(!path.with_file_name("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut snapshot = empty_snapshot();
        snapshot.version = 99;
        write_snapshot(&path, &snapshot).await.unwrap();

        assert_matches!(read_snapshot(&path).await, Err(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn garbage_is_an_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert_matches!(read_snapshot(&path).await, Err(CoreError::Internal(_)));
    }
}
