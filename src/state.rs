//! Persisted runtime state: a snapshot of the heartbeat's counters and task
//! queue, written atomically (temp file + rename) so a crash mid-write never
//! corrupts the on-disk copy.

use crate::task::{Task, TaskSource, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const STATE_FILE_NAME: &str = "state.json";
const BOOTSTRAP_SENTINEL_NAME: &str = ".bootstrapped";
const FIELD_CAP: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub title: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub source: TaskSource,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            status: task.status,
            result: task.result.as_deref().map(|s| cap(s)),
            error: task.error.as_deref().map(|s| cap(s)),
            source: task.source,
        }
    }
}

fn cap(s: &str) -> String {
    if s.len() <= FIELD_CAP {
        s.to_string()
    } else {
        format!("{}...", &s[..FIELD_CAP])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub beat_count: u64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub evolution_count: u64,
    pub improvement_index: u64,
    pub tasks: HashMap<String, TaskSummary>,
}

impl PersistedState {
    pub fn new(start_time: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            beat_count: 0,
            start_time,
            evolution_count: 0,
            improvement_index: 0,
            tasks: HashMap::new(),
        }
    }

    fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(STATE_FILE_NAME)
    }

    /// Best-effort load; a missing or corrupt state file yields a fresh one
    /// rather than a startup failure.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = Self::path(data_dir);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "state file unreadable, starting fresh");
                Self::new(chrono::Utc::now())
            }),
            Err(_) => Self::new(chrono::Utc::now()),
        }
    }

    /// Write-to-temp-then-rename so a crash mid-write never corrupts the
    /// previous snapshot.
    pub fn persist(&self, data_dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let path = Self::path(data_dir);
        let tmp_path = data_dir.join(format!("{STATE_FILE_NAME}.tmp"));
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// True exactly once: the first time the process has ever started against
/// this `data_dir`. Creates the sentinel as a side effect so subsequent
/// calls report `false`.
pub fn claim_first_boot(data_dir: &Path) -> bool {
    let sentinel = data_dir.join(BOOTSTRAP_SENTINEL_NAME);
    if sentinel.exists() {
        return false;
    }
    let _ = std::fs::create_dir_all(data_dir);
    std::fs::write(&sentinel, chrono::Utc::now().to_rfc3339()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = PersistedState::new(chrono::Utc::now());
        state.beat_count = 42;
        state.persist(dir.path()).unwrap();

        let reloaded = PersistedState::load_or_default(dir.path());
        assert_eq!(reloaded.beat_count, 42);
    }

    #[test]
    fn claim_first_boot_is_true_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        assert!(claim_first_boot(dir.path()));
        assert!(!claim_first_boot(dir.path()));
    }

    #[test]
    fn missing_state_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = PersistedState::load_or_default(dir.path());
        assert_eq!(state.beat_count, 0);
    }
}
