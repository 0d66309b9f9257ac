//! Persisted health record and self-healing tuning
//!
//! Every mutation is a load → mutate → atomic store cycle. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! record, so readers never observe a partial write. There is no locking:
//! concurrent writers resolve as last-writer-wins.

use crate::error::{FailsafeError, Result};
use crate::types::{DegradationLevel, ErrorEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Session health, one per workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthState {
    /// Current degradation level; only reset lowers it
    pub degradation_level: DegradationLevel,
    /// Hook failures and timeouts this session
    pub hook_failures_session: u32,
    /// Agent timeouts this session
    pub agent_timeouts_session: u32,
    /// Unified-handler calls not yet recovered
    pub repeated_failures: u32,
    /// Time of the last level transition
    pub last_degradation_at: Option<DateTime<Utc>>,
    /// Most recent error events, keyed by timestamp
    pub errors: BTreeMap<String, ErrorEvent>,
}

impl HealthState {
    /// Mirror an event, keeping at most `capacity` of the newest entries
    pub fn mirror_error(&mut self, event: &ErrorEvent, capacity: usize) {
        let base = event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut key = base.clone();
        let mut n = 1;
        while self.errors.contains_key(&key) {
            key = format!("{base}#{n}");
            n += 1;
        }
        self.errors.insert(key, event.clone());
        while self.errors.len() > capacity {
            self.errors.pop_first();
        }
    }

    /// Whether anything has degraded
    #[inline]
    #[must_use]
    pub fn is_nominal(&self) -> bool {
        self.degradation_level == DegradationLevel::Full
    }
}

/// Handle to the persisted [`HealthState`]
#[derive(Debug, Clone)]
pub struct HealthStore {
    path: PathBuf,
}

impl HealthStore {
    /// Store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; missing or corrupt files yield defaults
    #[must_use]
    pub fn load(&self) -> HealthState {
        load_or_default(&self.path)
    }

    /// Atomically replace the record
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the record cannot be written
    pub fn save(&self, state: &HealthState) -> Result<()> {
        write_json_atomically(&self.path, state)
    }

    /// Load, apply `mutate`, store; returns the stored state
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the record cannot be written
    pub fn update<F>(&self, mutate: F) -> Result<HealthState>
    where
        F: FnOnce(&mut HealthState),
    {
        let mut state = self.load();
        mutate(&mut state);
        self.save(&state)?;
        Ok(state)
    }

    /// Replace the record with defaults
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the record cannot be written
    pub fn reset(&self) -> Result<HealthState> {
        let state = HealthState::default();
        self.save(&state)?;
        Ok(state)
    }
}

/// Values adjusted by self-healing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tuning {
    /// Raised hook timeout, if any
    pub hook_timeout_secs: Option<u64>,
}

/// Handle to the persisted [`Tuning`]
#[derive(Debug, Clone)]
pub struct TuningStore {
    path: PathBuf,
}

impl TuningStore {
    /// Store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load tuning; missing or corrupt files yield defaults
    #[must_use]
    pub fn load(&self) -> Tuning {
        load_or_default(&self.path)
    }

    /// Atomically replace tuning
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the file cannot be written
    pub fn save(&self, tuning: &Tuning) -> Result<()> {
        write_json_atomically(&self.path, tuning)
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable state file, using defaults");
            return T::default();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "corrupt state file, reinitializing");
        T::default()
    })
}

/// Serialize `value` and rename it over `path`
pub(crate) fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| FailsafeError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| FailsafeError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| FailsafeError::io(dir, e))?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| FailsafeError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| FailsafeError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorType, RecoveryAction};

    fn event(component: &str) -> ErrorEvent {
        ErrorEvent::new(ErrorType::HookFailure, component, "exit 1", RecoveryAction::Bypassed)
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = HealthStore::new(dir.path().join("health.json"));
        assert_eq!(store.load(), HealthState::default());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(HealthStore::new(&path).load(), HealthState::default());
    }

    #[test]
    fn update_persists_and_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = HealthStore::new(dir.path().join("nested").join("health.json"));
        let state = store
            .update(|s| {
                s.hook_failures_session += 2;
                s.degradation_level = DegradationLevel::Reduced;
            })
            .unwrap();
        assert_eq!(store.load(), state);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"hookFailuresSession\": 2"));
        assert!(raw.contains("\"degradationLevel\": 1"));
        assert!(raw.contains("\"lastDegradationAt\": null"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = HealthStore::new(dir.path().join("health.json"));
        for _ in 0..3 {
            store.update(|s| s.repeated_failures += 1).unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("health.json")]);
        assert_eq!(store.load().repeated_failures, 3);
    }

    #[test]
    fn mirror_is_bounded_and_keys_are_unique() {
        let mut state = HealthState::default();
        let e = event("a");
        state.mirror_error(&e, 3);
        state.mirror_error(&e, 3);
        assert_eq!(state.errors.len(), 2);

        for i in 0..5 {
            state.mirror_error(&event(&format!("later-{i}")), 3);
        }
        assert_eq!(state.errors.len(), 3);
        assert!(state.errors.values().all(|e| e.component.starts_with("later-")));
    }

    #[test]
    fn tuning_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TuningStore::new(dir.path().join("tuning.json"));
        assert_eq!(store.load().hook_timeout_secs, None);
        store
            .save(&Tuning {
                hook_timeout_secs: Some(15),
            })
            .unwrap();
        assert_eq!(store.load().hook_timeout_secs, Some(15));
    }
}
