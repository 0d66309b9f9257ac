//! Engine configuration
//!
//! Resolved from, in order: an explicit state directory, the
//! `FAILSAFE_STATE_DIR` environment variable, then `~/.claude/failsafe`.
//! An optional `failsafe.toml` inside the state directory overrides
//! defaults.

use crate::error::{FailsafeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the state directory
pub const STATE_DIR_ENV: &str = "FAILSAFE_STATE_DIR";
/// Config file name inside the state directory
pub const CONFIG_FILE: &str = "failsafe.toml";

const HEALTH_FILE: &str = "health.json";
const ERROR_LOG_FILE: &str = "errors.log";
const TUNING_FILE: &str = "tuning.json";

/// Backoff retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first (at least one is always made)
    pub max_retries: u32,
    /// First sleep between attempts
    #[serde(rename = "initial_backoff_secs", with = "secs")]
    pub initial_backoff: Duration,
    /// Upper bound on any sleep
    #[serde(rename = "max_backoff_secs", with = "secs")]
    pub max_backoff: Duration,
    /// Growth factor applied after each sleep
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Default policy with a different attempt count
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// With initial and maximum backoff
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// With growth factor
    #[inline]
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Counter thresholds for degradation and escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationThresholds {
    /// `repeated_failures` at which level 3 is entered
    pub emergency_repeated_failures: u32,
    /// Hook failures at which level 2 is entered
    pub minimal_hook_failures: u32,
    /// Agent timeouts at which level 2 is entered
    pub minimal_agent_timeouts: u32,
    /// Hook failures at which level 1 is entered
    pub reduced_hook_failures: u32,
    /// Agent timeouts at which level 1 is entered
    pub reduced_agent_timeouts: u32,
    /// Count at which `repeated_failure` escalates
    pub repeated_failure_escalation: u32,
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            emergency_repeated_failures: 10,
            minimal_hook_failures: 5,
            minimal_agent_timeouts: 4,
            reduced_hook_failures: 3,
            reduced_agent_timeouts: 2,
            repeated_failure_escalation: 5,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding health record, error log and tuning
    pub state_dir: PathBuf,
    /// Hook timeout when neither caller nor tuning supplies one
    pub hook_timeout_secs: u64,
    /// Agent timeout when the caller supplies none
    pub agent_timeout_secs: u64,
    /// Default retry policy
    pub retry: RetryPolicy,
    /// Degradation and escalation thresholds
    pub thresholds: DegradationThresholds,
    /// How many recent error events the health record mirrors
    pub error_mirror_capacity: usize,
    /// Whether to attempt desktop notifications
    pub desktop_notifications: bool,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With state directory
    #[inline]
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// With default hook timeout
    #[inline]
    #[must_use]
    pub fn with_hook_timeout_secs(mut self, secs: u64) -> Self {
        self.hook_timeout_secs = secs;
        self
    }

    /// With desktop notifications on or off
    #[inline]
    #[must_use]
    pub fn with_desktop_notifications(mut self, enabled: bool) -> Self {
        self.desktop_notifications = enabled;
        self
    }

    /// Resolve the state directory and load `failsafe.toml` from it
    ///
    /// # Errors
    /// Returns `FailsafeError::Config` if the file exists but is malformed,
    /// or `FailsafeError::Io` if it cannot be read
    pub fn resolve(state_dir: Option<PathBuf>) -> Result<Self> {
        let dir = state_dir
            .or_else(|| std::env::var_os(STATE_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(default_state_dir);
        let mut config = Self::load_file(&dir.join(CONFIG_FILE))?;
        config.state_dir = dir;
        Ok(config)
    }

    /// Load configuration from a TOML file; a missing file yields defaults
    ///
    /// # Errors
    /// Returns `FailsafeError::Config` on malformed TOML
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(FailsafeError::io(path, e)),
        };
        toml::from_str(&text).map_err(|source| FailsafeError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default hook timeout
    #[inline]
    #[must_use]
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    /// Default agent timeout
    #[inline]
    #[must_use]
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// Persisted health record
    #[must_use]
    pub fn health_path(&self) -> PathBuf {
        self.state_dir.join(HEALTH_FILE)
    }

    /// Append-only error log
    #[must_use]
    pub fn error_log_path(&self) -> PathBuf {
        self.state_dir.join(ERROR_LOG_FILE)
    }

    /// Self-healing adjustments
    #[must_use]
    pub fn tuning_path(&self) -> PathBuf {
        self.state_dir.join(TUNING_FILE)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            hook_timeout_secs: 10,
            agent_timeout_secs: 300,
            retry: RetryPolicy::default(),
            thresholds: DegradationThresholds::default(),
            error_mirror_capacity: 20,
            desktop_notifications: true,
        }
    }
}

/// `~/.claude/failsafe`, or a relative fallback when there is no home
#[must_use]
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".claude")
        .join("failsafe")
}

/// Durations as (fractional) seconds
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_table() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(30));
        assert_eq!(config.thresholds.emergency_repeated_failures, 10);
        assert_eq!(config.thresholds.reduced_agent_timeouts, 2);
        assert!(config.state_dir.ends_with(".claude/failsafe"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::resolve(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.state_dir, dir.path());
        assert_eq!(config.hook_timeout_secs, 10);
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "hook_timeout_secs = 20\n\n[retry]\nmax_retries = 5\ninitial_backoff_secs = 0.5\n",
        )
        .unwrap();
        let config = EngineConfig::resolve(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.hook_timeout_secs, 20);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(30));
        assert_eq!(config.agent_timeout_secs, 300);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "hook_timeout_secs = \"soon\"").unwrap();
        let err = EngineConfig::resolve(Some(dir.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, FailsafeError::Config { .. }));
    }
}
