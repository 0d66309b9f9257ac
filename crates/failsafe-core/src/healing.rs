//! Self-healing advisor
//!
//! Small, best-effort policy adjustments for repeated failure patterns.
//! Never blocks and never raises: a heal that cannot be applied is logged
//! and dropped.

use crate::services::Services;
use crate::store::Tuning;
use crate::types::ErrorType;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Hook-timeout repetitions before the timeout is raised
pub const HOOK_TIMEOUT_HEAL_FREQUENCY: u32 = 3;
/// Seconds added per heal
pub const HOOK_TIMEOUT_STEP_SECS: u64 = 5;
/// Ceiling for a healed hook timeout
pub const HOOK_TIMEOUT_CEILING_SECS: u64 = 30;

/// Requests to external collaborators. Fire-and-forget.
pub trait HealingSignals: Send + Sync {
    /// Ask for the skill index to be rebuilt
    fn request_index_rebuild(&self);

    /// Ask for context compaction
    fn request_compaction(&self);
}

/// Signals by dropping request marker files in the state directory
#[derive(Debug, Clone)]
pub struct MarkerFileSignals {
    dir: PathBuf,
}

impl MarkerFileSignals {
    /// Marker for an index rebuild request
    pub const INDEX_REBUILD: &'static str = "rebuild-skill-index.request";
    /// Marker for a compaction request
    pub const COMPACTION: &'static str = "compact.request";

    /// Signals written into `dir`
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn touch(&self, name: &str) {
        let path = self.dir.join(name);
        let written = std::fs::create_dir_all(&self.dir)
            .and_then(|()| std::fs::write(&path, Utc::now().to_rfc3339()));
        if let Err(e) = written {
            tracing::debug!(path = %path.display(), error = %e, "could not write request marker");
        }
    }
}

impl HealingSignals for MarkerFileSignals {
    fn request_index_rebuild(&self) {
        self.touch(Self::INDEX_REBUILD);
    }

    fn request_compaction(&self) {
        self.touch(Self::COMPACTION);
    }
}

/// Applies self-healing adjustments
#[derive(Debug, Clone)]
pub struct SelfHealingAdvisor {
    services: Services,
}

impl SelfHealingAdvisor {
    /// Advisor over the injected tuning store and signals
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Hook timeout in effect: tuned value, else the configured default
    #[must_use]
    pub fn hook_timeout_secs(&self) -> u64 {
        self.services
            .tuning
            .load()
            .hook_timeout_secs
            .unwrap_or(self.services.config.hook_timeout_secs)
    }

    /// Try to heal `pattern` seen `frequency` times. Returns whether a heal
    /// was applied or signalled.
    pub fn attempt_self_heal(&self, pattern: ErrorType, frequency: u32) -> bool {
        match pattern {
            ErrorType::HookTimeout if frequency >= HOOK_TIMEOUT_HEAL_FREQUENCY => {
                self.raise_hook_timeout()
            }
            ErrorType::SkillNotFound => {
                tracing::info!("requesting skill index rebuild");
                self.services.signals.request_index_rebuild();
                true
            }
            ErrorType::ContextOverflow => {
                tracing::info!("requesting context compaction");
                self.services.signals.request_compaction();
                true
            }
            _ => false,
        }
    }

    fn raise_hook_timeout(&self) -> bool {
        let current = self.hook_timeout_secs();
        let raised = (current + HOOK_TIMEOUT_STEP_SECS).min(HOOK_TIMEOUT_CEILING_SECS);
        if raised <= current {
            return false;
        }
        let mut tuning: Tuning = self.services.tuning.load();
        tuning.hook_timeout_secs = Some(raised);
        match self.services.tuning.save(&tuning) {
            Ok(()) => {
                tracing::info!(from = current, to = raised, "raised default hook timeout");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not persist raised hook timeout");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let signals = MarkerFileSignals::new(dir.path().join("state"));
        signals.request_index_rebuild();
        signals.request_compaction();
        assert!(dir.path().join("state").join(MarkerFileSignals::INDEX_REBUILD).exists());
        assert!(dir.path().join("state").join(MarkerFileSignals::COMPACTION).exists());
    }
}
