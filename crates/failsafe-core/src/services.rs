//! Shared dependencies injected into every component
//!
//! Nothing in the engine reaches for process-wide state: the store, log,
//! notifier, process runner, sleeper and healing signals all arrive through
//! [`Services`].

use crate::config::EngineConfig;
use crate::error_log::ErrorLog;
use crate::healing::{HealingSignals, MarkerFileSignals};
use crate::notify::{NotificationSink, SystemNotifier};
use crate::runner::{ProcessRunner, Sleeper, TokioProcessRunner, TokioSleeper};
use crate::store::{HealthStore, TuningStore};
use crate::types::{ErrorEvent, ErrorType, RecoveryAction};
use std::fmt;
use std::sync::Arc;

/// Dependency bundle handed to each component
#[derive(Clone)]
pub struct Services {
    /// Engine configuration
    pub config: Arc<EngineConfig>,
    /// Health record
    pub store: HealthStore,
    /// Self-healing tuning
    pub tuning: TuningStore,
    /// Error history
    pub errors: ErrorLog,
    /// User alerts
    pub notifier: Arc<dyn NotificationSink>,
    /// External process execution
    pub runner: Arc<dyn ProcessRunner>,
    /// Backoff sleeps
    pub sleeper: Arc<dyn Sleeper>,
    /// Index rebuild and compaction requests
    pub signals: Arc<dyn HealingSignals>,
}

impl Services {
    /// Production services rooted at `config.state_dir`
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let notifier = SystemNotifier::new(config.desktop_notifications);
        let signals = MarkerFileSignals::new(&config.state_dir);
        Self {
            store: HealthStore::new(config.health_path()),
            tuning: TuningStore::new(config.tuning_path()),
            errors: ErrorLog::new(config.error_log_path()),
            notifier: Arc::new(notifier),
            runner: Arc::new(TokioProcessRunner),
            sleeper: Arc::new(TokioSleeper),
            signals: Arc::new(signals),
            config: Arc::new(config),
        }
    }

    /// With a different notifier
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// With a different process runner
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// With a different sleeper
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// With different healing signals
    #[must_use]
    pub fn with_signals(mut self, signals: Arc<dyn HealingSignals>) -> Self {
        self.signals = signals;
        self
    }

    /// Record an error event in the log and mirror it into the health
    /// record. Persistence failures are logged and swallowed.
    pub fn record(
        &self,
        error_type: ErrorType,
        component: impl Into<String>,
        details: impl Into<String>,
        recovery: RecoveryAction,
    ) -> ErrorEvent {
        let event = ErrorEvent::new(error_type, component, details, recovery);
        if let Err(e) = self.errors.append(&event) {
            tracing::warn!(error = %e, "could not append to error log");
        }
        let capacity = self.config.error_mirror_capacity;
        if let Err(e) = self.store.update(|s| s.mirror_error(&event, capacity)) {
            tracing::warn!(error = %e, "could not mirror error event");
        }
        tracing::debug!(
            error_type = %event.error_type,
            component = %event.component,
            recovery = %event.recovery_action,
            "error event recorded"
        );
        event
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
