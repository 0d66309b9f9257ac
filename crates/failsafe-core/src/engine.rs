//! Engine facade
//!
//! Wires every component over one [`Services`] bundle and exposes the
//! read-only status dump used by `status` and `doctor`.

use crate::alternatives::AlternativeChainRunner;
use crate::config::EngineConfig;
use crate::degradation::DegradationController;
use crate::error::Result;
use crate::escalation::EscalationHandler;
use crate::executor::{AgentExecutor, HookExecutor};
use crate::handler::UnifiedErrorHandler;
use crate::healing::SelfHealingAdvisor;
use crate::retry::BackoffRetrier;
use crate::services::Services;
use crate::store::HealthState;
use serde::Serialize;
use std::fmt;

/// Read-only health snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Persisted health record
    pub state: HealthState,
    /// Feature gates at the current level
    pub features: Vec<FeatureStatus>,
    /// Hook timeout currently in effect
    pub hook_timeout_secs: u64,
    /// Error log location
    pub error_log: String,
    /// Newest error log lines, oldest first
    pub recent_errors: Vec<String>,
}

/// One row of the feature table
#[derive(Debug, Clone, Serialize)]
pub struct FeatureStatus {
    /// Feature name
    pub feature: String,
    /// Whether it may run
    pub enabled: bool,
}

impl StatusReport {
    /// Exit code for diagnostics: 0 nominal, otherwise the level
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.state.degradation_level.as_u8())
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.state;
        writeln!(f, "Degradation level:  {}", s.degradation_level)?;
        writeln!(f, "Hook failures:      {}", s.hook_failures_session)?;
        writeln!(f, "Agent timeouts:     {}", s.agent_timeouts_session)?;
        writeln!(f, "Repeated failures:  {}", s.repeated_failures)?;
        match s.last_degradation_at {
            Some(at) => writeln!(f, "Last degradation:   {}", at.to_rfc3339())?,
            None => writeln!(f, "Last degradation:   never")?,
        }
        writeln!(f, "Hook timeout:       {}s", self.hook_timeout_secs)?;
        writeln!(f)?;
        writeln!(f, "Features:")?;
        for row in &self.features {
            let mark = if row.enabled { "on " } else { "off" };
            writeln!(f, "  [{mark}] {}", row.feature)?;
        }
        writeln!(f)?;
        writeln!(f, "Recent errors ({}):", self.error_log)?;
        if self.recent_errors.is_empty() {
            writeln!(f, "  none")?;
        }
        for line in &self.recent_errors {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

/// All components over one set of services
#[derive(Debug, Clone)]
pub struct Engine {
    services: Services,
    degradation: DegradationController,
    escalation: EscalationHandler,
    retrier: BackoffRetrier,
    alternatives: AlternativeChainRunner,
    healer: SelfHealingAdvisor,
    hooks: HookExecutor,
    agents: AgentExecutor,
    handler: UnifiedErrorHandler,
}

impl Engine {
    /// Engine with production services for `config`
    #[must_use]
    pub fn from_config(config: EngineConfig) -> Self {
        Self::new(Services::new(config))
    }

    /// Engine over `services`
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            degradation: DegradationController::new(services.clone()),
            escalation: EscalationHandler::new(services.clone()),
            retrier: BackoffRetrier::new(services.clone()),
            alternatives: AlternativeChainRunner::new(services.clone()),
            healer: SelfHealingAdvisor::new(services.clone()),
            hooks: HookExecutor::new(services.clone()),
            agents: AgentExecutor::new(services.clone()),
            handler: UnifiedErrorHandler::new(services.clone()),
            services,
        }
    }

    /// Shared services
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Degradation controller
    #[must_use]
    pub fn degradation(&self) -> &DegradationController {
        &self.degradation
    }

    /// Escalation handler
    #[must_use]
    pub fn escalation(&self) -> &EscalationHandler {
        &self.escalation
    }

    /// Backoff retrier
    #[must_use]
    pub fn retrier(&self) -> &BackoffRetrier {
        &self.retrier
    }

    /// Alternative chain runner
    #[must_use]
    pub fn alternatives(&self) -> &AlternativeChainRunner {
        &self.alternatives
    }

    /// Self-healing advisor
    #[must_use]
    pub fn healer(&self) -> &SelfHealingAdvisor {
        &self.healer
    }

    /// Hook executor
    #[must_use]
    pub fn hooks(&self) -> &HookExecutor {
        &self.hooks
    }

    /// Agent executor
    #[must_use]
    pub fn agents(&self) -> &AgentExecutor {
        &self.agents
    }

    /// Unified error handler
    #[must_use]
    pub fn handler(&self) -> &UnifiedErrorHandler {
        &self.handler
    }

    /// Snapshot of state, gates and the newest `log_lines` log entries
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the error log exists but is unreadable
    pub fn status(&self, log_lines: usize) -> Result<StatusReport> {
        let state = self.services.store.load();
        let features = self
            .degradation
            .feature_table()
            .into_iter()
            .map(|(f, enabled)| FeatureStatus {
                feature: f.to_string(),
                enabled,
            })
            .collect();
        Ok(StatusReport {
            state,
            features,
            hook_timeout_secs: self.healer.hook_timeout_secs(),
            error_log: self.services.errors.path().display().to_string(),
            recent_errors: self.services.errors.tail(log_lines)?,
        })
    }
}
