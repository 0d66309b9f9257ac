//! Safe executors for hooks and agents
//!
//! Each run follows the same shape: feature gate, bounded execution,
//! outcome classification, counter update, degradation re-evaluation.
//!
//! # Propagation
//!
//! Hook failures are absorbed: the caller always gets a success outcome.
//! Agent failures are surfaced as errors, because callers depend on the
//! agent's output.

use crate::degradation::DegradationController;
use crate::error::{FailsafeError, Result};
use crate::escalation::EscalationHandler;
use crate::healing::SelfHealingAdvisor;
use crate::services::Services;
use crate::types::{
    ErrorType, Feature, Invocation, OperationOutcome, RecoveryAction, Severity,
};
use std::path::Path;
use std::time::Duration;

/// Longest captured output attached to an error event
const MAX_DETAIL_CHARS: usize = 2000;

/// Runs hooks; failures never reach the caller
#[derive(Debug, Clone)]
pub struct HookExecutor {
    services: Services,
    degradation: DegradationController,
    healer: SelfHealingAdvisor,
}

impl HookExecutor {
    /// Executor over the injected services
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            degradation: DegradationController::new(services.clone()),
            healer: SelfHealingAdvisor::new(services.clone()),
            services,
        }
    }

    /// Run the hook at `hook_path`, piping `input` to stdin.
    ///
    /// `timeout` defaults to the (possibly self-healed) hook timeout. The
    /// returned outcome is always successful.
    pub async fn run(
        &self,
        hook_path: &Path,
        input: Option<&str>,
        timeout: Option<Duration>,
    ) -> OperationOutcome {
        let label = hook_path.display().to_string();

        if !self.degradation.is_feature_enabled(Feature::Hooks) {
            tracing::info!(hook = %label, "hooks disabled at current degradation level, skipping");
            return OperationOutcome::bypassed();
        }

        if !is_executable(hook_path) {
            self.services.record(
                ErrorType::HookNotFound,
                &label,
                "hook missing or not executable",
                RecoveryAction::Bypassed,
            );
            return OperationOutcome::bypassed();
        }

        let Some(program) = hook_path.to_str() else {
            self.services.record(
                ErrorType::HookNotFound,
                &label,
                "hook path is not valid UTF-8",
                RecoveryAction::Bypassed,
            );
            return OperationOutcome::bypassed();
        };

        let timeout =
            timeout.unwrap_or_else(|| Duration::from_secs(self.healer.hook_timeout_secs()));
        let mut invocation = Invocation::new(program).with_timeout(timeout);
        if let Some(input) = input {
            invocation = invocation.with_stdin(input);
        }

        let outcome = self.services.runner.run(&invocation).await;
        if outcome.success {
            return outcome;
        }

        let name = hook_path
            .file_name()
            .map_or_else(|| label.clone(), |n| n.to_string_lossy().into_owned());
        let (error_type, details, notice) = if outcome.is_timeout() {
            (
                ErrorType::HookTimeout,
                format!("timed out after {}s", timeout.as_secs()),
                format!("Hook '{name}' timed out after {}s; bypassing", timeout.as_secs()),
            )
        } else {
            let code = outcome.exit_code().unwrap_or(-1);
            (
                ErrorType::HookFailure,
                format!("exit code {code}: {}", clip(&outcome.output)),
                format!("Hook '{name}' failed with exit code {code}; bypassing"),
            )
        };

        if let Err(e) = self
            .services
            .store
            .update(|s| s.hook_failures_session = s.hook_failures_session.saturating_add(1))
        {
            tracing::warn!(error = %e, "could not persist hook failure counter");
        }
        self.services
            .record(error_type, &label, details, RecoveryAction::Bypassed);
        self.services.notifier.console(Severity::Warning, &notice);
        if let Err(e) = self.degradation.check_triggers() {
            tracing::warn!(error = %e, "degradation check failed");
        }

        OperationOutcome::bypassed()
    }
}

/// Runs agents; failures are surfaced
#[derive(Debug, Clone)]
pub struct AgentExecutor {
    services: Services,
    degradation: DegradationController,
    escalation: EscalationHandler,
}

impl AgentExecutor {
    /// Executor over the injected services
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            degradation: DegradationController::new(services.clone()),
            escalation: EscalationHandler::new(services.clone()),
            services,
        }
    }

    /// Run `agent` with a hard timeout.
    ///
    /// `timeout` overrides the invocation's own timeout, which overrides the
    /// configured agent timeout. With `retry_on_invalid`, a non-zero exit is
    /// re-run once before it is reported; timeouts are never re-run.
    ///
    /// # Errors
    /// - `FailsafeError::Escalated` if agents are disabled (nothing is run)
    /// - `FailsafeError::AgentTimeout` if the agent was killed at the timeout
    /// - `FailsafeError::AgentFailed` if the agent exited non-zero
    pub async fn run(
        &self,
        agent: &Invocation,
        timeout: Option<Duration>,
        retry_on_invalid: bool,
    ) -> Result<OperationOutcome> {
        let label = agent.label();

        if !self.degradation.is_feature_enabled(Feature::Agents) {
            let level = self.degradation.level();
            let report = self.escalation.escalate(
                "Agent Required",
                format!(
                    "Agent `{label}` was requested but agents are disabled at degradation level {level}."
                ),
                vec![
                    "Complete the task with direct responses for now.".to_string(),
                    format!("Inspect recent failures with `{}`.", crate::escalation::DIAGNOSTICS_COMMAND),
                    format!(
                        "Once the instability is resolved, re-enable agents with `{}`.",
                        crate::escalation::RESET_COMMAND
                    ),
                ],
            );
            return Err(FailsafeError::Escalated(Box::new(report)));
        }

        let timeout = timeout
            .or(agent.timeout)
            .unwrap_or_else(|| self.services.config.agent_timeout());
        let invocation = agent.clone().with_timeout(timeout);

        let mut outcome = self.services.runner.run(&invocation).await;
        if retry_on_invalid && !outcome.success && !outcome.is_timeout() {
            tracing::info!(agent = %label, "agent output invalid, re-running once");
            outcome = self.services.runner.run(&invocation).await;
        }

        if outcome.success {
            return Ok(outcome);
        }

        if outcome.is_timeout() {
            self.services.store.update(|s| {
                s.agent_timeouts_session = s.agent_timeouts_session.saturating_add(1);
            })?;
            self.services.record(
                ErrorType::AgentTimeout,
                &label,
                format!("killed after {}s", timeout.as_secs()),
                RecoveryAction::Killed,
            );
            if let Err(e) = self.degradation.check_triggers() {
                tracing::warn!(error = %e, "degradation check failed");
            }
            return Err(FailsafeError::AgentTimeout {
                label,
                secs: timeout.as_secs(),
            });
        }

        let exit_code = outcome.exit_code().unwrap_or(-1);
        self.services.record(
            ErrorType::AgentFailure,
            &label,
            format!("exit code {exit_code}: {}", clip(&outcome.output)),
            RecoveryAction::Failed,
        );
        Err(FailsafeError::AgentFailed {
            label,
            exit_code,
            output: outcome.output,
        })
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn clip(output: &str) -> String {
    let trimmed = output.trim();
    match trimmed.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
