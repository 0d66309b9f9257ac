//! Unified error handler
//!
//! Single entry point composing the four tiers in a fixed order:
//!
//! 1. count the failure
//! 2. **L1** retry with backoff (transient and network errors only)
//! 3. **L2** substitute alternatives
//! 4. self-healing (advisory)
//! 5. **L3** degradation check
//! 6. **L4** escalation
//! 7. otherwise record and continue degraded
//!
//! Only L1 and L2 success return early; the degradation and escalation
//! checks always run on the failure path. `repeated_failures` is only
//! decremented on L1/L2 recovery, so the degrade branch ratchets toward
//! escalation.

use crate::alternatives::AlternativeChainRunner;
use crate::degradation::DegradationController;
use crate::error::{FailsafeError, Result};
use crate::escalation::EscalationHandler;
use crate::healing::SelfHealingAdvisor;
use crate::retry::BackoffRetrier;
use crate::services::Services;
use crate::types::{ErrorType, Invocation, OperationOutcome, RecoveryAction};

/// Attempts the handler always uses for L1
pub const L1_MAX_RETRIES: u32 = 3;

/// Composes retry, substitution, degradation and escalation
#[derive(Debug, Clone)]
pub struct UnifiedErrorHandler {
    services: Services,
    retrier: BackoffRetrier,
    alternatives: AlternativeChainRunner,
    healer: SelfHealingAdvisor,
    degradation: DegradationController,
    escalation: EscalationHandler,
}

impl UnifiedErrorHandler {
    /// Handler over the injected services
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            retrier: BackoffRetrier::new(services.clone()),
            alternatives: AlternativeChainRunner::new(services.clone()),
            healer: SelfHealingAdvisor::new(services.clone()),
            degradation: DegradationController::new(services.clone()),
            escalation: EscalationHandler::new(services.clone()),
            services,
        }
    }

    /// Handle a failed `component` of class `error_type`.
    ///
    /// # Errors
    /// - `FailsafeError::Escalated` if the failure needs a human
    /// - `FailsafeError::Unrecovered` if it was recorded and absorbed
    /// - `FailsafeError::Io` if the failure counter cannot be persisted
    pub async fn handle(
        &self,
        error_type: ErrorType,
        component: &Invocation,
        context: &str,
        alternatives: &[Invocation],
    ) -> Result<OperationOutcome> {
        let label = component.label();
        let mut tried = Vec::new();

        let state = self.services.store.update(|s| {
            s.repeated_failures = s.repeated_failures.saturating_add(1);
        })?;
        let repeated = state.repeated_failures;
        tracing::info!(%error_type, component = %label, repeated, "handling failure");

        if error_type.is_retryable() {
            let policy = self
                .services
                .config
                .retry
                .clone()
                .with_max_retries(L1_MAX_RETRIES);
            let outcome = self.retrier.retry(component, &policy).await;
            if outcome.success {
                self.recovered()?;
                tracing::info!(component = %label, "recovered by retry");
                return Ok(outcome);
            }
            tried.push(format!("retried `{label}` {L1_MAX_RETRIES} times with backoff"));
        }

        if !alternatives.is_empty() {
            let outcome = self.alternatives.run_alternatives(alternatives).await;
            if outcome.success {
                self.recovered()?;
                tracing::info!(component = %label, "recovered by alternative");
                return Ok(outcome);
            }
            tried.push(format!("{} alternatives, all failed", alternatives.len()));
        }

        if self.healer.attempt_self_heal(error_type, repeated) {
            tried.push(format!("self-healing for {error_type}"));
        }

        match self.degradation.check_triggers() {
            Ok(Some(transition)) => {
                tracing::warn!(
                    from = transition.from.as_u8(),
                    to = transition.to.as_u8(),
                    "failure raised degradation level"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "degradation check failed"),
        }

        if self.escalation.should_escalate(error_type, repeated) {
            let mut what = format!("{context} (component `{label}`, failure #{repeated})");
            if !tried.is_empty() {
                what.push_str(&format!(". Tried: {}", tried.join("; ")));
            }
            let report = self.escalation.escalate(
                error_type.as_str(),
                what,
                suggestions_for(error_type),
            );
            return Err(FailsafeError::Escalated(Box::new(report)));
        }

        self.services
            .record(error_type, &label, context, RecoveryAction::Degraded);
        Err(FailsafeError::Unrecovered {
            error_type,
            component: label,
        })
    }

    fn recovered(&self) -> Result<()> {
        self.services.store.update(|s| {
            s.repeated_failures = s.repeated_failures.saturating_sub(1);
        })?;
        Ok(())
    }
}

/// Issue-specific next steps for an escalation
fn suggestions_for(error_type: ErrorType) -> Vec<String> {
    let specific = match error_type {
        ErrorType::Security => "Review the operation against security policy before retrying.",
        ErrorType::DataLoss | ErrorType::DataCorruption => {
            "Stop writing to the affected data and restore from a known-good copy."
        }
        ErrorType::AgentRefusal => "Rephrase or split the task, or complete it manually.",
        ErrorType::InfiniteLoop => "Interrupt the looping work and narrow the task scope.",
        ErrorType::Authentication => "Refresh or re-enter the credentials in use.",
        ErrorType::Transient | ErrorType::Network => {
            "Check connectivity and the availability of the remote service."
        }
        ErrorType::RepeatedFailure => "Identify the recurring failure in the error log.",
        ErrorType::HookTimeout
        | ErrorType::HookFailure
        | ErrorType::HookNotFound => "Inspect or disable the failing hook.",
        ErrorType::AgentTimeout | ErrorType::AgentFailure => {
            "Re-run the agent with a smaller task or a longer timeout."
        }
        ErrorType::SkillNotFound => "Rebuild the skill index.",
        ErrorType::ContextOverflow => "Compact or restart the session.",
        ErrorType::RetryExhausted
        | ErrorType::AlternativesExhausted
        | ErrorType::DegradationTriggered
        | ErrorType::UserEscalation
        | ErrorType::Unknown => "Review the failing operation manually.",
    };
    vec![specific.to_string()]
}
