//! Substitute operations, tried in order until one succeeds

use crate::services::Services;
use crate::types::{ErrorType, Invocation, OperationOutcome, RecoveryAction};

/// Runs an ordered list of substitutes
#[derive(Debug, Clone)]
pub struct AlternativeChainRunner {
    services: Services,
}

impl AlternativeChainRunner {
    /// Runner over the injected process runner
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Run `ops` strictly in order and return the first success.
    ///
    /// Each op carries its own timeout; there is no shared budget and no
    /// backoff. When every op fails, `alternatives_exhausted` is recorded
    /// against the first op and the last failure is returned.
    pub async fn run_alternatives(&self, ops: &[Invocation]) -> OperationOutcome {
        let Some(first) = ops.first() else {
            return OperationOutcome::exited(1, "no alternatives available");
        };

        let mut last = None;
        for (i, op) in ops.iter().enumerate() {
            tracing::info!(component = %op.label(), index = i, "trying alternative");
            let outcome = self.services.runner.run(op).await;
            if outcome.success {
                return outcome;
            }
            tracing::warn!(component = %op.label(), index = i, "alternative failed");
            last = Some(outcome);
        }

        let tried: Vec<String> = ops.iter().map(Invocation::label).collect();
        self.services.record(
            ErrorType::AlternativesExhausted,
            first.label(),
            format!("all {} alternatives failed: {}", ops.len(), tried.join(" | ")),
            RecoveryAction::Degrade,
        );
        last.unwrap_or_else(|| OperationOutcome::exited(1, String::new()))
    }
}
