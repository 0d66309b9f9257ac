//! Backoff retrier
//!
//! Runs an operation up to `max_retries` times. Sleeps grow by
//! `multiplier` after each failure and never exceed `max_backoff`.
//! Whether an error class deserves retries at all is the caller's call.

use crate::config::RetryPolicy;
use crate::services::Services;
use crate::types::{ErrorType, Invocation, OperationOutcome, RecoveryAction};
use std::time::Duration;

/// Sleep durations between attempts, starting at `initial_backoff`
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl BackoffSchedule {
    /// Schedule for `policy`
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            next: policy.initial_backoff,
            max: policy.max_backoff,
            multiplier: policy.multiplier,
        }
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next.min(self.max);
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));
        Some(current)
    }
}

/// Executes operations with exponential backoff
#[derive(Debug, Clone)]
pub struct BackoffRetrier {
    services: Services,
}

impl BackoffRetrier {
    /// Retrier over the injected runner and sleeper
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Attempt `operation` until it succeeds or the policy is spent.
    ///
    /// At least one attempt is always made. Returns the success outcome, or
    /// the last failure after recording `retry_exhausted`.
    pub async fn retry(&self, operation: &Invocation, policy: &RetryPolicy) -> OperationOutcome {
        let attempts = policy.max_retries.max(1);
        let label = operation.label();
        let mut schedule = BackoffSchedule::new(policy);

        let mut attempt = 1;
        loop {
            tracing::info!(component = %label, attempt, of = attempts, "attempting operation");
            let outcome = self.services.runner.run(operation).await;
            if outcome.success {
                return outcome;
            }
            if attempt >= attempts {
                self.services.record(
                    ErrorType::RetryExhausted,
                    label,
                    format!("{attempts} attempts failed; last output: {}", outcome.output.trim()),
                    RecoveryAction::Escalate,
                );
                return outcome;
            }
            let delay = schedule.next().unwrap_or(policy.max_backoff);
            tracing::warn!(
                component = %label,
                attempt,
                backoff_secs = delay.as_secs_f64(),
                "attempt failed, retrying"
            );
            self.services.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let secs: Vec<u64> = BackoffSchedule::new(&policy)
            .take(7)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn schedule_caps_large_initial() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_secs(90), Duration::from_secs(30));
        assert!(BackoffSchedule::new(&policy)
            .take(3)
            .all(|d| d == Duration::from_secs(30)));
    }

    #[test]
    fn schedule_with_fractional_multiplier() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_secs(4), Duration::from_secs(30))
            .with_multiplier(1.5);
        let secs: Vec<u64> = BackoffSchedule::new(&policy)
            .take(3)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(secs, vec![4, 6, 9]);
    }
}
