//! Escalation to the user
//!
//! Policy decides which failures bypass the automated tiers; the handler
//! produces a report that always says what happened, what was tried, the
//! impact, and what to do next.

use crate::config::DegradationThresholds;
use crate::notify::Notification;
use crate::services::Services;
use crate::types::{DegradationLevel, ErrorType, RecoveryAction, Severity, Urgency};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Command that prints the diagnostics dump
pub const DIAGNOSTICS_COMMAND: &str = "failsafe doctor";
/// Command that clears degradation
pub const RESET_COMMAND: &str = "failsafe reset";

/// Whether an error must go to a human now.
///
/// Security-class errors escalate unconditionally; `repeated_failure`
/// escalates from its own threshold; everything else escalates at the
/// emergency threshold.
#[must_use]
pub fn should_escalate(
    error_type: ErrorType,
    failure_count: u32,
    thresholds: &DegradationThresholds,
) -> bool {
    if error_type.always_escalates() {
        return true;
    }
    match error_type {
        ErrorType::RepeatedFailure => failure_count >= thresholds.repeated_failure_escalation,
        _ => failure_count >= thresholds.emergency_repeated_failures,
    }
}

/// Structured "needs human attention" report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationReport {
    /// What happened
    pub issue: String,
    /// What was tried
    pub context: String,
    /// Effect on the session
    pub impact: String,
    /// Itemised next steps specific to the issue
    pub suggestions: Vec<String>,
    /// Diagnostics command
    pub diagnostics_command: String,
    /// Error log location
    pub log_location: String,
    /// Reset command
    pub reset_command: String,
    /// When the report was raised
    pub raised_at: DateTime<Utc>,
}

impl fmt::Display for EscalationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "{} USER ATTENTION REQUIRED", Severity::Critical.marker())?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Issue:   {}", self.issue)?;
        writeln!(f, "Context: {}", self.context)?;
        writeln!(f, "Impact:  {}", self.impact)?;
        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "Suggested actions:")?;
            for (i, s) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {s}", i + 1)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Next steps:")?;
        writeln!(f, "  - Run diagnostics: {}", self.diagnostics_command)?;
        writeln!(f, "  - Review the error log: {}", self.log_location)?;
        writeln!(f, "  - Clear degradation once resolved: {}", self.reset_command)?;
        write!(f, "{rule}")
    }
}

fn impact_for(level: DegradationLevel) -> String {
    match level {
        DegradationLevel::Full => {
            "Automated recovery stopped for this operation; all features remain enabled."
                .to_string()
        }
        DegradationLevel::Reduced => "Automated recovery stopped; running in reduced mode \
             (non-essential hooks and full verification disabled)."
            .to_string(),
        DegradationLevel::Minimal => "Automated recovery stopped; running in minimal mode \
             (single agent, no skills)."
            .to_string(),
        DegradationLevel::Emergency => "Automated recovery stopped; emergency mode is active \
             (hooks and agents disabled, direct responses only)."
            .to_string(),
    }
}

/// Emits escalation reports
#[derive(Debug, Clone)]
pub struct EscalationHandler {
    services: Services,
}

impl EscalationHandler {
    /// Handler over the injected services
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// [`should_escalate`] with the configured thresholds
    #[must_use]
    pub fn should_escalate(&self, error_type: ErrorType, failure_count: u32) -> bool {
        should_escalate(error_type, failure_count, &self.services.config.thresholds)
    }

    /// Record, notify and print the report. Terminal: no retry, no
    /// recursion.
    pub fn escalate(
        &self,
        issue: impl Into<String>,
        context: impl Into<String>,
        suggestions: Vec<String>,
    ) -> EscalationReport {
        let level = self.services.store.load().degradation_level;
        let report = EscalationReport {
            issue: issue.into(),
            context: context.into(),
            impact: impact_for(level),
            suggestions,
            diagnostics_command: DIAGNOSTICS_COMMAND.to_string(),
            log_location: self.services.errors.path().display().to_string(),
            reset_command: RESET_COMMAND.to_string(),
            raised_at: Utc::now(),
        };

        tracing::error!(issue = %report.issue, "escalating to user");
        self.services.record(
            ErrorType::UserEscalation,
            report.issue.clone(),
            report.context.clone(),
            RecoveryAction::Escalated,
        );
        self.services.notifier.notify(
            &Notification::new(format!("Attention: {}", report.issue), report.context.clone())
                .with_urgency(Urgency::Critical)
                .with_severity(Severity::Critical)
                .with_sound("Sosumi"),
        );
        self.services
            .notifier
            .console(Severity::Critical, &report.to_string());
        report
    }
}
