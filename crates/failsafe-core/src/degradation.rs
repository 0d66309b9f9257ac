//! Degradation controller
//!
//! Levels only move up automatically:
//!
//! ```text
//! Full(0) -> Reduced(1) -> Minimal(2) -> Emergency(3)
//! ```
//!
//! The only way down is an explicit [`DegradationController::reset`].

use crate::config::DegradationThresholds;
use crate::error::Result;
use crate::notify::Notification;
use crate::services::Services;
use crate::store::HealthState;
use crate::types::{DegradationLevel, ErrorType, Feature, RecoveryAction, Severity, Urgency};
use chrono::{DateTime, Utc};

/// A level change applied by [`DegradationController::check_triggers`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Level before
    pub from: DegradationLevel,
    /// Level after
    pub to: DegradationLevel,
    /// When it happened
    pub at: DateTime<Utc>,
}

/// Level the counters call for, evaluated most severe first
#[must_use]
pub fn target_level(state: &HealthState, thresholds: &DegradationThresholds) -> DegradationLevel {
    if state.repeated_failures >= thresholds.emergency_repeated_failures {
        DegradationLevel::Emergency
    } else if state.hook_failures_session >= thresholds.minimal_hook_failures
        || state.agent_timeouts_session >= thresholds.minimal_agent_timeouts
    {
        DegradationLevel::Minimal
    } else if state.hook_failures_session >= thresholds.reduced_hook_failures
        || state.agent_timeouts_session >= thresholds.reduced_agent_timeouts
    {
        DegradationLevel::Reduced
    } else {
        DegradationLevel::Full
    }
}

/// Alert text for entering `level`
#[must_use]
pub fn level_notification(level: DegradationLevel) -> Notification {
    let severity = Severity::for_level(level);
    match level {
        DegradationLevel::Full => Notification::new(
            "Full Mode",
            "All features enabled.",
        )
        .with_urgency(Urgency::Low)
        .with_severity(severity),
        DegradationLevel::Reduced => Notification::new(
            "Degraded: Reduced Mode",
            "Reduced verification: non-essential hooks and full verification are disabled.",
        )
        .with_severity(severity),
        DegradationLevel::Minimal => Notification::new(
            "Degraded: Minimal Mode",
            "Minimal mode: single-agent execution only; skills and parallel agents are disabled.",
        )
        .with_severity(severity),
        DegradationLevel::Emergency => Notification::new(
            "Emergency Mode",
            "Emergency mode: hooks and agents are disabled; direct responses only.",
        )
        .with_urgency(Urgency::Critical)
        .with_severity(severity)
        .with_sound("Basso"),
    }
}

/// Owns the degradation level and feature gates
#[derive(Debug, Clone)]
pub struct DegradationController {
    services: Services,
}

impl DegradationController {
    /// Controller over the injected store
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Current level
    #[must_use]
    pub fn level(&self) -> DegradationLevel {
        self.services.store.load().degradation_level
    }

    /// Whether `feature` may run at the current level
    #[must_use]
    pub fn is_feature_enabled(&self, feature: Feature) -> bool {
        feature.enabled_at(self.level())
    }

    /// Gate table at the current level
    #[must_use]
    pub fn feature_table(&self) -> Vec<(Feature, bool)> {
        let level = self.level();
        Feature::KNOWN
            .into_iter()
            .map(|f| (f, f.enabled_at(level)))
            .collect()
    }

    /// Raise the level if the counters call for it; never lowers it.
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the new level cannot be persisted
    pub fn check_triggers(&self) -> Result<Option<Transition>> {
        let mut state = self.services.store.load();
        let target = target_level(&state, &self.services.config.thresholds);
        if target <= state.degradation_level {
            return Ok(None);
        }

        let transition = Transition {
            from: state.degradation_level,
            to: target,
            at: Utc::now(),
        };
        state.degradation_level = target;
        state.last_degradation_at = Some(transition.at);
        self.services.store.save(&state)?;

        tracing::warn!(
            from = transition.from.as_u8(),
            to = transition.to.as_u8(),
            "degradation level raised"
        );
        self.services.record(
            ErrorType::DegradationTriggered,
            "degradation",
            format!(
                "level {} -> {}: hook_failures={} agent_timeouts={} repeated_failures={}",
                transition.from.as_u8(),
                transition.to.as_u8(),
                state.hook_failures_session,
                state.agent_timeouts_session,
                state.repeated_failures,
            ),
            RecoveryAction::Automatic,
        );
        self.services.notifier.notify(&level_notification(target));
        Ok(Some(transition))
    }

    /// Return to full mode with zeroed counters
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the record cannot be written
    pub fn reset(&self) -> Result<HealthState> {
        let state = self.services.store.reset()?;
        tracing::info!("health state reset to defaults");
        Ok(state)
    }
}
