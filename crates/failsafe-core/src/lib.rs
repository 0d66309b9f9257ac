//! failsafe Core - error recovery and graceful degradation
//!
//! Supervises fallible external operations (hooks, agents) for an
//! assistant session and decides what happens after a failure:
//! - **Retry** transient failures with capped exponential backoff
//! - **Substitute** ordered alternative operations
//! - **Degrade** through levels 0-3, disabling optional features
//! - **Escalate** to the user with a structured report
//!
//! # Example
//!
//! ```rust,ignore
//! use failsafe_core::{Engine, EngineConfig, ErrorType, Invocation};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::from_config(EngineConfig::resolve(None)?);
//!
//! // Hooks never fail the caller
//! let hook = engine.hooks().run("/path/to/hook".as_ref(), None, None).await;
//! assert!(hook.success);
//!
//! // Failures go through retry -> alternatives -> degrade -> escalate
//! let fetch = Invocation::parse_words("curl -sf https://example.com")?;
//! engine.handler().handle(ErrorType::Network, &fetch, "fetch docs", &[]).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod alternatives;
pub mod config;
pub mod degradation;
pub mod engine;
pub mod error;
pub mod error_log;
pub mod escalation;
pub mod executor;
pub mod handler;
pub mod healing;
pub mod notify;
pub mod retry;
pub mod runner;
pub mod services;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use alternatives::AlternativeChainRunner;
pub use config::{DegradationThresholds, EngineConfig, RetryPolicy};
pub use degradation::{DegradationController, Transition};
pub use engine::{Engine, FeatureStatus, StatusReport};
pub use error::{FailsafeError, Result};
pub use error_log::ErrorLog;
pub use escalation::{EscalationHandler, EscalationReport};
pub use executor::{AgentExecutor, HookExecutor};
pub use handler::UnifiedErrorHandler;
pub use healing::{HealingSignals, MarkerFileSignals, SelfHealingAdvisor};
pub use notify::{Notification, NotificationSink, SystemNotifier};
pub use retry::{BackoffRetrier, BackoffSchedule};
pub use runner::{ProcessRunner, Sleeper, TokioProcessRunner, TokioSleeper};
pub use services::Services;
pub use store::{HealthState, HealthStore, Tuning, TuningStore};
pub use types::{
    Completion, DegradationLevel, ErrorEvent, ErrorType, Feature, Invocation, OperationOutcome,
    RecoveryAction, Severity, Urgency,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with failsafe
    pub use crate::{
        DegradationLevel, Engine, EngineConfig, ErrorType, FailsafeError, Feature, Invocation,
        OperationOutcome, RetryPolicy, Services,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
