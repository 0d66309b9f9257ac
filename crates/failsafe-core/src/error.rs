//! Error types for failsafe
//!
//! Provides error handling for:
//! - State and log persistence
//! - Configuration loading
//! - Surfaced agent failures
//! - Escalation to the user

use crate::escalation::EscalationReport;
use crate::types::ErrorType;
use std::path::PathBuf;

/// Result alias used across the crate
pub type Result<T, E = FailsafeError> = std::result::Result<T, E>;

/// Main failsafe error type
#[derive(Debug, thiserror::Error)]
pub enum FailsafeError {
    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State could not be serialized
    #[error("json error for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file is malformed
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Agent exceeded its timeout and was killed
    #[error("agent `{label}` timed out after {secs}s")]
    AgentTimeout { label: String, secs: u64 },

    /// Agent exited non-zero
    #[error("agent `{label}` failed with exit code {exit_code}")]
    AgentFailed {
        label: String,
        exit_code: i32,
        output: String,
    },

    /// Automated recovery stopped; a report was handed to the user
    #[error("escalated to user: {}", .0.issue)]
    Escalated(Box<EscalationReport>),

    /// Failure recorded and absorbed into degradation, not recovered
    #[error("{error_type} in `{component}` was not recovered")]
    Unrecovered {
        error_type: ErrorType,
        component: String,
    },

    /// Unrecognised error type name
    #[error("unknown error type: '{0}'")]
    UnknownErrorType(String),

    /// Command with no program
    #[error("empty command")]
    EmptyCommand,
}

impl FailsafeError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if error requires human intervention
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::Escalated(_))
    }

    /// Check if the failed operation may be attempted again
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AgentTimeout { .. } | Self::AgentFailed { .. })
    }

    /// Escalation report, if this error carries one
    #[must_use]
    pub fn report(&self) -> Option<&EscalationReport> {
        match self {
            Self::Escalated(report) => Some(report),
            _ => None,
        }
    }
}
