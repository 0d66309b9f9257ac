//! Core types for failsafe
//!
//! Defines the vocabulary shared by every recovery component:
//! - Error classes and recovery actions
//! - Degradation levels and gated features
//! - External invocations and their outcomes
//! - Console severities and notification urgencies

use crate::error::FailsafeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Classified error kind.
///
/// Every decision point matches on this exhaustively, so adding a class is a
/// compile-time checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Short-lived failure worth retrying
    Transient,
    /// Network failure worth retrying
    Network,
    /// Hook exceeded its timeout
    HookTimeout,
    /// Hook exited non-zero
    HookFailure,
    /// Hook path missing or not executable
    HookNotFound,
    /// Agent exceeded its timeout
    AgentTimeout,
    /// Agent exited non-zero
    AgentFailure,
    /// Backoff retries ran out
    RetryExhausted,
    /// Every substitute operation failed
    AlternativesExhausted,
    /// Degradation level increased
    DegradationTriggered,
    /// Report handed to the user
    UserEscalation,
    /// Same failure keeps recurring
    RepeatedFailure,
    /// Skill lookup failed
    SkillNotFound,
    /// Context window exhausted
    ContextOverflow,
    /// Security policy violation
    Security,
    /// Data was lost
    DataLoss,
    /// Data was corrupted
    DataCorruption,
    /// Agent refused the task
    AgentRefusal,
    /// Work is looping without progress
    InfiniteLoop,
    /// Credentials rejected
    Authentication,
    /// Anything not classified above
    Unknown,
}

impl ErrorType {
    /// All error types, in declaration order
    pub const ALL: [ErrorType; 21] = [
        Self::Transient,
        Self::Network,
        Self::HookTimeout,
        Self::HookFailure,
        Self::HookNotFound,
        Self::AgentTimeout,
        Self::AgentFailure,
        Self::RetryExhausted,
        Self::AlternativesExhausted,
        Self::DegradationTriggered,
        Self::UserEscalation,
        Self::RepeatedFailure,
        Self::SkillNotFound,
        Self::ContextOverflow,
        Self::Security,
        Self::DataLoss,
        Self::DataCorruption,
        Self::AgentRefusal,
        Self::InfiniteLoop,
        Self::Authentication,
        Self::Unknown,
    ];

    /// Wire name used in logs and on the command line
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Network => "network",
            Self::HookTimeout => "hook_timeout",
            Self::HookFailure => "hook_failure",
            Self::HookNotFound => "hook_not_found",
            Self::AgentTimeout => "agent_timeout",
            Self::AgentFailure => "agent_failure",
            Self::RetryExhausted => "retry_exhausted",
            Self::AlternativesExhausted => "alternatives_exhausted",
            Self::DegradationTriggered => "degradation_triggered",
            Self::UserEscalation => "user_escalation",
            Self::RepeatedFailure => "repeated_failure",
            Self::SkillNotFound => "skill_not_found",
            Self::ContextOverflow => "context_overflow",
            Self::Security => "security",
            Self::DataLoss => "data_loss",
            Self::DataCorruption => "data_corruption",
            Self::AgentRefusal => "agent_refusal",
            Self::InfiniteLoop => "infinite_loop",
            Self::Authentication => "authentication",
            Self::Unknown => "unknown",
        }
    }

    /// Worth a backoff retry before anything else is tried
    #[inline]
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Network)
    }

    /// Must reach a human regardless of counters
    #[inline]
    #[must_use]
    pub fn always_escalates(self) -> bool {
        matches!(
            self,
            Self::Security
                | Self::DataLoss
                | Self::DataCorruption
                | Self::AgentRefusal
                | Self::InfiniteLoop
                | Self::Authentication
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorType {
    type Err = FailsafeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| FailsafeError::UnknownErrorType(s.to_string()))
    }
}

/// What the engine did about an error event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Handed to escalation
    Escalate,
    /// Handed to degradation
    Degrade,
    /// Applied without user involvement
    Automatic,
    /// Caller continued without the operation
    Bypassed,
    /// Process killed after timeout
    Killed,
    /// Failure surfaced to the caller
    Failed,
    /// User report emitted
    Escalated,
    /// Recorded, caller continues degraded
    Degraded,
}

impl RecoveryAction {
    /// Wire name used in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Escalate => "escalate",
            Self::Degrade => "degrade",
            Self::Automatic => "automatic",
            Self::Bypassed => "bypassed",
            Self::Killed => "killed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable error record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Classified kind
    pub error_type: ErrorType,
    /// Operation or hook identifier
    pub component: String,
    /// Free-form details (captured output, counters)
    pub details: String,
    /// What the engine did
    pub recovery_action: RecoveryAction,
}

impl ErrorEvent {
    /// Create an event stamped with the current time
    #[must_use]
    pub fn new(
        error_type: ErrorType,
        component: impl Into<String>,
        details: impl Into<String>,
        recovery_action: RecoveryAction,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            error_type,
            component: component.into(),
            details: details.into(),
            recovery_action,
        }
    }
}

/// How much optional functionality is switched off
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "u8", into = "u8")]
pub enum DegradationLevel {
    /// Everything enabled
    #[default]
    Full = 0,
    /// Verification trimmed
    Reduced = 1,
    /// Single-agent mode
    Minimal = 2,
    /// Direct responses only
    Emergency = 3,
}

impl DegradationLevel {
    /// Numeric level 0-3
    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Short human name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Reduced => "reduced",
            Self::Minimal => "minimal",
            Self::Emergency => "emergency",
        }
    }
}

impl From<u8> for DegradationLevel {
    /// Out-of-range values saturate at `Emergency`.
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Full,
            1 => Self::Reduced,
            2 => Self::Minimal,
            _ => Self::Emergency,
        }
    }
}

impl From<DegradationLevel> for u8 {
    fn from(level: DegradationLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_u8(), self.name())
    }
}

/// Capability gated by the degradation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// All hooks
    Hooks,
    /// All agents
    Agents,
    /// Several agents at once
    ParallelAgents,
    /// Skill documents
    Skills,
    /// Hooks not needed for correctness
    NonEssentialHooks,
    /// Full verification passes
    FullVerification,
    /// Any name not listed above
    Other,
}

impl Feature {
    /// Named features, in table order
    pub const KNOWN: [Feature; 6] = [
        Self::Hooks,
        Self::Agents,
        Self::ParallelAgents,
        Self::Skills,
        Self::NonEssentialHooks,
        Self::FullVerification,
    ];

    /// Resolve a feature name; unrecognised names map to [`Feature::Other`]
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hooks" => Self::Hooks,
            "agents" => Self::Agents,
            "parallel_agents" => Self::ParallelAgents,
            "skills" => Self::Skills,
            "non_essential_hooks" => Self::NonEssentialHooks,
            "full_verification" => Self::FullVerification,
            _ => Self::Other,
        }
    }

    /// Feature name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hooks => "hooks",
            Self::Agents => "agents",
            Self::ParallelAgents => "parallel_agents",
            Self::Skills => "skills",
            Self::NonEssentialHooks => "non_essential_hooks",
            Self::FullVerification => "full_verification",
            Self::Other => "other",
        }
    }

    /// The feature stays enabled while the level is strictly below this
    #[must_use]
    pub fn disabled_from(self) -> DegradationLevel {
        match self {
            Self::Hooks | Self::Agents => DegradationLevel::Emergency,
            Self::ParallelAgents | Self::Skills => DegradationLevel::Minimal,
            Self::NonEssentialHooks | Self::FullVerification | Self::Other => {
                DegradationLevel::Reduced
            }
        }
    }

    /// Pure gate: derived from the level alone
    #[inline]
    #[must_use]
    pub fn enabled_at(self, level: DegradationLevel) -> bool {
        level < self.disabled_from()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Console severity, rendered as a bracket marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// `[i]`
    Info,
    /// `[!]`
    Warning,
    /// `[!!]`
    Error,
    /// `[!!!]`
    Critical,
}

impl Severity {
    /// Bracket marker printed before console lines
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Info => "[i]",
            Self::Warning => "[!]",
            Self::Error => "[!!]",
            Self::Critical => "[!!!]",
        }
    }

    /// Console severity for a degradation level
    #[must_use]
    pub fn for_level(level: DegradationLevel) -> Self {
        match level {
            DegradationLevel::Full => Self::Info,
            DegradationLevel::Reduced => Self::Warning,
            DegradationLevel::Minimal => Self::Error,
            DegradationLevel::Emergency => Self::Critical,
        }
    }
}

/// Desktop notification urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Informational
    Low,
    /// Default
    Normal,
    /// Needs attention now
    Critical,
}

impl Urgency {
    /// Name understood by desktop notifiers
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Critical => "critical",
        }
    }
}

/// How an external invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Process exited with this code
    Exited(i32),
    /// Wall-clock timeout elapsed; process was killed
    TimedOut,
}

/// Result of one executed operation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Whether the caller may proceed as if the operation worked
    pub success: bool,
    /// Combined stdout and stderr
    pub output: String,
    /// Exit code or timeout
    pub completion: Completion,
}

impl OperationOutcome {
    /// Outcome for a process that exited with `code`
    #[must_use]
    pub fn exited(code: i32, output: impl Into<String>) -> Self {
        Self {
            success: code == 0,
            output: output.into(),
            completion: Completion::Exited(code),
        }
    }

    /// Successful exit with output
    #[must_use]
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self::exited(0, output)
    }

    /// Timeout outcome
    #[must_use]
    pub fn timed_out(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            completion: Completion::TimedOut,
        }
    }

    /// Success with empty output, used when a failure is absorbed
    #[must_use]
    pub fn bypassed() -> Self {
        Self::succeeded(String::new())
    }

    /// Whether the operation hit its timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.completion == Completion::TimedOut
    }

    /// Exit code, if the process exited on its own
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self.completion {
            Completion::Exited(code) => Some(code),
            Completion::TimedOut => None,
        }
    }
}

/// An external command: argv plus optional stdin and timeout.
///
/// Commands are never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable path or name
    pub program: String,
    /// Arguments after the program
    pub args: Vec<String>,
    /// Text written to stdin
    pub stdin: Option<String>,
    /// Hard wall-clock bound
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Invocation of `program` with no arguments
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    /// Build from an argv list; the first element is the program
    ///
    /// # Errors
    /// Returns `FailsafeError::EmptyCommand` for an empty list
    pub fn from_argv<I, S>(argv: I) -> Result<Self, FailsafeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = argv.into_iter().map(Into::into);
        let program = parts.next().ok_or(FailsafeError::EmptyCommand)?;
        Ok(Self::new(program).args(parts))
    }

    /// Split a command line on whitespace. No quoting, no expansion.
    ///
    /// # Errors
    /// Returns `FailsafeError::EmptyCommand` for a blank line
    pub fn parse_words(line: &str) -> Result<Self, FailsafeError> {
        Self::from_argv(line.split_whitespace())
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// With stdin input
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// With timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// With `timeout` unless one is already set
    #[must_use]
    pub fn or_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.get_or_insert(timeout);
        self
    }

    /// Identifier used in logs and error events
    #[must_use]
    pub fn label(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_timeout_keeps_an_explicit_bound() {
        let short = Duration::from_secs(5);
        let default = Duration::from_secs(300);
        assert_eq!(Invocation::new("a").or_timeout(default).timeout, Some(default));
        let explicit = Invocation::new("a").with_timeout(short).or_timeout(default);
        assert_eq!(explicit.timeout, Some(short));
    }

    #[test]
    fn error_type_names_round_trip() {
        for t in ErrorType::ALL {
            assert_eq!(t.as_str().parse::<ErrorType>().unwrap(), t);
        }
        assert_eq!("Data-Loss".parse::<ErrorType>().unwrap(), ErrorType::DataLoss);
        assert!("meltdown".parse::<ErrorType>().is_err());
    }

    #[test]
    fn error_type_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorType::AlternativesExhausted).unwrap();
        assert_eq!(json, "\"alternatives_exhausted\"");
    }

    #[test]
    fn level_saturates_on_out_of_range() {
        assert_eq!(DegradationLevel::from(9), DegradationLevel::Emergency);
        let level: DegradationLevel = serde_json::from_str("2").unwrap();
        assert_eq!(level, DegradationLevel::Minimal);
        assert_eq!(serde_json::to_string(&DegradationLevel::Reduced).unwrap(), "1");
    }

    #[test]
    fn feature_table() {
        use DegradationLevel::*;
        let table = [
            (Feature::Hooks, [true, true, true, false]),
            (Feature::Agents, [true, true, true, false]),
            (Feature::ParallelAgents, [true, true, false, false]),
            (Feature::Skills, [true, true, false, false]),
            (Feature::NonEssentialHooks, [true, false, false, false]),
            (Feature::FullVerification, [true, false, false, false]),
            (Feature::Other, [true, false, false, false]),
        ];
        for (feature, expected) in table {
            for (level, want) in [Full, Reduced, Minimal, Emergency].into_iter().zip(expected) {
                assert_eq!(feature.enabled_at(level), want, "{feature} at {level}");
            }
        }
        assert_eq!(Feature::from_name("telepathy"), Feature::Other);
        assert_eq!(Feature::from_name("parallel-agents"), Feature::ParallelAgents);
    }

    #[test]
    fn invocation_from_words() {
        let inv = Invocation::parse_words("  curl -s  https://example.com ").unwrap();
        assert_eq!(inv.program, "curl");
        assert_eq!(inv.args, vec!["-s", "https://example.com"]);
        assert_eq!(inv.label(), "curl -s https://example.com");
        assert!(Invocation::parse_words("   ").is_err());
    }

    #[test]
    fn outcome_classification() {
        assert!(OperationOutcome::exited(0, "ok").success);
        let failed = OperationOutcome::exited(2, "boom");
        assert!(!failed.success);
        assert_eq!(failed.exit_code(), Some(2));
        let timeout = OperationOutcome::timed_out("");
        assert!(timeout.is_timeout());
        assert_eq!(timeout.exit_code(), None);
    }
}
