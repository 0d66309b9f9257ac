//! Append-only error log
//!
//! One line per event:
//! `[timestamp] [error_type] component=<id> recovery=<action> details=<text>`.
//! The log is the authoritative history; it is never rotated or truncated
//! here.

use crate::error::{FailsafeError, Result};
use crate::types::ErrorEvent;
use chrono::SecondsFormat;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Line-oriented error event log
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    /// Log backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the log cannot be opened or written
    pub fn append(&self, event: &ErrorEvent) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| FailsafeError::io(dir, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FailsafeError::io(&self.path, e))?;
        writeln!(file, "{}", format_line(event)).map_err(|e| FailsafeError::io(&self.path, e))
    }

    /// The last `n` lines, oldest first; a missing log is empty
    ///
    /// # Errors
    /// Returns `FailsafeError::Io` if the log exists but cannot be read
    pub fn tail(&self, n: usize) -> Result<Vec<String>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FailsafeError::io(&self.path, e)),
        };
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|l| (*l).to_string()).collect())
    }
}

/// Render an event as a single log line
#[must_use]
pub fn format_line(event: &ErrorEvent) -> String {
    format!(
        "[{}] [{}] component={} recovery={} details={}",
        event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        event.error_type,
        single_line(&event.component),
        event.recovery_action,
        single_line(&event.details),
    )
}

fn single_line(text: &str) -> String {
    text.trim_end()
        .replace('\\', "\\\\")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorType, RecoveryAction};
    use chrono::TimeZone;

    #[test]
    fn line_format() {
        let mut event = ErrorEvent::new(
            ErrorType::HookTimeout,
            "/hooks/pre-commit",
            "line one\nline two\n",
            RecoveryAction::Bypassed,
        );
        event.timestamp = chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            format_line(&event),
            "[2026-03-01T12:30:00Z] [hook_timeout] component=/hooks/pre-commit \
             recovery=bypassed details=line one\\nline two"
        );
    }

    #[test]
    fn append_then_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("logs").join("errors.log"));
        assert!(log.tail(5).unwrap().is_empty());

        for i in 0..4 {
            let e = ErrorEvent::new(
                ErrorType::Transient,
                format!("op-{i}"),
                "",
                RecoveryAction::Escalate,
            );
            log.append(&e).unwrap();
        }
        let tail = log.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].contains("component=op-2"));
        assert!(tail[1].contains("component=op-3"));
        assert_eq!(log.tail(100).unwrap().len(), 4);
    }
}
