//! Best-effort user alerts
//!
//! Console lines carry a severity marker; desktop notifications are
//! fire-and-forget through the platform notifier. Nothing here can fail
//! the caller.

use crate::types::{Severity, Urgency};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// One user-facing alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Short heading
    pub title: String,
    /// Body text
    pub message: String,
    /// Desktop urgency
    pub urgency: Urgency,
    /// Console marker
    pub severity: Severity,
    /// Optional platform sound name
    pub sound: Option<String>,
}

impl Notification {
    /// Notification with normal urgency and a warning marker
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            urgency: Urgency::Normal,
            severity: Severity::Warning,
            sound: None,
        }
    }

    /// With urgency
    #[must_use]
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// With console severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// With sound hint
    #[must_use]
    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }
}

/// Destination for alerts and console lines. Implementations must not
/// block or panic.
pub trait NotificationSink: Send + Sync {
    /// Deliver an alert (console line plus any desktop delivery)
    fn notify(&self, notification: &Notification);

    /// Print a console line with a severity marker
    fn console(&self, severity: Severity, message: &str);
}

/// Stderr console plus optional desktop notifications
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNotifier {
    desktop: bool,
}

impl SystemNotifier {
    /// Notifier; `desktop` enables platform notifications
    #[must_use]
    pub fn new(desktop: bool) -> Self {
        Self { desktop }
    }

    fn desktop_command(notification: &Notification) -> Option<Command> {
        if cfg!(target_os = "macos") {
            let mut script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(&notification.message),
                escape_applescript(&notification.title),
            );
            if let Some(sound) = &notification.sound {
                script.push_str(&format!(" sound name \"{}\"", escape_applescript(sound)));
            }
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            Some(cmd)
        } else if cfg!(target_os = "linux") {
            let mut cmd = Command::new("notify-send");
            cmd.arg("-u").arg(notification.urgency.as_str());
            if let Some(sound) = &notification.sound {
                cmd.arg("-h").arg(format!("string:sound-name:{sound}"));
            }
            cmd.arg(&notification.title).arg(&notification.message);
            Some(cmd)
        } else {
            None
        }
    }
}

impl NotificationSink for SystemNotifier {
    fn notify(&self, notification: &Notification) {
        self.console(
            notification.severity,
            &format!("{}: {}", notification.title, notification.message),
        );
        if !self.desktop {
            return;
        }
        let Some(mut cmd) = Self::desktop_command(notification) else {
            return;
        };
        if let Err(e) = spawn_reaped(&mut cmd) {
            tracing::debug!(error = %e, "desktop notification unavailable");
        }
    }

    fn console(&self, severity: Severity, message: &str) {
        eprintln!("{} {}", severity.marker(), message);
    }
}

/// Spawn `cmd` detached; a background thread waits on it so no zombie is
/// left behind.
fn spawn_reaped(cmd: &mut Command) -> std::io::Result<thread::JoinHandle<Option<ExitStatus>>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    thread::Builder::new()
        .name("failsafe-notify".into())
        .spawn(move || child.wait().ok())
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
