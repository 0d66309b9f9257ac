//! Testing utilities for failsafe workspace
//!
//! Scripted process runner, recording sleeper/notifier/signals, and a
//! tempdir-backed environment that wires them into an [`Engine`].

#![allow(missing_docs)]

use failsafe_core::{
    Engine, EngineConfig, HealingSignals, HealthState, Invocation, Notification,
    NotificationSink, OperationOutcome, ProcessRunner, Services, Severity, Sleeper,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Runner that replays scripted outcomes per program.
///
/// Programs without a script succeed with empty output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    scripts: Mutex<HashMap<String, VecDeque<OperationOutcome>>>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for `program`; the last one repeats once the queue
    /// drains.
    pub fn script(&self, program: &str, outcomes: impl IntoIterator<Item = OperationOutcome>) {
        self.scripts
            .lock()
            .entry(program.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Every invocation seen, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    /// Number of runs of `program`
    pub fn count(&self, program: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program == program)
            .count()
    }
}

#[async_trait::async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> OperationOutcome {
        self.calls.lock().push(invocation.clone());
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&invocation.program) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(ok),
            Some(queue) => queue.front().cloned().unwrap_or_else(ok),
            None => ok(),
        }
    }
}

fn ok() -> OperationOutcome {
    OperationOutcome::succeeded(String::new())
}

/// Failure outcome with `code`
pub fn fail(code: i32) -> OperationOutcome {
    OperationOutcome::exited(code, format!("exit {code}"))
}

/// Timeout outcome
pub fn timeout() -> OperationOutcome {
    OperationOutcome::timed_out(String::new())
}

/// Success outcome with `output`
pub fn success(output: &str) -> OperationOutcome {
    OperationOutcome::succeeded(output)
}

/// Sleeper that records durations and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// Notifier that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    console: Mutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn console_lines(&self) -> Vec<(Severity, String)> {
        self.console.lock().clone()
    }

    /// Whether any console line contains `needle`
    pub fn printed(&self, needle: &str) -> bool {
        self.console.lock().iter().any(|(_, l)| l.contains(needle))
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.notifications.lock().push(notification.clone());
    }

    fn console(&self, severity: Severity, message: &str) {
        self.console.lock().push((severity, message.to_string()));
    }
}

/// Healing signals that count requests
#[derive(Debug, Default)]
pub struct RecordingSignals {
    rebuilds: Mutex<usize>,
    compactions: Mutex<usize>,
}

impl RecordingSignals {
    pub fn rebuilds(&self) -> usize {
        *self.rebuilds.lock()
    }

    pub fn compactions(&self) -> usize {
        *self.compactions.lock()
    }
}

impl HealingSignals for RecordingSignals {
    fn request_index_rebuild(&self) {
        *self.rebuilds.lock() += 1;
    }

    fn request_compaction(&self) {
        *self.compactions.lock() += 1;
    }
}

/// Isolated engine over a temporary state directory
pub struct TestEnv {
    pub dir: TempDir,
    pub runner: Arc<FakeRunner>,
    pub sleeper: Arc<RecordingSleeper>,
    pub notifier: Arc<RecordingNotifier>,
    pub signals: Arc<RecordingSignals>,
    pub engine: Engine,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|c| c)
    }

    /// Environment with a config adjusted by `adjust`
    pub fn with_config(adjust: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = adjust(
            EngineConfig::new()
                .with_state_dir(dir.path())
                .with_desktop_notifications(false),
        );
        let runner = Arc::new(FakeRunner::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let signals = Arc::new(RecordingSignals::default());
        let services = Services::new(config)
            .with_runner(runner.clone())
            .with_sleeper(sleeper.clone())
            .with_notifier(notifier.clone())
            .with_signals(signals.clone());
        Self {
            dir,
            runner,
            sleeper,
            notifier,
            signals,
            engine: Engine::new(services),
        }
    }

    pub fn services(&self) -> &Services {
        self.engine.services()
    }

    pub fn state(&self) -> HealthState {
        self.services().store.load()
    }

    /// Replace the persisted health state
    pub fn set_state(&self, mutate: impl FnOnce(&mut HealthState)) {
        self.services().store.update(mutate).expect("persist state");
    }

    /// All error log lines
    pub fn log_lines(&self) -> Vec<String> {
        self.services().errors.tail(usize::MAX).expect("read log")
    }

    /// Log lines tagged with `error_type`
    pub fn logged(&self, error_type: &str) -> Vec<String> {
        let tag = format!("] [{error_type}] ");
        self.log_lines()
            .into_iter()
            .filter(|l| l.contains(&tag))
            .collect()
    }

    /// Create an executable hook script named `name`
    pub fn hook(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("hooks").join(name);
        write_executable(&path, "#!/bin/sh\nexit 0\n");
        path
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `body` to `path` and mark it executable
pub fn write_executable(path: &Path, body: &str) {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).expect("create hook dir");
    }
    std::fs::write(path, body).expect("write hook");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod hook");
    }
}
