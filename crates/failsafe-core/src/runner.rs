//! Process and sleep capabilities
//!
//! Both are traits so tests can script outcomes and record backoff sleeps
//! without touching real processes or clocks.

use crate::types::{Invocation, OperationOutcome};
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Exit code reported when a program cannot be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// How long output readers may run on after the child is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs one external invocation to completion or timeout
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Execute `invocation`; never fails, every outcome is classified
    async fn run(&self, invocation: &Invocation) -> OperationOutcome;
}

/// Suspends between retry attempts
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real processes via `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &Invocation) -> OperationOutcome {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(program = %invocation.program, error = %e, "spawn failed");
                return OperationOutcome::exited(
                    SPAWN_FAILURE_EXIT_CODE,
                    format!("failed to start {}: {e}", invocation.program),
                );
            }
        };

        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stdout))));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stderr))));
        }
        // Stdin is fed while the readers run, so a child that echoes its
        // input never blocks on a full output pipe.
        let feeder = match (child.stdin.take(), invocation.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(tokio::spawn(async move {
                // A child that exits without reading stdin is not an error.
                let _ = pipe.write_all(input.as_bytes()).await;
            })),
            _ => None,
        };

        let waited = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };
        if waited.is_none() {
            if let Err(e) = child.kill().await {
                tracing::debug!(program = %invocation.program, error = %e, "kill failed");
            }
        }
        if let Some(feeder) = feeder {
            feeder.abort();
        }
        // Descendants may keep the pipes open after the child is gone.
        for mut reader in readers {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                reader.abort();
            }
        }

        let mut text = String::from_utf8_lossy(&stdout.lock()).into_owned();
        text.push_str(&String::from_utf8_lossy(&stderr.lock()));
        match waited {
            None => OperationOutcome::timed_out(text),
            Some(Ok(status)) => OperationOutcome::exited(status.code().unwrap_or(-1), text),
            Some(Err(e)) => {
                OperationOutcome::exited(-1, format!("failed waiting for process: {e}"))
            }
        }
    }
}

/// Copy everything `reader` yields into `sink`, chunk by chunk, so a
/// cancelled drain still leaves what was read.
async fn drain<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                sink.lock().extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Real sleeps via `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
