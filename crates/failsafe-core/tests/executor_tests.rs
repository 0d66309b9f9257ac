use failsafe_core::{DegradationLevel, FailsafeError, Invocation, Severity};
use failsafe_test_utils::{fail, success, timeout, TestEnv};
use std::path::Path;
use std::time::Duration;

fn key(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(unix)]
#[tokio::test]
async fn test_hook_success_returns_output() {
    let env = TestEnv::new();
    let hook = env.hook("pre-tool");
    env.runner.script(&key(&hook), [success("checked")]);

    let outcome = env.engine.hooks().run(&hook, Some("{}"), None).await;
    assert!(outcome.success);
    assert_eq!(outcome.output, "checked");
    assert_eq!(env.state().hook_failures_session, 0);

    let call = &env.runner.calls()[0];
    assert_eq!(call.stdin.as_deref(), Some("{}"));
    assert_eq!(call.timeout, Some(Duration::from_secs(10)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_hook_failures_are_bypassed() {
    let env = TestEnv::new();
    let hook = env.hook("lint");
    env.runner.script(&key(&hook), [fail(2), timeout()]);

    let first = env.engine.hooks().run(&hook, None, None).await;
    let second = env.engine.hooks().run(&hook, None, Some(Duration::from_secs(3))).await;
    assert!(first.success);
    assert!(second.success);

    assert_eq!(env.state().hook_failures_session, 2);
    let failures = env.logged("hook_failure");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("recovery=bypassed"));
    assert!(failures[0].contains("exit 2"));
    assert_eq!(env.logged("hook_timeout").len(), 1);
    assert!(env.notifier.printed("Hook 'lint' failed with exit code 2; bypassing"));
    assert!(env.notifier.printed("Hook 'lint' timed out after 3s; bypassing"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_third_hook_failure_degrades() {
    let env = TestEnv::new();
    let hook = env.hook("format");
    env.runner.script(&key(&hook), [fail(1)]);

    for _ in 0..3 {
        assert!(env.engine.hooks().run(&hook, None, None).await.success);
    }
    assert_eq!(env.state().degradation_level, DegradationLevel::Reduced);
    assert_eq!(env.notifier.notifications().len(), 1);

    for _ in 0..2 {
        env.engine.hooks().run(&hook, None, None).await;
    }
    assert_eq!(env.state().degradation_level, DegradationLevel::Minimal);
    assert_eq!(env.notifier.notifications().len(), 2);
}

#[tokio::test]
async fn test_missing_hook_is_bypassed() {
    let env = TestEnv::new();
    let missing = env.dir.path().join("hooks").join("absent");

    let outcome = env.engine.hooks().run(&missing, None, None).await;
    assert!(outcome.success);
    assert!(outcome.output.is_empty());
    assert!(env.runner.calls().is_empty());
    assert_eq!(env.logged("hook_not_found").len(), 1);
    assert_eq!(env.state().hook_failures_session, 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_non_utf8_hook_path_is_not_run() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let env = TestEnv::new();
    let hook = env
        .dir
        .path()
        .join("hooks")
        .join(OsStr::from_bytes(b"pre-\xff-tool"));
    failsafe_test_utils::write_executable(&hook, "#!/bin/sh\nexit 0\n");

    let outcome = env.engine.hooks().run(&hook, None, None).await;
    assert!(outcome.success);
    assert!(env.runner.calls().is_empty());
    assert_eq!(env.logged("hook_not_found").len(), 1);
    assert!(env.logged("hook_failure").is_empty());
    assert_eq!(env.state().hook_failures_session, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_hooks_skipped_in_emergency() {
    let env = TestEnv::new();
    let hook = env.hook("post-tool");
    env.set_state(|s| s.degradation_level = DegradationLevel::Emergency);

    let outcome = env.engine.hooks().run(&hook, None, None).await;
    assert!(outcome.success);
    assert!(env.runner.calls().is_empty());
    assert!(env.log_lines().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_hook_uses_healed_timeout() {
    let env = TestEnv::new();
    let hook = env.hook("slow");
    assert!(env
        .engine
        .healer()
        .attempt_self_heal(failsafe_core::ErrorType::HookTimeout, 3));

    env.engine.hooks().run(&hook, None, None).await;
    assert_eq!(env.runner.calls()[0].timeout, Some(Duration::from_secs(15)));
}

#[tokio::test]
async fn test_agent_success() {
    let env = TestEnv::new();
    env.runner.script("reviewer", [success("LGTM")]);

    let outcome = env
        .engine
        .agents()
        .run(&Invocation::new("reviewer").arg("--diff"), None, false)
        .await
        .unwrap();
    assert_eq!(outcome.output, "LGTM");
    assert_eq!(env.runner.calls()[0].timeout, Some(Duration::from_secs(300)));
    assert!(env.log_lines().is_empty());
}

#[tokio::test]
async fn test_agent_disabled_escalates_without_running() {
    let env = TestEnv::new();
    env.set_state(|s| s.degradation_level = DegradationLevel::Emergency);

    let err = env
        .engine
        .agents()
        .run(&Invocation::new("planner"), Some(Duration::from_secs(60)), false)
        .await
        .unwrap_err();

    assert!(env.runner.calls().is_empty());
    assert!(err.requires_human());
    let report = err.report().unwrap();
    assert_eq!(report.issue, "Agent Required");
    assert!(report.context.contains("agents are disabled"));
    assert!(report.to_string().contains("Agent Required"));
    assert_eq!(env.logged("user_escalation").len(), 1);

    let alerts = env.notifier.notifications();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].urgency, failsafe_core::Urgency::Critical);
    assert!(env
        .notifier
        .console_lines()
        .iter()
        .any(|(sev, line)| *sev == Severity::Critical && line.contains("USER ATTENTION REQUIRED")));
}

#[tokio::test]
async fn test_agent_timeouts_count_and_degrade() {
    let env = TestEnv::new();
    env.runner.script("researcher", [timeout()]);
    let agent = Invocation::new("researcher");

    let err = env
        .engine
        .agents()
        .run(&agent, Some(Duration::from_secs(5)), true)
        .await
        .unwrap_err();
    assert!(matches!(err, FailsafeError::AgentTimeout { secs: 5, .. }));
    // Timeouts are not re-run, even with retry_on_invalid
    assert_eq!(env.runner.count("researcher"), 1);
    assert_eq!(env.state().agent_timeouts_session, 1);
    assert_eq!(env.state().degradation_level, DegradationLevel::Full);

    let _ = env.engine.agents().run(&agent, None, false).await;
    let state = env.state();
    assert_eq!(state.agent_timeouts_session, 2);
    assert_eq!(state.degradation_level, DegradationLevel::Reduced);
    let killed = env.logged("agent_timeout");
    assert_eq!(killed.len(), 2);
    assert!(killed[0].contains("recovery=killed"));
}

#[tokio::test]
async fn test_agent_failure_is_surfaced_without_degrading() {
    let env = TestEnv::new();
    env.runner.script("writer", [fail(1)]);
    let agent = Invocation::new("writer");

    for _ in 0..4 {
        let err = env.engine.agents().run(&agent, None, false).await.unwrap_err();
        assert!(matches!(err, FailsafeError::AgentFailed { exit_code: 1, .. }));
    }
    let state = env.state();
    assert_eq!(state.agent_timeouts_session, 0);
    assert_eq!(state.degradation_level, DegradationLevel::Full);
    let failures = env.logged("agent_failure");
    assert_eq!(failures.len(), 4);
    assert!(failures[0].contains("recovery=failed"));
}

#[tokio::test]
async fn test_agent_retry_on_invalid_reruns_once() {
    let env = TestEnv::new();
    env.runner.script("coder", [fail(3), success("patched")]);

    let outcome = env
        .engine
        .agents()
        .run(&Invocation::new("coder"), None, true)
        .await
        .unwrap();
    assert_eq!(outcome.output, "patched");
    assert_eq!(env.runner.count("coder"), 2);
    assert!(env.logged("agent_failure").is_empty());
}
