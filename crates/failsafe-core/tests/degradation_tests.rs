use failsafe_core::{DegradationLevel, Feature};
use failsafe_test_utils::TestEnv;
use proptest::prelude::*;

#[test]
fn test_hook_failure_thresholds() {
    for k in 0..=10u32 {
        let env = TestEnv::new();
        env.set_state(|s| s.hook_failures_session = k);
        env.engine.degradation().check_triggers().unwrap();

        let level = env.engine.degradation().level();
        assert_eq!(level >= DegradationLevel::Reduced, k >= 3, "k = {k}");
        assert_eq!(level >= DegradationLevel::Minimal, k >= 5, "k = {k}");
        assert!(level < DegradationLevel::Emergency, "k = {k}");
    }
}

#[test]
fn test_agent_timeout_thresholds() {
    for k in 0..=6u32 {
        let env = TestEnv::new();
        env.set_state(|s| s.agent_timeouts_session = k);
        env.engine.degradation().check_triggers().unwrap();

        let level = env.engine.degradation().level();
        assert_eq!(level >= DegradationLevel::Reduced, k >= 2, "k = {k}");
        assert_eq!(level >= DegradationLevel::Minimal, k >= 4, "k = {k}");
    }
}

#[test]
fn test_degradation_cascade_to_reduced() {
    let env = TestEnv::new();
    env.set_state(|s| s.hook_failures_session = 3);

    let transition = env.engine.degradation().check_triggers().unwrap().unwrap();
    assert_eq!(transition.from, DegradationLevel::Full);
    assert_eq!(transition.to, DegradationLevel::Reduced);

    let state = env.state();
    assert_eq!(state.degradation_level, DegradationLevel::Reduced);
    assert_eq!(state.last_degradation_at, Some(transition.at));

    let notes = env.notifier.notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].message.contains("Reduced verification"));
    assert_eq!(env.logged("degradation_triggered").len(), 1);

    // Same counters, no second transition or notification
    assert!(env.engine.degradation().check_triggers().unwrap().is_none());
    assert_eq!(env.notifier.notifications().len(), 1);
}

#[test]
fn test_repeated_failures_enter_emergency() {
    let env = TestEnv::new();
    env.set_state(|s| s.repeated_failures = 10);
    env.engine.degradation().check_triggers().unwrap();

    assert_eq!(env.engine.degradation().level(), DegradationLevel::Emergency);
    assert!(!env.engine.degradation().is_feature_enabled(Feature::Hooks));
    assert!(!env.engine.degradation().is_feature_enabled(Feature::Agents));
    let note = &env.notifier.notifications()[0];
    assert!(note.message.contains("direct responses only"));
}

#[test]
fn test_never_decreases_when_counters_drop() {
    let env = TestEnv::new();
    env.set_state(|s| s.hook_failures_session = 5);
    env.engine.degradation().check_triggers().unwrap();
    assert_eq!(env.engine.degradation().level(), DegradationLevel::Minimal);

    env.set_state(|s| s.hook_failures_session = 0);
    assert!(env.engine.degradation().check_triggers().unwrap().is_none());
    assert_eq!(env.engine.degradation().level(), DegradationLevel::Minimal);
}

#[test]
fn test_reset_is_idempotent() {
    let env = TestEnv::new();
    env.set_state(|s| {
        s.hook_failures_session = 7;
        s.agent_timeouts_session = 3;
        s.repeated_failures = 12;
    });
    env.engine.degradation().check_triggers().unwrap();

    let once = env.engine.degradation().reset().unwrap();
    let twice = env.engine.degradation().reset().unwrap();
    assert_eq!(once, twice);
    assert_eq!(env.state(), twice);
    assert_eq!(twice.degradation_level, DegradationLevel::Full);
    assert_eq!(twice.hook_failures_session, 0);
    assert_eq!(twice.agent_timeouts_session, 0);
    assert_eq!(twice.repeated_failures, 0);
    assert!(twice.last_degradation_at.is_none());
}

#[test]
fn test_feature_table_follows_level() {
    let env = TestEnv::new();
    let gates = env.engine.degradation();
    assert!(Feature::KNOWN.iter().all(|f| gates.is_feature_enabled(*f)));
    assert!(gates.is_feature_enabled(Feature::Other));

    env.set_state(|s| s.degradation_level = DegradationLevel::Minimal);
    let table = gates.feature_table();
    let enabled: Vec<_> = table.iter().filter(|(_, on)| *on).map(|(f, _)| *f).collect();
    assert_eq!(enabled, vec![Feature::Hooks, Feature::Agents]);
    assert!(!gates.is_feature_enabled(Feature::Other));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_level_is_monotonic_without_reset(
        steps in prop::collection::vec((0u32..8, 0u32..6, 0u32..14), 1..12)
    ) {
        let env = TestEnv::new();
        let mut previous = DegradationLevel::Full;
        for (hooks, agents, repeated) in steps {
            env.set_state(|s| {
                s.hook_failures_session = hooks;
                s.agent_timeouts_session = agents;
                s.repeated_failures = repeated;
            });
            env.engine.degradation().check_triggers().unwrap();
            let level = env.engine.degradation().level();
            prop_assert!(level >= previous);
            previous = level;
        }
    }
}
