use super::*;

const T0: i64 = 1_700_000_000_000;

fn tracker(threshold: u32) -> HealthTracker {
    HealthTracker::new(HealthConfig { fail_threshold: threshold, suppress_ttl_ms: 60_000, auto_suppress: true })
}

#[test]
fn test_threshold_failures_suppress() {
    let health = tracker(3);
    assert!(!health.record_failure_at("openai", "HTTP 500", T0));
    assert!(!health.record_failure_at("openai", "HTTP 500", T0 + 1));
    assert!(!health.is_suppressed_at("openai", T0 + 2));
    assert!(health.record_failure_at("openai", "HTTP 502", T0 + 2));
    assert!(health.is_suppressed_at("openai", T0 + 3));

    let record = health.record("openai").expect("record exists");
    assert_eq!(record.failure_count, 3);
    assert_eq!(record.failure_streak, 3);
    assert_eq!(record.last_error.as_deref(), Some("HTTP 502"));
}

#[test]
fn test_success_resets_streak() {
    let health = tracker(3);
    health.record_failure_at("groq", "timeout", T0);
    health.record_failure_at("groq", "timeout", T0);
    health.record_success_at("groq", 120, T0 + 1);
    health.record_failure_at("groq", "timeout", T0 + 2);
    health.record_failure_at("groq", "timeout", T0 + 3);

    assert!(!health.is_suppressed_at("groq", T0 + 4));
    assert_eq!(health.record("groq").map(|r| r.failure_streak), Some(2));
}

#[test]
fn test_auto_suppression_expires_lazily() {
    let health = tracker(1);
    health.record_failure_at("openai", "HTTP 503", T0);
    assert!(health.is_suppressed_at("openai", T0 + 59_999));
    assert!(!health.is_suppressed_at("openai", T0 + 60_000));

    let view = health.snapshot_at(T0 + 60_000);
    assert_eq!(view.len(), 1);
    assert!(!view[0].suppressed);
    assert!(view[0].suppression.is_none());
}

#[test]
fn test_manual_suppression_is_not_replaced_or_pruned() {
    let health = tracker(1);
    health.suppress("openai", None);
    assert!(!health.record_failure_at("openai", "HTTP 500", T0));
    assert!(health.is_suppressed_at("openai", T0 + 10_000_000));

    let view = health.snapshot_at(T0);
    assert_eq!(view[0].suppression.map(|s| s.reason), Some(SuppressionReason::Manual));

    assert!(health.clear_suppression("openai"));
    assert!(!health.is_suppressed_at("openai", T0));
    assert!(!health.clear_suppression("openai"));
}

#[test]
fn test_disabled_auto_suppression_only_counts() {
    let health = HealthTracker::new(HealthConfig { fail_threshold: 1, suppress_ttl_ms: 1, auto_suppress: false });
    assert!(!health.record_failure_at("openai", "HTTP 500", T0));
    assert!(!health.is_suppressed_at("openai", T0));
}

#[test]
fn test_rolling_latency_ewma() {
    let health = tracker(3);
    health.record_success_at("openai", 100, T0);
    assert_eq!(health.record("openai").and_then(|r| r.rolling_latency_ms), Some(100.0));

    health.record_success_at("openai", 200, T0 + 1);
    let rolling = health.record("openai").and_then(|r| r.rolling_latency_ms).unwrap_or_default();
    assert!((rolling - 130.0).abs() < 1e-9);
    assert_eq!(health.record("openai").map(|r| r.last_latency_ms), Some(Some(200)));
}

#[test]
fn test_snapshot_lists_suppressed_without_records() {
    let health = tracker(3);
    health.suppress("anthropic", Some(T0 + 1000));
    health.record_success_at("groq", 50, T0);

    let view = health.snapshot_at(T0);
    let names: Vec<&str> = view.iter().map(|v| v.provider.as_str()).collect();
    assert_eq!(names, vec!["anthropic", "groq"]);
    assert!(view[0].suppressed);
    assert_eq!(view[0].record.success_count, 0);
}
