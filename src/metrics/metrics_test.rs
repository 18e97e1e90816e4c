use chrono::DateTime;
use chrono::Utc;

use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("dbackup".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    GC_DELETIONS.with_label_values(&[OUTCOME_SUCCESS]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"dbackup_gc_deletions_total"),
        "Missing dbackup_gc_deletions_total"
    );
    assert!(gather_text(&registry).contains("dbackup_gc_deletions_total"));
}

#[test]
fn test_capture_observation_updates_collectors() {
    let full = Snapshot::full(42, DateTime::<Utc>::from_timestamp_millis(1_000).unwrap());
    let before = SNAPSHOT_OUTCOMES.with_label_values(&["full", OUTCOME_SUCCESS]).get();

    observe_capture_success(&full, Duration::from_millis(12));

    // Counters are process wide and other tests capture concurrently
    assert!(SNAPSHOT_OUTCOMES.with_label_values(&["full", OUTCOME_SUCCESS]).get() > before);
    assert!(CAPTURE_DURATION_SECONDS.with_label_values(&["full"]).get_sample_count() > 0);
}

#[test]
fn test_failure_counter_increment() {
    let before = SNAPSHOT_OUTCOMES.with_label_values(&["delta", OUTCOME_FAILURE]).get();
    observe_capture_failure(SnapshotKind::Delta);
    observe_capture_failure(SnapshotKind::Delta);
    assert!(SNAPSHOT_OUTCOMES.with_label_values(&["delta", OUTCOME_FAILURE]).get() >= before + 2);
}
