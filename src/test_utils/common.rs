use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

use crate::SnapshotterConfig;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub fn at(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap()
}

/// Snapshotter settings for tests: full snapshots never come due on their own,
/// deltas every `delta_period`.
pub fn test_snapshotter_config(delta_period: Duration) -> SnapshotterConfig {
    SnapshotterConfig {
        full_snapshot_schedule: "0 0 1 1 *".to_string(),
        delta_snapshot_period_ms: delta_period.as_millis() as u64,
        delta_snapshot_memory_limit: 1024 * 1024,
        delta_watch_interval_ms: 10,
        store_connection_timeout_ms: 2_000,
        compression_enabled: false,
    }
}

/// Polls `condition` every few milliseconds until it holds or `limit` elapses.
pub async fn wait_until<F>(
    limit: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
