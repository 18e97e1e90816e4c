use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use d_backup::build_snapstore;
use d_backup::BackupConfig;
use d_backup::GcConfig;
use d_backup::LifecycleConfig;
use d_backup::SnapStore;
use d_backup::SnapshotterConfig;
use d_backup::SnapstoreConfig;
use d_backup::StoreProvider;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

/// Full snapshots only when asked for; deltas every `delta_period`.
pub fn backup_config(
    dir: &Path,
    delta_period: Duration,
    max_backups: usize,
) -> BackupConfig {
    BackupConfig {
        snapshotter: SnapshotterConfig {
            full_snapshot_schedule: "0 0 1 1 *".to_string(),
            delta_snapshot_period_ms: delta_period.as_millis() as u64,
            delta_watch_interval_ms: 5,
            store_connection_timeout_ms: 2_000,
            ..Default::default()
        },
        gc: GcConfig {
            garbage_collection_period_ms: 25,
            max_backups,
            ..Default::default()
        },
        store: SnapstoreConfig {
            provider: StoreProvider::Local,
            container: dir.to_path_buf(),
            prefix: "v2".to_string(),
        },
        lifecycle: LifecycleConfig {
            abort_ack_timeout_ms: 5_000,
            trigger_timeout_ms: 5_000,
        },
        ..Default::default()
    }
}

pub async fn local_store(config: &BackupConfig) -> Arc<dyn SnapStore> {
    build_snapstore(&config.store).await.unwrap()
}

/// Polls `condition` until it holds or `limit` elapses.
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
