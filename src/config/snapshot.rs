use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_DELTA_SNAPSHOT_MEMORY_LIMIT;
use crate::Error;
use crate::FullSnapshotSchedule;
use crate::Result;

/// Scheduling of full and delta snapshot production.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SnapshotterConfig {
    /// Cron expression (5 or 6 fields) for periodic full snapshots
    #[serde(default = "default_full_snapshot_schedule")]
    pub full_snapshot_schedule: String,

    /// Delta snapshot period. `0` disables delta snapshots entirely.
    #[serde(default = "default_delta_snapshot_period_ms")]
    pub delta_snapshot_period_ms: u64,

    /// Buffered change volume (bytes) that forces a delta flush before the period
    /// elapses
    #[serde(default = "default_delta_snapshot_memory_limit")]
    pub delta_snapshot_memory_limit: usize,

    /// How often pending changes are pulled to evaluate the memory limit
    #[serde(default = "default_delta_watch_interval_ms")]
    pub delta_watch_interval_ms: u64,

    /// Upper bound on a single store client call
    #[serde(default = "default_store_connection_timeout_ms")]
    pub store_connection_timeout_ms: u64,

    #[serde(default)]
    pub compression_enabled: bool,
}

impl Default for SnapshotterConfig {
    fn default() -> Self {
        Self {
            full_snapshot_schedule: default_full_snapshot_schedule(),
            delta_snapshot_period_ms: default_delta_snapshot_period_ms(),
            delta_snapshot_memory_limit: default_delta_snapshot_memory_limit(),
            delta_watch_interval_ms: default_delta_watch_interval_ms(),
            store_connection_timeout_ms: default_store_connection_timeout_ms(),
            compression_enabled: false,
        }
    }
}

impl SnapshotterConfig {
    pub fn validate(&self) -> Result<()> {
        FullSnapshotSchedule::parse(&self.full_snapshot_schedule)?;

        if self.delta_snapshot_memory_limit == 0 {
            return Err(Error::InvalidConfig(
                "delta_snapshot_memory_limit must be greater than 0".into(),
            ));
        }
        if self.delta_snapshots_enabled() && self.delta_watch_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "delta_watch_interval_ms must be greater than 0".into(),
            ));
        }
        if self.store_connection_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "store_connection_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn delta_snapshots_enabled(&self) -> bool {
        self.delta_snapshot_period_ms > 0
    }

    /// `None` when delta snapshots are disabled
    pub fn delta_snapshot_period(&self) -> Option<Duration> {
        self.delta_snapshots_enabled()
            .then(|| Duration::from_millis(self.delta_snapshot_period_ms))
    }

    pub fn delta_watch_interval(&self) -> Duration {
        Duration::from_millis(self.delta_watch_interval_ms.max(1))
    }

    pub fn store_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.store_connection_timeout_ms)
    }
}

fn default_full_snapshot_schedule() -> String {
    "0 */1 * * *".to_string()
}
fn default_delta_snapshot_period_ms() -> u64 {
    20_000
}
fn default_delta_snapshot_memory_limit() -> usize {
    DEFAULT_DELTA_SNAPSHOT_MEMORY_LIMIT
}
fn default_delta_watch_interval_ms() -> u64 {
    1_000
}
fn default_store_connection_timeout_ms() -> u64 {
    30_000
}
