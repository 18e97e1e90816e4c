//! Retention enforcement.
//!
//! The [`GarbageCollector`] runs independently of the snapshotter. Each cycle lists
//! the snapshot store, asks the configured [`RetentionPolicy`] what may go, drops
//! everything belonging to an exempt chain (the chain being extended and pinned
//! final snapshots) and deletes the rest one by one. A failed deletion is reported
//! and retried on the next cycle; it never stops the remaining deletions.

mod policy;
pub use policy::*;


use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics::GC_DELETIONS;
use crate::metrics::OUTCOME_FAILURE;
use crate::metrics::OUTCOME_SUCCESS;
use crate::ChainState;
use crate::DeletionError;
use crate::Result;
use crate::SnapStore;
use crate::Snapshot;

/// Outcome of one retention cycle.
#[derive(Debug, Default)]
pub struct GcReport {
    pub deleted: Vec<Snapshot>,
    pub failed: Vec<DeletionError>,
    /// Eligible snapshots kept because their chain was exempt
    pub exempted: usize,
}

pub struct GarbageCollector {
    store: Arc<dyn SnapStore>,
    policy: Box<dyn RetentionPolicy>,
    chain_state: Arc<ChainState>,
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("GarbageCollector").finish_non_exhaustive()
    }
}

impl GarbageCollector {
    pub fn new(
        store: Arc<dyn SnapStore>,
        policy: Box<dyn RetentionPolicy>,
        chain_state: Arc<ChainState>,
    ) -> Self {
        Self {
            store,
            policy,
            chain_state,
        }
    }

    /// Runs a retention cycle every `period` until `shutdown` fires.
    pub async fn run_loop(
        &self,
        period: Duration,
        shutdown: CancellationToken,
    ) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("garbage collector started with period {:?}", period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("garbage collector shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.collect_once().await {
                        warn!("garbage collection cycle failed: {}", e);
                    }
                }
            }
        }
    }

    /// One retention cycle. Only a failed listing is an error; deletion failures
    /// are collected in the report.
    pub async fn collect_once(&self) -> Result<GcReport> {
        let snapshots = self.store.list().await?;
        // Read after listing: a chain published meanwhile is already in `exempt`
        let exempt = self.chain_state.begin_retention_cycle();
        let mut report = GcReport::default();

        for snapshot in self.policy.decide(&snapshots, Utc::now()) {
            if exempt.contains(&snapshot.chain_dir()) {
                report.exempted += 1;
                continue;
            }
            match self.store.delete(&snapshot).await {
                Ok(()) => {
                    debug!("deleted snapshot {}", snapshot);
                    GC_DELETIONS.with_label_values(&[OUTCOME_SUCCESS]).inc();
                    report.deleted.push(snapshot);
                }
                Err(e) => {
                    let e = DeletionError {
                        key: snapshot.key(),
                        source: e.into_storage_error(),
                    };
                    warn!("{}; retrying on the next cycle", e);
                    GC_DELETIONS.with_label_values(&[OUTCOME_FAILURE]).inc();
                    report.failed.push(e);
                }
            }
        }
        // Pins only count cycles that saw their chain
        let protected: HashSet<String> = snapshots
            .iter()
            .map(Snapshot::chain_dir)
            .filter(|dir| exempt.contains(dir))
            .collect();
        self.chain_state.complete_retention_cycle(&protected);

        if !report.deleted.is_empty() || !report.failed.is_empty() {
            info!(
                "garbage collection removed {} snapshots, {} failed",
                report.deleted.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }
}
