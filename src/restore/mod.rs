//! Chain reconstruction.
//!
//! A [`Restorer`] rebuilds store state from the snapshot store: it loads the full
//! snapshot of the latest chain into a [`RestoreTarget`], then replays every delta
//! of that chain in revision order.


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::decode_changes;
use crate::latest_chain;
use crate::open_payload;
use crate::ChangeRecord;
use crate::RestoreError;
use crate::Result;
use crate::SnapStore;
use crate::Snapshot;
use crate::SnapshotChain;

/// Store being rebuilt from a snapshot chain.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RestoreTarget: Send + Sync + 'static {
    /// Replaces the whole keyspace with a full dump; returns the dump's revision.
    async fn load_full(
        &self,
        data: &[u8],
    ) -> Result<u64>;

    /// Applies changes in the given order.
    async fn apply_changes(
        &self,
        changes: Vec<ChangeRecord>,
    ) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub full: Snapshot,
    pub deltas_applied: usize,
    pub changes_applied: usize,
    /// Revision of the restored state
    pub last_revision: u64,
}

#[derive(Clone)]
pub struct Restorer {
    store: Arc<dyn SnapStore>,
}

impl std::fmt::Debug for Restorer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Restorer").finish_non_exhaustive()
    }
}

impl Restorer {
    pub fn new(store: Arc<dyn SnapStore>) -> Self {
        Self { store }
    }

    /// Most recent chain in the snapshot store.
    pub async fn latest_chain(&self) -> Result<SnapshotChain> {
        let snapshots = self.store.list().await?;
        latest_chain(&snapshots).ok_or_else(|| RestoreError::NoSnapshotFound.into())
    }

    pub async fn restore_latest(
        &self,
        target: &dyn RestoreTarget,
    ) -> Result<RestoreReport> {
        let chain = self.latest_chain().await?;
        self.restore_chain(&chain, target).await
    }

    /// Loads `chain` into `target`. A chain with a revision gap is rejected before
    /// anything is written to the target.
    pub async fn restore_chain(
        &self,
        chain: &SnapshotChain,
        target: &dyn RestoreTarget,
    ) -> Result<RestoreReport> {
        chain.validate()?;
        info!(
            "restoring chain {} ({} deltas, up to revision {})",
            chain.chain_dir(),
            chain.deltas.len(),
            chain.last_revision()
        );

        let payload = self.read_payload(&chain.full).await?;
        let loaded = target.load_full(&payload).await?;
        if loaded != chain.full.last_revision {
            return Err(RestoreError::RevisionOutOfRange {
                key: chain.full.key(),
                revision: loaded,
            }
            .into());
        }

        let mut report = RestoreReport {
            full: chain.full.clone(),
            deltas_applied: 0,
            changes_applied: 0,
            last_revision: loaded,
        };
        for delta in &chain.deltas {
            let changes = decode_changes(&self.read_payload(delta).await?)?;
            check_range(delta, &changes)?;
            let count = changes.len();
            target.apply_changes(changes).await?;

            debug!("applied {} changes from {}", count, delta);
            report.deltas_applied += 1;
            report.changes_applied += count;
            report.last_revision = delta.last_revision;
        }

        info!(
            "restored chain {} at revision {}",
            chain.chain_dir(),
            report.last_revision
        );
        Ok(report)
    }

    async fn read_payload(
        &self,
        snapshot: &Snapshot,
    ) -> Result<Vec<u8>> {
        let data = self.store.fetch(snapshot).await?;
        open_payload(snapshot, data)
    }
}

/// Every change must fall in the delta's declared range, in ascending order.
fn check_range(
    delta: &Snapshot,
    changes: &[ChangeRecord],
) -> Result<()> {
    let mut previous = delta.start_revision.saturating_sub(1);
    for change in changes {
        if change.revision <= previous || change.revision > delta.last_revision {
            return Err(RestoreError::RevisionOutOfRange {
                key: delta.key(),
                revision: change.revision,
            }
            .into());
        }
        previous = change.revision;
    }
    Ok(())
}
