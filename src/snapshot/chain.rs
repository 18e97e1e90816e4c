use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::sort_snapshots;
use super::Snapshot;
use super::SnapshotKind;
use crate::RestoreError;

/// One full snapshot followed by its deltas in revision order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotChain {
    pub full: Snapshot,
    pub deltas: Vec<Snapshot>,
}

impl SnapshotChain {
    pub fn new(full: Snapshot) -> Self {
        Self {
            full,
            deltas: Vec::new(),
        }
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.full.chain_created_on
    }

    pub fn chain_dir(&self) -> String {
        self.full.chain_dir()
    }

    /// Last revision covered by the chain
    pub fn last_revision(&self) -> u64 {
        self.deltas
            .last()
            .map(|d| d.last_revision)
            .unwrap_or(self.full.last_revision)
    }

    /// Full snapshot first, then deltas
    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        std::iter::once(&self.full).chain(self.deltas.iter())
    }

    /// Checks that each delta starts right after the previous artifact.
    pub fn validate(&self) -> std::result::Result<(), RestoreError> {
        let mut previous = self.full.last_revision;
        for delta in &self.deltas {
            if delta.start_revision != previous + 1 {
                return Err(RestoreError::ChainGap {
                    previous_revision: previous,
                    next_start: delta.start_revision,
                    kind: SnapshotKind::Delta,
                });
            }
            previous = delta.last_revision;
        }
        Ok(())
    }
}

/// Result of grouping a listing into chains.
#[derive(Debug, Default)]
pub struct ChainSet {
    /// Complete chains, oldest first
    pub chains: Vec<SnapshotChain>,
    /// Deltas whose anchoring full snapshot no longer exists
    pub orphans: Vec<Snapshot>,
}

/// Groups snapshots by their anchoring full snapshot.
pub fn group_into_chains(snapshots: &[Snapshot]) -> ChainSet {
    let mut sorted = snapshots.to_vec();
    sort_snapshots(&mut sorted);

    let mut chains: BTreeMap<DateTime<Utc>, SnapshotChain> = BTreeMap::new();
    let mut orphans = Vec::new();
    for snapshot in sorted {
        match snapshot.kind {
            SnapshotKind::Full => {
                chains.insert(snapshot.chain_created_on, SnapshotChain::new(snapshot));
            }
            SnapshotKind::Delta => match chains.get_mut(&snapshot.chain_created_on) {
                Some(chain) => chain.deltas.push(snapshot),
                None => orphans.push(snapshot),
            },
        }
    }

    ChainSet {
        chains: chains.into_values().collect(),
        orphans,
    }
}

/// Most recent full snapshot plus every delta taken after it.
///
/// The chain is returned as found; callers decide what to do with gaps via
/// [`SnapshotChain::validate`].
pub fn latest_chain(snapshots: &[Snapshot]) -> Option<SnapshotChain> {
    group_into_chains(snapshots).chains.pop()
}
