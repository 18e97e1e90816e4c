use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::constants::FINAL_SNAPSHOT_PIN_CYCLES;
use crate::Snapshot;
use crate::SnapshotChain;

/// Latest full snapshot and every delta persisted on top of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestSnapshots {
    pub full: Option<Snapshot>,
    pub deltas: Vec<Snapshot>,
}

impl LatestSnapshots {
    /// Last revision covered by the current chain
    pub fn last_revision(&self) -> Option<u64> {
        self.deltas
            .last()
            .or(self.full.as_ref())
            .map(|s| s.last_revision)
    }
}

/// Published view of the chain the snapshotter is extending.
///
/// Only the snapshotter writes, and only after an artifact is durably persisted.
/// Readers (control surface, garbage collector) get a consistent copy without
/// blocking the writer.
#[derive(Debug, Default)]
pub struct ChainState {
    latest: ArcSwap<LatestSnapshots>,
    /// Chain dir -> remaining retention cycles during which it is exempt
    pinned: Mutex<HashMap<String, u32>>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> LatestSnapshots {
        LatestSnapshots::clone(&self.latest.load())
    }

    pub fn current_full(&self) -> Option<Snapshot> {
        self.latest.load().full.clone()
    }

    pub(crate) fn publish_full(
        &self,
        full: Snapshot,
    ) {
        debug!("publishing full snapshot {}", full);
        self.latest.store(Arc::new(LatestSnapshots {
            full: Some(full),
            deltas: Vec::new(),
        }));
    }

    pub(crate) fn publish_delta(
        &self,
        delta: Snapshot,
    ) {
        debug!("publishing delta snapshot {}", delta);
        let mut next = self.latest();
        next.deltas.push(delta);
        self.latest.store(Arc::new(next));
    }

    pub(crate) fn resume(
        &self,
        chain: &SnapshotChain,
    ) {
        self.latest.store(Arc::new(LatestSnapshots {
            full: Some(chain.full.clone()),
            deltas: chain.deltas.clone(),
        }));
    }

    /// Exempts `snapshot`'s chain from deletion for the next retention cycles.
    pub(crate) fn pin(
        &self,
        snapshot: &Snapshot,
    ) {
        self.pinned
            .lock()
            .insert(snapshot.chain_dir(), FINAL_SNAPSHOT_PIN_CYCLES);
    }

    /// Chain dirs the garbage collector must not touch in the cycle about to run:
    /// the chain being extended plus every pinned chain.
    pub(crate) fn begin_retention_cycle(&self) -> HashSet<String> {
        let mut exempt: HashSet<String> = self.pinned.lock().keys().cloned().collect();
        if let Some(full) = self.current_full() {
            exempt.insert(full.chain_dir());
        }
        exempt
    }

    /// Counts a finished cycle against the pins that protected it. Pins added while
    /// the cycle ran are left untouched.
    pub(crate) fn complete_retention_cycle(
        &self,
        exempted: &HashSet<String>,
    ) {
        let mut pinned = self.pinned.lock();
        pinned.retain(|dir, remaining| {
            if exempted.contains(dir) {
                *remaining = remaining.saturating_sub(1);
            }
            *remaining > 0
        });
    }
}
