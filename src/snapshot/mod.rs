//! Snapshot metadata model.
//!
//! A [`Snapshot`] describes one persisted artifact. Everything the garbage collector
//! and the restorer need (kind, chain membership, revision range, creation time,
//! compression, finality) is encoded in the artifact key, so a listing is enough to
//! make retention and restore decisions without reading payloads.
//!
//! Key layout:
//! ```text
//! Backup-<chain created millis>/Full-<start:08>-<last:08>-<created millis>[.gz][.final]
//! Backup-<chain created millis>/Incr-<start:08>-<last:08>-<created millis>[.gz]
//! ```

mod chain;
mod naming;
pub use chain::*;
pub(crate) use naming::*;

#[cfg(test)]
mod snapshot_test;

use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::utils::time::truncate_to_millis;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    /// Complete point-in-time dump; anchors a chain
    Full,
    /// Changes between two revisions, valid only on top of its chain
    Delta,
}

impl fmt::Display for SnapshotKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            SnapshotKind::Full => write!(f, "full"),
            SnapshotKind::Delta => write!(f, "delta"),
        }
    }
}

/// Immutable record of one captured artifact.
///
/// Full snapshots cover `[0, last_revision]`; delta snapshots cover
/// `[start_revision, last_revision]` and always start at the previous artifact's
/// `last_revision + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub start_revision: u64,
    pub last_revision: u64,
    pub created_on: DateTime<Utc>,
    /// Creation time of the full snapshot anchoring this artifact's chain
    pub chain_created_on: DateTime<Utc>,
    pub compressed: bool,
    pub is_final: bool,
}

impl Snapshot {
    /// Creates a full snapshot that starts a new chain.
    pub fn full(
        revision: u64,
        created_on: DateTime<Utc>,
    ) -> Self {
        let created_on = truncate_to_millis(created_on);
        Self {
            kind: SnapshotKind::Full,
            start_revision: 0,
            last_revision: revision,
            created_on,
            chain_created_on: created_on,
            compressed: false,
            is_final: false,
        }
    }

    /// Creates a delta snapshot appended to `base`'s chain.
    pub fn delta(
        base: &Snapshot,
        start_revision: u64,
        last_revision: u64,
        created_on: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: SnapshotKind::Delta,
            start_revision,
            last_revision,
            created_on: truncate_to_millis(created_on),
            chain_created_on: base.chain_created_on,
            compressed: false,
            is_final: false,
        }
    }

    pub fn with_compression(
        mut self,
        compressed: bool,
    ) -> Self {
        self.compressed = compressed;
        self
    }

    /// Only full snapshots can be final.
    pub fn with_final(
        mut self,
        is_final: bool,
    ) -> Self {
        self.is_final = is_final && self.is_full();
        self
    }

    pub fn is_full(&self) -> bool {
        self.kind == SnapshotKind::Full
    }

    /// Whether both artifacts belong to the same chain.
    pub fn same_chain(
        &self,
        other: &Snapshot,
    ) -> bool {
        self.chain_created_on == other.chain_created_on
    }
}

impl fmt::Display for Snapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Sorts snapshots chain by chain (oldest chain first), the full snapshot ahead of
/// its deltas, deltas in revision order.
pub fn sort_snapshots(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| {
        a.chain_created_on
            .cmp(&b.chain_created_on)
            .then_with(|| b.is_full().cmp(&a.is_full()))
            .then_with(|| a.start_revision.cmp(&b.start_revision))
            .then_with(|| a.created_on.cmp(&b.created_on))
    });
}
