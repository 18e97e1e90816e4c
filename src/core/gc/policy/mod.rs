//! Retention policies.
//! Decide, from a listing alone, which snapshots may be deleted.

mod age_based;
mod limit_based;
pub use age_based::*;
pub use limit_based::*;


use chrono::DateTime;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;

use crate::GcConfig;
use crate::GcPolicyKind;
use crate::Snapshot;
use crate::SnapshotChain;

/// Pure decision over a snapshot listing.
///
/// Implementations never see which chain the snapshotter is extending; the
/// garbage collector removes exempt chains from the result.
#[cfg_attr(test, automock)]
pub trait RetentionPolicy: Send + Sync {
    /// Returns the snapshots eligible for deletion, each chain's deltas (newest
    /// first) ahead of its full snapshot.
    fn decide(
        &self,
        snapshots: &[Snapshot],
        now: DateTime<Utc>,
    ) -> Vec<Snapshot>;
}

pub fn build_retention_policy(config: &GcConfig) -> Box<dyn RetentionPolicy> {
    match config.policy {
        GcPolicyKind::LimitBased => Box::new(LimitBasedPolicy::new(config.max_backups)),
        GcPolicyKind::AgeBased => Box::new(AgeBasedPolicy::new(config.max_backup_age())),
    }
}

/// Deltas first, so an interrupted deletion never leaves deltas without their
/// full snapshot behind.
fn deletion_order(chain: &SnapshotChain) -> impl Iterator<Item = Snapshot> + '_ {
    chain.deltas.iter().rev().chain(std::iter::once(&chain.full)).cloned()
}
