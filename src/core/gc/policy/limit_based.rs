use chrono::DateTime;
use chrono::Utc;
use tracing::trace;

use super::deletion_order;
use super::RetentionPolicy;
use crate::group_into_chains;
use crate::Snapshot;

/// Keeps the `max_backups` most recent chains.
#[derive(Debug, Clone)]
pub struct LimitBasedPolicy {
    max_backups: usize,
}

impl LimitBasedPolicy {
    pub fn new(max_backups: usize) -> Self {
        Self { max_backups }
    }
}

impl RetentionPolicy for LimitBasedPolicy {
    fn decide(
        &self,
        snapshots: &[Snapshot],
        _now: DateTime<Utc>,
    ) -> Vec<Snapshot> {
        let set = group_into_chains(snapshots);
        let expired = set.chains.len().saturating_sub(self.max_backups);
        trace!(
            "limit based retention: {} chains, keeping {}, {} orphans",
            set.chains.len(),
            self.max_backups,
            set.orphans.len()
        );

        // Orphaned deltas can never be restored
        let mut eligible: Vec<Snapshot> = set.orphans.into_iter().rev().collect();
        for chain in &set.chains[..expired] {
            eligible.extend(deletion_order(chain));
        }
        eligible
    }
}
