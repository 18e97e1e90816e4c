use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tracing::trace;

use super::deletion_order;
use super::RetentionPolicy;
use crate::group_into_chains;
use crate::Snapshot;

/// Keeps chains created within `max_age`. The newest chain is always kept, so
/// a long pause in snapshotting never leaves the store empty.
#[derive(Debug, Clone)]
pub struct AgeBasedPolicy {
    max_age: Duration,
}

impl AgeBasedPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }
}

impl RetentionPolicy for AgeBasedPolicy {
    fn decide(
        &self,
        snapshots: &[Snapshot],
        now: DateTime<Utc>,
    ) -> Vec<Snapshot> {
        let cutoff = chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|max_age| now.checked_sub_signed(max_age));
        // Nothing is old enough when the age is out of range
        let Some(cutoff) = cutoff else {
            return Vec::new();
        };
        let set = group_into_chains(snapshots);
        trace!("age based retention: cutoff {}", cutoff);

        let mut eligible: Vec<Snapshot> = set
            .orphans
            .into_iter()
            .rev()
            .filter(|s| s.chain_created_on < cutoff)
            .collect();

        let newest = set.chains.len().saturating_sub(1);
        for chain in set.chains[..newest].iter().filter(|c| c.created_on() < cutoff) {
            eligible.extend(deletion_order(chain));
        }
        eligible
    }
}
