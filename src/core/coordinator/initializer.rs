use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// How thoroughly the data directory is checked before deciding to restore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMode {
    Full,
    Sanity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitializationStatus {
    New,
    Progress,
    Successful,
    Failed,
}

impl InitializationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

/// Validates local store data and restores it from snapshots when needed.
///
/// Runs only after the snapshot loop acknowledged an abort, so it may freely
/// rewrite the store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Initializer: Send + Sync + 'static {
    /// `fail_below_revision`: fail instead of restoring when the latest snapshot
    /// is older than this revision
    async fn initialize(
        &self,
        mode: ValidationMode,
        fail_below_revision: u64,
    ) -> Result<()>;
}
