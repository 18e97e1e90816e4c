//! Key-value store client boundary.
//!
//! The snapshotter only needs two capabilities from the store it backs up: a
//! consistent full dump at a revision, and the stream of changes committed after a
//! given revision.

mod memory;
pub use memory::*;


use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    Put,
    Delete,
}

/// One committed mutation, as recorded in a delta snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub revision: u64,
    pub op: ChangeOp,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl ChangeRecord {
    pub fn put(
        revision: u64,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            revision,
            op: ChangeOp::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(
        revision: u64,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            revision,
            op: ChangeOp::Delete,
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// Approximate in-memory footprint, used for the memory-limit flush.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len() + std::mem::size_of::<u64>() + 1
    }
}

/// Consistent dump of the whole keyspace.
#[derive(Debug)]
pub struct FullDump {
    pub data: Vec<u8>,
    /// Store revision the dump reflects
    pub revision: u64,
}

/// Changes committed after a revision.
pub struct ChangeBatch {
    /// Records in ascending revision order
    pub changes: BoxStream<'static, Result<ChangeRecord>>,
    /// Store revision at the time the batch was opened; `changes` holds nothing
    /// above it
    pub bound_revision: u64,
}

/// Connection to the key-value store being backed up.
///
/// # Implementation Requirements
/// - `full_dump` must be consistent at the revision it reports
/// - `changes_since` must fail with [`crate::ClientError::Compacted`] once the
///   requested history is gone
/// - Both calls should return promptly once `cancel` fires
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    async fn full_dump(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FullDump>;

    /// Opens the stream of changes with revision `>= from_revision`.
    async fn changes_since(
        &self,
        cancel: &CancellationToken,
        from_revision: u64,
    ) -> Result<ChangeBatch>;
}
