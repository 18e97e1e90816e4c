use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ChangeBatch;
use super::ChangeOp;
use super::ChangeRecord;
use super::FullDump;
use super::StoreClient;
use crate::CaptureError;
use crate::ClientError;
use crate::RestoreError;
use crate::RestoreTarget;
use crate::Result;

/// Serialized form of a full dump.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvImage {
    pub revision: u64,
    pub entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl KvImage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CaptureError::Encode(e.to_string()).into())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| ClientError::Corrupt(e.to_string()).into())
    }
}

#[derive(Debug, Default)]
struct KvInner {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    revision: u64,
    /// Changes above `compact_revision`, ascending
    history: Vec<ChangeRecord>,
    compact_revision: u64,
}

/// Revisioned in-memory key-value store.
///
/// Every mutation bumps the store revision by one and is kept in the change history
/// until compacted. Serves as both a backup source and a restore target.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    inner: RwLock<KvInner>,
    unavailable: AtomicBool,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the revision of the write.
    pub fn put(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> u64 {
        let mut inner = self.inner.write();
        inner.revision += 1;
        let record = ChangeRecord::put(inner.revision, key, value);
        inner.entries.insert(record.key.clone(), record.value.clone());
        inner.history.push(record);
        inner.revision
    }

    /// Deleting a missing key is a no-op and does not bump the revision.
    pub fn delete(
        &self,
        key: &[u8],
    ) -> Option<u64> {
        let mut inner = self.inner.write();
        inner.entries.remove(key)?;
        inner.revision += 1;
        let record = ChangeRecord::delete(inner.revision, key);
        inner.history.push(record);
        Some(inner.revision)
    }

    pub fn get(
        &self,
        key: &[u8],
    ) -> Option<Vec<u8>> {
        self.inner.read().entries.get(key).cloned()
    }

    pub fn entries(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.inner.read().entries.clone()
    }

    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Drops history up to and including `revision`.
    pub fn compact(
        &self,
        revision: u64,
    ) {
        let mut inner = self.inner.write();
        let revision = revision.min(inner.revision);
        inner.history.retain(|r| r.revision > revision);
        inner.compact_revision = inner.compact_revision.max(revision);
        debug!("compacted history up to revision {}", inner.compact_revision);
    }

    /// Simulates the store endpoint going away.
    pub fn set_available(
        &self,
        available: bool,
    ) {
        self.unavailable.store(!available, Ordering::Release);
    }

    fn ensure_reachable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled.into());
        }
        if self.unavailable.load(Ordering::Acquire) {
            return Err(ClientError::Unavailable("in-memory store marked unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for InMemoryKv {
    async fn full_dump(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FullDump> {
        self.ensure_reachable(cancel)?;
        let image = {
            let inner = self.inner.read();
            KvImage {
                revision: inner.revision,
                entries: inner.entries.clone(),
            }
        };
        Ok(FullDump {
            data: image.encode()?,
            revision: image.revision,
        })
    }

    async fn changes_since(
        &self,
        cancel: &CancellationToken,
        from_revision: u64,
    ) -> Result<ChangeBatch> {
        self.ensure_reachable(cancel)?;
        let (records, bound_revision) = {
            let inner = self.inner.read();
            if inner.compact_revision > 0 && from_revision <= inner.compact_revision {
                return Err(ClientError::Compacted {
                    requested: from_revision,
                    compact_revision: inner.compact_revision,
                }
                .into());
            }
            let records: Vec<ChangeRecord> = inner
                .history
                .iter()
                .filter(|r| r.revision >= from_revision)
                .cloned()
                .collect();
            (records, inner.revision)
        };
        Ok(ChangeBatch {
            changes: stream::iter(records.into_iter().map(Ok)).boxed(),
            bound_revision,
        })
    }
}

#[async_trait]
impl RestoreTarget for InMemoryKv {
    async fn load_full(
        &self,
        data: &[u8],
    ) -> Result<u64> {
        let image = KvImage::decode(data)?;
        let mut inner = self.inner.write();
        inner.entries = image.entries;
        inner.revision = image.revision;
        inner.history.clear();
        inner.compact_revision = image.revision;
        Ok(image.revision)
    }

    async fn apply_changes(
        &self,
        changes: Vec<ChangeRecord>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        for record in changes {
            if record.revision <= inner.revision {
                return Err(RestoreError::Target(format!(
                    "change at revision {} does not advance store revision {}",
                    record.revision, inner.revision
                ))
                .into());
            }
            match record.op {
                ChangeOp::Put => {
                    inner.entries.insert(record.key.clone(), record.value.clone());
                }
                ChangeOp::Delete => {
                    inner.entries.remove(&record.key);
                }
            }
            inner.revision = record.revision;
            inner.history.push(record);
        }
        Ok(())
    }
}
