use async_trait::async_trait;
use dashmap::DashMap;

use super::SnapStore;
use crate::sort_snapshots;
use crate::Result;
use crate::Snapshot;
use crate::StorageError;

/// Snapshot store kept entirely in memory; safe for concurrent callers.
#[derive(Debug, Default)]
pub struct MemorySnapStore {
    artifacts: DashMap<String, (Snapshot, Vec<u8>)>,
}

impl MemorySnapStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn contains(
        &self,
        snapshot: &Snapshot,
    ) -> bool {
        self.artifacts.contains_key(&snapshot.key())
    }
}

#[async_trait]
impl SnapStore for MemorySnapStore {
    async fn save(
        &self,
        snapshot: &Snapshot,
        data: Vec<u8>,
    ) -> Result<()> {
        self.artifacts.insert(snapshot.key(), (snapshot.clone(), data));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self.artifacts.iter().map(|e| e.value().0.clone()).collect();
        sort_snapshots(&mut snapshots);
        Ok(snapshots)
    }

    async fn fetch(
        &self,
        snapshot: &Snapshot,
    ) -> Result<Vec<u8>> {
        self.artifacts
            .get(&snapshot.key())
            .map(|e| e.value().1.clone())
            .ok_or_else(|| StorageError::NotFound(snapshot.key()).into())
    }

    async fn delete(
        &self,
        snapshot: &Snapshot,
    ) -> Result<()> {
        self.artifacts.remove(&snapshot.key());
        Ok(())
    }
}
