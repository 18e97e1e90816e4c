//! This module provides the snapshot store abstraction:
//! - Durable save/list/fetch/delete of snapshot artifacts keyed by metadata
//! - A filesystem backend and an in-memory backend
//! - Payload encoding and compression helpers

mod codec;
mod local;
mod memory;
pub use codec::*;
pub use local::*;
pub use memory::*;


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use crate::Result;
use crate::Snapshot;
use crate::SnapstoreConfig;
use crate::StoreProvider;

/// Persistent storage for snapshot artifacts.
///
/// # Implementation Requirements
/// - Must guarantee atomic writes (an artifact is either fully listed or absent)
/// - Must tolerate concurrent callers (the snapshot loop and the garbage collector)
/// - `list` must only return artifacts whose key follows the snapshot naming layout
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SnapStore: Send + Sync + 'static {
    /// Persists one artifact under `snapshot.key()`.
    async fn save(
        &self,
        snapshot: &Snapshot,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Lists every persisted artifact, ordered chain by chain, full snapshot first.
    async fn list(&self) -> Result<Vec<Snapshot>>;

    /// Reads an artifact's payload back.
    async fn fetch(
        &self,
        snapshot: &Snapshot,
    ) -> Result<Vec<u8>>;

    /// Removes an artifact. Deleting an artifact that is already gone succeeds.
    async fn delete(
        &self,
        snapshot: &Snapshot,
    ) -> Result<()>;
}

/// Builds the snapshot store selected by configuration.
pub async fn build_snapstore(config: &SnapstoreConfig) -> Result<Arc<dyn SnapStore>> {
    match config.provider {
        StoreProvider::Local => {
            let dir = config.container.join(&config.prefix);
            info!("Using local snapshot store at {:?}", dir);
            Ok(Arc::new(LocalSnapStore::new(dir).await?))
        }
        StoreProvider::Memory => {
            info!("Using in-memory snapshot store");
            Ok(Arc::new(MemorySnapStore::new()))
        }
    }
}
