//! Hand-written fault-injecting doubles for the store client and snapshot store.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ChangeBatch;
use crate::FullDump;
use crate::InMemoryKv;
use crate::MemorySnapStore;
use crate::Result;
use crate::SnapStore;
use crate::Snapshot;
use crate::StorageError;
use crate::StoreClient;

/// Memory store whose writes and deletes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FlakySnapStore {
    pub inner: MemorySnapStore,
    failing_saves: AtomicUsize,
    failing_deletes: Mutex<HashSet<String>>,
    pub delete_attempts: AtomicUsize,
}

impl FlakySnapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` saves fail
    pub fn fail_next_saves(
        &self,
        n: usize,
    ) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    pub fn fail_deletes_of(
        &self,
        snapshot: &Snapshot,
    ) {
        self.failing_deletes.lock().insert(snapshot.key());
    }

    pub fn heal_deletes(&self) {
        self.failing_deletes.lock().clear();
    }
}

#[async_trait]
impl SnapStore for FlakySnapStore {
    async fn save(
        &self,
        snapshot: &Snapshot,
        data: Vec<u8>,
    ) -> Result<()> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Backend("injected save failure".to_string()).into());
        }
        self.inner.save(snapshot, data).await
    }

    async fn list(&self) -> Result<Vec<Snapshot>> {
        self.inner.list().await
    }

    async fn fetch(
        &self,
        snapshot: &Snapshot,
    ) -> Result<Vec<u8>> {
        self.inner.fetch(snapshot).await
    }

    async fn delete(
        &self,
        snapshot: &Snapshot,
    ) -> Result<()> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().contains(&snapshot.key()) {
            return Err(StorageError::Backend("injected delete failure".to_string()).into());
        }
        self.inner.delete(snapshot).await
    }
}

/// Wraps an [`InMemoryKv`], delaying every call and recording how many calls
/// overlapped.
#[derive(Debug)]
pub struct SlowClient {
    pub kv: Arc<InMemoryKv>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl SlowClient {
    pub fn new(
        kv: Arc<InMemoryKv>,
        delay: Duration,
    ) -> Self {
        Self {
            kv,
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreClient for SlowClient {
    async fn full_dump(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FullDump> {
        self.enter().await;
        let result = self.kv.full_dump(cancel).await;
        self.leave();
        result
    }

    async fn changes_since(
        &self,
        cancel: &CancellationToken,
        from_revision: u64,
    ) -> Result<ChangeBatch> {
        self.enter().await;
        let result = self.kv.changes_since(cancel, from_revision).await;
        self.leave();
        result
    }
}

/// Serves `kv` normally until `hang` is set; afterwards every call blocks forever
/// and ignores its cancellation token.
#[derive(Debug)]
pub struct HangingClient {
    pub kv: Arc<InMemoryKv>,
    pub hang: AtomicBool,
    pub hung_calls: AtomicUsize,
}

impl HangingClient {
    pub fn new(kv: Arc<InMemoryKv>) -> Self {
        Self {
            kv,
            hang: AtomicBool::new(false),
            hung_calls: AtomicUsize::new(0),
        }
    }

    async fn maybe_hang(&self) {
        if self.hang.load(Ordering::SeqCst) {
            self.hung_calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl StoreClient for HangingClient {
    async fn full_dump(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FullDump> {
        self.maybe_hang().await;
        self.kv.full_dump(cancel).await
    }

    async fn changes_since(
        &self,
        cancel: &CancellationToken,
        from_revision: u64,
    ) -> Result<ChangeBatch> {
        self.maybe_hang().await;
        self.kv.changes_since(cancel, from_revision).await
    }
}
