//! Composition root of the snapshot lifecycle.
//!
//! The [`Coordinator`] owns the snapshot loop task, the garbage collector task and
//! the optional metrics server, and exposes the control surface used by an
//! embedding HTTP layer: on-demand triggers, the latest snapshot report, the abort
//! handshake and data initialization.
//!
//! The installed snapshotter is an optional shared handle behind a single lock;
//! every reader and writer goes through [`Coordinator::snapshotter`],
//! [`Coordinator::set_snapshotter`] and [`Coordinator::clear_snapshotter`].

mod initializer;
pub use initializer::*;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::build_retention_policy;
use crate::metrics;
use crate::utils::async_task::join_with_grace;
use crate::utils::async_task::spawn_task;
use crate::AbortAck;
use crate::BackupConfig;
use crate::ChainState;
use crate::Error;
use crate::GarbageCollector;
use crate::LatestSnapshots;
use crate::Result;
use crate::SnapStore;
use crate::Snapshot;
use crate::SnapshotError;
use crate::Snapshotter;
use crate::StoreClient;

type SnapshotterSlot = Arc<Mutex<Option<Arc<Snapshotter>>>>;

/// Snapshotter whose loop was spawned last, with the loop task
type LoopTask = (Arc<Snapshotter>, JoinHandle<()>);

pub struct Coordinator {
    config: BackupConfig,
    client: Arc<dyn StoreClient>,
    store: Arc<dyn SnapStore>,
    chain_state: Arc<ChainState>,
    gc: Arc<GarbageCollector>,

    snapshotter: SnapshotterSlot,
    init_status: Arc<Mutex<InitializationStatus>>,

    started: AtomicBool,
    shutdown: CancellationToken,
    snapshot_loop: Mutex<Option<LoopTask>>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("snapshotter", &self.snapshotter())
            .field("init_status", &*self.init_status.lock())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Validates `config` and installs a snapshotter built from it.
    pub fn new(
        config: BackupConfig,
        client: Arc<dyn StoreClient>,
        store: Arc<dyn SnapStore>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let chain_state = Arc::new(ChainState::new());
        let gc = Arc::new(GarbageCollector::new(
            store.clone(),
            build_retention_policy(&config.gc),
            chain_state.clone(),
        ));

        let coordinator = Self {
            config,
            client,
            store,
            chain_state,
            gc,
            snapshotter: Arc::new(Mutex::new(None)),
            init_status: Arc::new(Mutex::new(InitializationStatus::New)),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            snapshot_loop: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        };
        let snapshotter = coordinator.build_snapshotter()?;
        coordinator.set_snapshotter(snapshotter);
        Ok(coordinator)
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn chain_state(&self) -> &Arc<ChainState> {
        &self.chain_state
    }

    pub fn garbage_collector(&self) -> &Arc<GarbageCollector> {
        &self.gc
    }

    /// A fresh snapshotter over this coordinator's store, client and chain state.
    pub fn build_snapshotter(&self) -> Result<Arc<Snapshotter>> {
        Ok(Arc::new(Snapshotter::new(
            self.config.snapshotter.clone(),
            self.client.clone(),
            self.store.clone(),
            self.chain_state.clone(),
        )?))
    }

    pub fn snapshotter(&self) -> Option<Arc<Snapshotter>> {
        self.snapshotter.lock().clone()
    }

    /// Installs `snapshotter`, returning the one it replaces.
    pub fn set_snapshotter(
        &self,
        snapshotter: Arc<Snapshotter>,
    ) -> Option<Arc<Snapshotter>> {
        self.snapshotter.lock().replace(snapshotter)
    }

    pub fn clear_snapshotter(&self) -> Option<Arc<Snapshotter>> {
        self.snapshotter.lock().take()
    }

    fn require_snapshotter(&self) -> Result<Arc<Snapshotter>> {
        self.snapshotter().ok_or(Error::SnapshotterNotConfigured)
    }

    /// Spawns the garbage collector, the metrics server when enabled, and the loop
    /// of the installed snapshotter. Only the first call succeeds; use
    /// [`Coordinator::start_snapshotter`] to run a snapshotter installed later.
    pub fn start(
        &self,
        start_with_full_snapshot: bool,
    ) -> Result<()> {
        self.require_snapshotter()?;
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SnapshotError::AlreadyRunning.into());
        }

        let mut tasks = self.tasks.lock();

        let gc = self.gc.clone();
        let period = self.config.gc.period();
        let shutdown = self.shutdown.clone();
        tasks.push((
            "garbage collector",
            tokio::spawn(async move { gc.run_loop(period, shutdown).await }),
        ));

        if let Some(addr) = self.config.monitoring.metrics_address() {
            let shutdown = self.shutdown.clone();
            tasks.push((
                "metrics server",
                tokio::spawn(async move { metrics::start_server(addr, shutdown).await }),
            ));
        }

        drop(tasks);

        self.start_snapshotter(start_with_full_snapshot)?;
        info!(
            "snapshot lifecycle started (start with full snapshot: {})",
            start_with_full_snapshot
        );
        Ok(())
    }

    /// Spawns the loop of the installed snapshotter, e.g. one installed after an
    /// initialization. Fails with `AlreadyRunning` while that snapshotter's loop is
    /// still alive.
    pub fn start_snapshotter(
        &self,
        start_with_full_snapshot: bool,
    ) -> Result<()> {
        let snapshotter = self.require_snapshotter()?;
        let mut current = self.snapshot_loop.lock();
        if let Some((running, handle)) = current.as_ref() {
            if Arc::ptr_eq(running, &snapshotter) && !handle.is_finished() {
                return Err(SnapshotError::AlreadyRunning.into());
            }
        }
        if snapshotter.is_running() {
            return Err(SnapshotError::AlreadyRunning.into());
        }

        let shutdown = self.shutdown.clone();
        let task = snapshotter.clone();
        let handle = spawn_task("snapshotter", move || async move {
            task.run(shutdown, start_with_full_snapshot).await
        });
        if let Some((_, previous)) = current.replace((snapshotter, handle)) {
            // An aborted loop may still be winding down
            self.tasks.lock().push(("snapshotter", previous));
        }
        Ok(())
    }

    pub async fn trigger_full_snapshot(
        &self,
        is_final: bool,
    ) -> Result<Snapshot> {
        let snapshotter = self.require_snapshotter()?;
        let deadline = Instant::now() + self.config.lifecycle.trigger_timeout();
        snapshotter.trigger_full_snapshot(deadline, is_final).await
    }

    /// `None` when nothing changed since the last snapshot.
    pub async fn trigger_delta_snapshot(&self) -> Result<Option<Snapshot>> {
        let snapshotter = self.require_snapshotter()?;
        match snapshotter.trigger_delta_snapshot().await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if e.is_empty_delta() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn latest_snapshots(&self) -> Result<LatestSnapshots> {
        Ok(self.require_snapshotter()?.latest_snapshots())
    }

    /// Stops the installed snapshot loop and waits for its acknowledgment.
    /// `None` when no snapshotter is installed.
    pub async fn abort_and_wait(&self) -> Result<Option<AbortAck>> {
        abort_installed(&self.snapshotter, self.config.lifecycle.abort_ack_timeout()).await
    }

    /// Starts a data initialization in the background.
    ///
    /// The snapshot loop is aborted first; once it acknowledged, the snapshotter is
    /// uninstalled and `initializer` runs. Progress is observed through
    /// [`Coordinator::initialization_status`]. A new initialization is accepted
    /// only from `New`, so the outcome of the previous one must be read first.
    /// Afterwards install a snapshotter and call
    /// [`Coordinator::start_snapshotter`] to resume snapshotting.
    pub fn start_initialization(
        &self,
        initializer: Arc<dyn Initializer>,
        mode: ValidationMode,
        fail_below_revision: u64,
    ) -> Result<()> {
        {
            let mut status = self.init_status.lock();
            if *status != InitializationStatus::New {
                return Err(Error::InitializationInProgress);
            }
            *status = InitializationStatus::Progress;
        }

        let slot = self.snapshotter.clone();
        let status = self.init_status.clone();
        let ack_timeout = self.config.lifecycle.abort_ack_timeout();
        let handle = tokio::spawn(async move {
            let outcome = initialize(&slot, ack_timeout, initializer.as_ref(), mode, fail_below_revision).await;
            let next = match outcome {
                Ok(()) => {
                    info!("initialization succeeded");
                    InitializationStatus::Successful
                }
                Err(e) => {
                    error!("initialization failed: {}", e);
                    InitializationStatus::Failed
                }
            };
            *status.lock() = next;
        });
        self.tasks.lock().push(("initializer", handle));
        Ok(())
    }

    /// Current initialization status. A terminal status is reported once, then
    /// reset to `New`.
    pub fn initialization_status(&self) -> InitializationStatus {
        let mut status = self.init_status.lock();
        let current = *status;
        if current.is_terminal() {
            *status = InitializationStatus::New;
        }
        current
    }

    /// Cancels every background task and waits for them to finish.
    pub async fn shutdown(&self) {
        info!("shutting down snapshot lifecycle");
        self.shutdown.cancel();

        let grace = self.config.lifecycle.abort_ack_timeout();
        let mut tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if let Some((_, handle)) = self.snapshot_loop.lock().take() {
            tasks.push(("snapshotter", handle));
        }
        for (name, handle) in tasks {
            join_with_grace(name, handle, grace).await;
        }
    }
}

async fn abort_installed(
    slot: &SnapshotterSlot,
    ack_timeout: Duration,
) -> Result<Option<AbortAck>> {
    let Some(snapshotter) = slot.lock().clone() else {
        info!("no snapshotter installed; skipping abort handshake");
        return Ok(None);
    };
    snapshotter.abort_and_wait(ack_timeout).await.map(Some)
}

async fn initialize(
    slot: &SnapshotterSlot,
    ack_timeout: Duration,
    initializer: &dyn Initializer,
    mode: ValidationMode,
    fail_below_revision: u64,
) -> Result<()> {
    if let Some(ack) = abort_installed(slot, ack_timeout).await? {
        info!(
            "snapshot loop stopped at revision {}; starting {:?} initialization",
            ack.last_revision, mode
        );
    }
    // An aborted snapshotter refuses every capture
    if slot.lock().take().is_some() {
        warn!("snapshotter uninstalled for initialization");
    }
    initializer.initialize(mode, fail_below_revision).await
}
