//! Full and delta snapshot production.
//!
//! A [`Snapshotter`] owns the chain cursor (the last persisted full snapshot, the
//! last covered revision and the changes buffered for the next delta). Every
//! capture, whether timer driven or on demand, runs while holding the cursor lock,
//! so captures are strictly serialized and the cursor only advances after the
//! snapshot store confirmed the write.

mod capture;
mod run;
mod schedule;
pub use schedule::*;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tokio::time::timeout;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::handshake::AbortSignal;
use crate::AbortAck;
use crate::CaptureError;
use crate::ChainState;
use crate::ChangeRecord;
use crate::LatestSnapshots;
use crate::Result;
use crate::SnapStore;
use crate::Snapshot;
use crate::SnapshotError;
use crate::SnapshotterConfig;
use crate::StoreClient;

/// Snapshot loop state machine.
///
/// `Idle -> Capturing -> Idle` on success, `Capturing -> Failed` on an absorbed
/// failure (retried on the next timer fire), `Idle -> Aborting -> Stopped` on an
/// abort request. A snapshotter whose loop is not running reports `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotterState {
    Idle,
    Capturing,
    Failed,
    Aborting,
    Stopped,
}

/// Changes read from the store but not yet persisted in a delta snapshot.
#[derive(Debug, Default)]
pub(crate) struct DeltaBuffer {
    records: Vec<ChangeRecord>,
    bytes: usize,
    /// Highest store revision read so far
    buffered_revision: u64,
}

impl DeltaBuffer {
    fn extend(
        &mut self,
        records: Vec<ChangeRecord>,
        bound_revision: u64,
    ) {
        self.bytes += records.iter().map(ChangeRecord::size).sum::<usize>();
        self.records.extend(records);
        self.buffered_revision = self.buffered_revision.max(bound_revision);
    }

    /// Drops everything; the next read starts right after `revision`.
    fn reset_to(
        &mut self,
        revision: u64,
    ) {
        self.records.clear();
        self.bytes = 0;
        self.buffered_revision = revision;
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChainCursor {
    /// Full snapshot anchoring the chain being extended
    full: Option<Snapshot>,
    /// Last revision covered by a persisted artifact of the chain
    last_revision: u64,
    buffer: DeltaBuffer,
}

pub struct Snapshotter {
    config: SnapshotterConfig,
    schedule: FullSnapshotSchedule,
    client: Arc<dyn StoreClient>,
    store: Arc<dyn SnapStore>,
    chain_state: Arc<ChainState>,

    cursor: Mutex<ChainCursor>,
    state_tx: watch::Sender<SnapshotterState>,
    running: AtomicBool,

    abort: AbortSignal,
    /// Held for the whole abort round trip
    handshake: Mutex<()>,
}

impl std::fmt::Debug for Snapshotter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Snapshotter")
            .field("schedule", &self.schedule)
            .field("state", &self.state())
            .finish()
    }
}

impl Snapshotter {
    pub fn new(
        config: SnapshotterConfig,
        client: Arc<dyn StoreClient>,
        store: Arc<dyn SnapStore>,
        chain_state: Arc<ChainState>,
    ) -> Result<Self> {
        let schedule = FullSnapshotSchedule::parse(&config.full_snapshot_schedule)?;
        let (state_tx, _) = watch::channel(SnapshotterState::Stopped);
        Ok(Self {
            config,
            schedule,
            client,
            store,
            chain_state,
            cursor: Mutex::new(ChainCursor::default()),
            state_tx,
            running: AtomicBool::new(false),
            abort: AbortSignal::new(),
            handshake: Mutex::new(()),
        })
    }

    pub fn state(&self) -> SnapshotterState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SnapshotterState> {
        self.state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether an abort was requested. An aborted snapshotter refuses further
    /// captures.
    pub fn is_aborting(&self) -> bool {
        self.abort.is_requested()
    }

    /// Whether a controller is blocked waiting for the abort acknowledgment
    pub fn is_abort_pending(&self) -> bool {
        self.abort.is_waiting()
    }

    pub fn latest_snapshots(&self) -> LatestSnapshots {
        self.chain_state.latest()
    }

    pub fn chain_state(&self) -> &Arc<ChainState> {
        &self.chain_state
    }

    pub fn config(&self) -> &SnapshotterConfig {
        &self.config
    }

    fn set_state(
        &self,
        state: SnapshotterState,
    ) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("snapshotter state {:?} -> {:?}", previous, state);
        }
    }

    /// Takes the cursor lock, refusing while an abort is in progress.
    async fn lock_cursor(
        &self,
        deadline: Option<Instant>,
    ) -> Result<MutexGuard<'_, ChainCursor>> {
        if self.abort.is_requested() {
            return Err(SnapshotError::Busy.into());
        }
        let cursor = match deadline {
            Some(deadline) => {
                let started = Instant::now();
                timeout_at(deadline, self.cursor.lock())
                    .await
                    .map_err(|_| CaptureError::Timeout(started.elapsed()))?
            }
            None => self.cursor.lock().await,
        };
        // The abort may have been requested while we were queued behind a capture
        if self.abort.is_requested() {
            return Err(SnapshotError::Busy.into());
        }
        Ok(cursor)
    }

    /// Takes a full snapshot now, after any in-flight capture completes.
    ///
    /// A final snapshot is exempt from garbage collection for at least one
    /// retention cycle.
    pub async fn trigger_full_snapshot(
        &self,
        deadline: Instant,
        is_final: bool,
    ) -> Result<Snapshot> {
        let mut cursor = self.lock_cursor(Some(deadline)).await?;
        let cancel = self.abort.force_token();
        let snapshot = self.capture_full(&mut cursor, &cancel, Some(deadline), is_final).await?;
        info!("on-demand full snapshot {} taken", snapshot);
        Ok(snapshot)
    }

    /// Takes a delta snapshot of every change since the last persisted artifact.
    ///
    /// # Errors
    /// - `NoBaseSnapshot` before the first full snapshot of this run
    /// - `EmptyDelta` when nothing changed
    /// - `DeltaSnapshotsDisabled` when the delta period is `0`
    pub async fn trigger_delta_snapshot(&self) -> Result<Snapshot> {
        if !self.config.delta_snapshots_enabled() {
            return Err(SnapshotError::DeltaSnapshotsDisabled.into());
        }
        let mut cursor = self.lock_cursor(None).await?;
        let cancel = self.abort.force_token();
        let snapshot = self.capture_delta(&mut cursor, &cancel, None).await?;
        info!("on-demand delta snapshot {} taken", snapshot);
        Ok(snapshot)
    }

    /// Asks the snapshot loop to stop and waits until it did.
    ///
    /// On return no capture is in flight and none will start again on this
    /// snapshotter. When the loop does not acknowledge within `ack_timeout`,
    /// in-flight store client calls are cancelled and `ShutdownTimeout` is returned.
    pub async fn abort_and_wait(
        &self,
        ack_timeout: Duration,
    ) -> Result<AbortAck> {
        let _handshake = self.handshake.lock().await;

        let mut state_rx = self.state_tx.subscribe();
        info!("requesting snapshot loop abort");
        self.abort.request();

        let acknowledged = timeout(ack_timeout, async {
            // The sender lives in `self`, so the channel outlives this wait
            let _ = state_rx.wait_for(|s| *s == SnapshotterState::Stopped).await;
            let cursor = self.cursor.lock().await;
            AbortAck {
                latest: self.chain_state.latest(),
                last_revision: cursor.last_revision,
            }
        })
        .await;
        self.abort.finish_waiting();

        match acknowledged {
            Ok(ack) => {
                info!("snapshot loop stopped at revision {}", ack.last_revision);
                Ok(ack)
            }
            Err(_) => {
                error!(
                    "snapshot loop did not acknowledge abort within {:?}; forcing cancellation",
                    ack_timeout
                );
                self.abort.force();
                Err(SnapshotError::ShutdownTimeout(ack_timeout).into())
            }
        }
    }
}
