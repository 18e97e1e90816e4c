use std::future::pending;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval_at;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::capture::requires_new_chain;
use super::ChainCursor;
use super::Snapshotter;
use super::SnapshotterState;
use crate::latest_chain;
use crate::utils::time::duration_until;
use crate::Result;
use crate::Snapshot;
use crate::SnapshotError;
use crate::SnapshotKind;

/// Marks the loop as running for its lifetime; reports `Stopped` on every exit path.
struct RunGuard<'a> {
    snapshotter: &'a Snapshotter,
}

impl<'a> RunGuard<'a> {
    fn acquire(snapshotter: &'a Snapshotter) -> Result<Self> {
        snapshotter
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SnapshotError::AlreadyRunning)?;
        Ok(Self { snapshotter })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.snapshotter.set_state(SnapshotterState::Stopped);
        self.snapshotter.running.store(false, Ordering::Release);
    }
}

impl Snapshotter {
    /// Runs the snapshot loop until `shutdown` fires or an abort is requested.
    ///
    /// Anchors the chain first: resumes the latest valid chain from the snapshot
    /// store, or takes a full snapshot when `start_with_full_snapshot` is set or
    /// nothing can be resumed. Failing to anchor the chain is returned as an error.
    /// Capture failures inside the loop are logged and retried on the next timer
    /// fire.
    pub async fn run(
        &self,
        shutdown: CancellationToken,
        start_with_full_snapshot: bool,
    ) -> Result<()> {
        let _guard = RunGuard::acquire(self)?;
        self.set_state(SnapshotterState::Idle);
        if self.abort.is_requested() {
            info!("abort already requested; snapshot loop not started");
            return Ok(());
        }

        if let Err(e) = self.prepare_chain(&shutdown, start_with_full_snapshot).await {
            if self.abort.is_requested() {
                return self.handle_abort().await;
            }
            if shutdown.is_cancelled() {
                return Ok(());
            }
            error!("failed to anchor the snapshot chain: {:?}", e);
            return Err(e);
        }

        let delta_period = self.config.delta_snapshot_period();
        let mut delta_timer = delta_period.map(periodic_timer);
        let mut watch_timer = delta_period.map(|_| periodic_timer(self.config.delta_watch_interval()));
        let mut next_full = self.schedule.next_after(Utc::now());
        info!(
            "snapshot loop started: full schedule {:?}, delta period {:?}, next full at {:?}",
            self.schedule.expression(),
            delta_period,
            next_full
        );

        loop {
            let full_due = next_full.map(|t| Instant::now() + duration_until(t, Utc::now()));

            tokio::select! {
                biased;
                // P0: shutdown received
                _ = shutdown.cancelled() => {
                    info!("snapshot loop shutting down");
                    return Ok(());
                }

                // P1: abort handshake
                _ = self.abort.requested() => {
                    return self.handle_abort().await;
                }

                _ = sleep_until_opt(full_due) => {
                    debug!("full snapshot timer fired");
                    if self.capture_in_loop(SnapshotKind::Full, &shutdown).await.is_some() {
                        reset_timer(&mut delta_timer);
                    }
                    next_full = self.schedule.next_after(Utc::now());
                }

                _ = tick_opt(&mut delta_timer) => {
                    trace!("delta snapshot timer fired");
                    if let Some(snapshot) = self.capture_in_loop(SnapshotKind::Delta, &shutdown).await {
                        if snapshot.is_full() {
                            reset_timer(&mut delta_timer);
                        }
                    }
                }

                _ = tick_opt(&mut watch_timer) => {
                    if self.watch_changes(&shutdown).await.is_some() {
                        reset_timer(&mut delta_timer);
                    }
                }
            }
        }
    }

    async fn prepare_chain(
        &self,
        shutdown: &CancellationToken,
        start_with_full_snapshot: bool,
    ) -> Result<()> {
        let mut cursor = self.lock_cursor(None).await?;
        if !start_with_full_snapshot {
            match self.resume_latest_chain(&mut cursor, shutdown).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => warn!("could not resume the latest snapshot chain: {:?}", e),
            }
        }

        self.set_state(SnapshotterState::Capturing);
        self.capture_full(&mut cursor, shutdown, None, false).await?;
        self.set_state(SnapshotterState::Idle);
        Ok(())
    }

    /// Points the cursor at the latest chain in the snapshot store, if that chain
    /// is gap free, not overdue for a scheduled full snapshot, and still reachable
    /// through the store's change history.
    async fn resume_latest_chain(
        &self,
        cursor: &mut ChainCursor,
        shutdown: &CancellationToken,
    ) -> Result<bool> {
        let snapshots = self.store.list().await?;
        let Some(chain) = latest_chain(&snapshots) else {
            info!("no snapshot chain to resume");
            return Ok(false);
        };
        if let Err(e) = chain.validate() {
            warn!("latest chain {} can not be extended: {}", chain.chain_dir(), e);
            return Ok(false);
        }
        if self.schedule.missed_since(chain.created_on(), Utc::now()) {
            info!(
                "a scheduled full snapshot was missed since chain {}; starting a new chain",
                chain.chain_dir()
            );
            return Ok(false);
        }

        cursor.full = Some(chain.full.clone());
        cursor.last_revision = chain.last_revision();
        cursor.buffer.reset_to(cursor.last_revision);
        if let Err(e) = self.fill_buffer(cursor, shutdown, None).await {
            if requires_new_chain(&e) {
                // Keep the stale base so the next chain is named strictly after it
                cursor.buffer.reset_to(cursor.last_revision);
                info!("chain {} can not be extended: {}", chain.chain_dir(), e);
                return Ok(false);
            }
            *cursor = ChainCursor::default();
            return Err(e);
        }

        self.chain_state.resume(&chain);
        info!(
            "resumed snapshot chain {} at revision {}",
            chain.chain_dir(),
            chain.last_revision()
        );
        Ok(true)
    }

    /// One timer-driven capture. Failures are absorbed; the next timer fire retries.
    ///
    /// Returns the persisted snapshot, which is a full one when the chain had to be
    /// restarted.
    async fn capture_in_loop(
        &self,
        kind: SnapshotKind,
        shutdown: &CancellationToken,
    ) -> Option<Snapshot> {
        // Busy: an abort is pending and the next select iteration picks it up
        let mut cursor = self.lock_cursor(None).await.ok()?;
        self.set_state(SnapshotterState::Capturing);

        let result = match kind {
            SnapshotKind::Full => self.capture_full(&mut cursor, shutdown, None, false).await,
            SnapshotKind::Delta => self.capture_delta(&mut cursor, shutdown, None).await,
        };
        let result = match result {
            Err(e) if kind == SnapshotKind::Delta && requires_new_chain(&e) => {
                warn!("{}; starting a new chain", e);
                self.capture_full(&mut cursor, shutdown, None, false).await
            }
            other => other,
        };

        match result {
            Ok(snapshot) => {
                self.set_state(SnapshotterState::Idle);
                Some(snapshot)
            }
            Err(e) if e.is_empty_delta() => {
                trace!("no changes since last snapshot");
                self.set_state(SnapshotterState::Idle);
                None
            }
            Err(e) => {
                warn!("{} snapshot failed, retrying on next trigger: {}", kind, e);
                self.set_state(SnapshotterState::Failed);
                None
            }
        }
    }

    /// Pulls pending changes and flushes them early once the buffer reaches the
    /// memory limit.
    async fn watch_changes(
        &self,
        shutdown: &CancellationToken,
    ) -> Option<Snapshot> {
        let mut cursor = self.lock_cursor(None).await.ok()?;
        cursor.full.as_ref()?;
        // Reading the change stream is store I/O: report it as a capture
        self.set_state(SnapshotterState::Capturing);
        if let Err(e) = self.fill_buffer(&mut cursor, shutdown, None).await {
            debug!("watching store changes failed: {}", e);
            self.set_state(SnapshotterState::Failed);
            return None;
        }
        if cursor.buffer.bytes < self.config.delta_snapshot_memory_limit {
            self.set_state(SnapshotterState::Idle);
            return None;
        }

        info!(
            "delta buffer holds {} bytes (limit {}); flushing early",
            cursor.buffer.bytes, self.config.delta_snapshot_memory_limit
        );
        match self.capture_delta(&mut cursor, shutdown, None).await {
            Ok(snapshot) => {
                self.set_state(SnapshotterState::Idle);
                Some(snapshot)
            }
            Err(e) => {
                warn!("early delta flush failed: {}", e);
                self.set_state(SnapshotterState::Failed);
                None
            }
        }
    }

    /// Flushes pending changes into a last delta, then reports `Stopped`.
    async fn handle_abort(&self) -> Result<()> {
        info!("abort requested; stopping snapshot loop");
        self.set_state(SnapshotterState::Aborting);

        let mut cursor = self.cursor.lock().await;
        if cursor.full.is_some() && self.config.delta_snapshots_enabled() && !self.abort.is_forced() {
            let cancel = self.abort.force_token();
            match self.capture_delta(&mut cursor, &cancel, None).await {
                Ok(snapshot) => info!("flushed pending changes into {}", snapshot),
                Err(e) if e.is_empty_delta() => debug!("nothing to flush before stopping"),
                Err(e) => warn!("could not flush pending changes before stopping: {}", e),
            }
        }
        drop(cursor);

        self.set_state(SnapshotterState::Stopped);
        Ok(())
    }
}

/// Behavior: If ticks are missed, the timer waits for the next tick instead of
/// firing immediately. The first tick fires one period from now.
fn periodic_timer(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn reset_timer(timer: &mut Option<Interval>) {
    if let Some(timer) = timer.as_mut() {
        timer.reset();
    }
}

async fn tick_opt(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}
