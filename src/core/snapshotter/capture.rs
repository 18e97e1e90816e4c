use std::future::Future;

use chrono::Utc;
use futures::future;
use futures::TryStreamExt;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use super::ChainCursor;
use super::Snapshotter;
use crate::encode_changes;
use crate::metrics;
use crate::metrics::DELTA_BUFFER_BYTES;
use crate::seal_payload;
use crate::utils::time::strictly_after;
use crate::CaptureError;
use crate::ChangeRecord;
use crate::ClientError;
use crate::Error;
use crate::Result;
use crate::Snapshot;
use crate::SnapshotError;
use crate::SnapshotKind;

impl Snapshotter {
    /// Dumps the store and starts a new chain. Caller holds the cursor lock.
    pub(super) async fn capture_full(
        &self,
        cursor: &mut ChainCursor,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        is_final: bool,
    ) -> Result<Snapshot> {
        let started = std::time::Instant::now();
        let result = self.do_capture_full(cursor, cancel, deadline, is_final).await;
        observe(SnapshotKind::Full, started, &result);
        result
    }

    /// Persists buffered and newly read changes as the next delta of the chain.
    /// Caller holds the cursor lock.
    pub(super) async fn capture_delta(
        &self,
        cursor: &mut ChainCursor,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Snapshot> {
        let started = std::time::Instant::now();
        let result = self.do_capture_delta(cursor, cancel, deadline).await;
        observe(SnapshotKind::Delta, started, &result);
        result
    }

    async fn do_capture_full(
        &self,
        cursor: &mut ChainCursor,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        is_final: bool,
    ) -> Result<Snapshot> {
        let dump = self.guarded(cancel, deadline, self.client.full_dump(cancel)).await?;
        if cursor.full.is_some() && dump.revision < cursor.last_revision {
            info!(
                "store revision {} is behind chain revision {}; starting a new chain",
                dump.revision, cursor.last_revision
            );
        }

        let previous_chain = cursor.full.as_ref().map(|f| f.chain_created_on);
        let snapshot = Snapshot::full(dump.revision, strictly_after(previous_chain, Utc::now()))
            .with_compression(self.config.compression_enabled)
            .with_final(is_final);
        let payload = seal_payload(&snapshot, dump.data).map_err(|e| CaptureError::Encode(e.to_string()))?;
        self.persist(&snapshot, payload).await?;

        // Persisted: advance the cursor
        cursor.full = Some(snapshot.clone());
        cursor.last_revision = snapshot.last_revision;
        cursor.buffer.reset_to(snapshot.last_revision);
        DELTA_BUFFER_BYTES.set(0);

        self.chain_state.publish_full(snapshot.clone());
        if snapshot.is_final {
            self.chain_state.pin(&snapshot);
        }
        info!("took full snapshot {}", snapshot);
        Ok(snapshot)
    }

    async fn do_capture_delta(
        &self,
        cursor: &mut ChainCursor,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Snapshot> {
        let base = cursor.full.clone().ok_or(SnapshotError::NoBaseSnapshot)?;
        self.fill_buffer(cursor, cancel, deadline).await?;
        if cursor.buffer.is_empty() {
            return Err(SnapshotError::EmptyDelta {
                revision: cursor.last_revision,
            }
            .into());
        }

        let start_revision = cursor.last_revision + 1;
        let last_revision = cursor.buffer.buffered_revision;
        let snapshot = Snapshot::delta(&base, start_revision, last_revision, Utc::now())
            .with_compression(self.config.compression_enabled);
        let payload = encode_changes(&cursor.buffer.records)
            .and_then(|data| seal_payload(&snapshot, data))
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        self.persist(&snapshot, payload).await?;
        let change_count = cursor.buffer.records.len();

        // Persisted: advance the cursor
        cursor.last_revision = last_revision;
        cursor.buffer.reset_to(last_revision);
        DELTA_BUFFER_BYTES.set(0);

        self.chain_state.publish_delta(snapshot.clone());
        info!("took delta snapshot {} ({} changes)", snapshot, change_count);
        Ok(snapshot)
    }

    /// Reads every change committed since the buffer's high-water mark, up to the
    /// store revision observed when the read started.
    pub(super) async fn fill_buffer(
        &self,
        cursor: &mut ChainCursor,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let from_revision = cursor.buffer.buffered_revision + 1;
        let read = async {
            let batch = self.client.changes_since(cancel, from_revision).await?;
            let bound_revision = batch.bound_revision;
            let records: Vec<ChangeRecord> = batch
                .changes
                .try_filter(|r| future::ready(r.revision >= from_revision && r.revision <= bound_revision))
                .try_collect()
                .await?;
            Ok::<_, Error>((records, bound_revision))
        };
        let (records, bound_revision) = self.guarded(cancel, deadline, read).await?;

        if bound_revision < cursor.buffer.buffered_revision {
            return Err(CaptureError::RevisionRegressed {
                chain_revision: cursor.buffer.buffered_revision,
                store_revision: bound_revision,
            }
            .into());
        }
        if !records.is_empty() {
            debug!(
                "buffered {} changes up to revision {}",
                records.len(),
                bound_revision
            );
        }
        cursor.buffer.extend(records, bound_revision);
        DELTA_BUFFER_BYTES.set(cursor.buffer.bytes as i64);
        Ok(())
    }

    /// Bounds a store client call by the connection timeout (and `deadline`), and
    /// drops it as soon as `cancel` or a forced abort fires.
    async fn guarded<T, F>(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut until = started + self.config.store_connection_timeout();
        if let Some(deadline) = deadline {
            until = until.min(deadline);
        }
        let force = self.abort.force_token();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CaptureError::Cancelled.into()),
            _ = force.cancelled() => return Err(CaptureError::Cancelled.into()),
            outcome = timeout_at(until, call) => outcome,
        };
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(Error::Client(e))) => Err(CaptureError::Client(e).into()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::Timeout(started.elapsed()).into()),
        }
    }

    async fn persist(
        &self,
        snapshot: &Snapshot,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.store.save(snapshot, payload).await.map_err(|e| {
            SnapshotError::Persist {
                key: snapshot.key(),
                source: e.into_storage_error(),
            }
            .into()
        })
    }
}

/// Failures meaning the current chain can't be extended any further.
pub(super) fn requires_new_chain(e: &Error) -> bool {
    matches!(
        e,
        Error::Snapshot(SnapshotError::Capture(
            CaptureError::RevisionRegressed { .. } | CaptureError::Client(ClientError::Compacted { .. })
        ))
    )
}

fn observe(
    kind: SnapshotKind,
    started: std::time::Instant,
    result: &Result<Snapshot>,
) {
    match result {
        Ok(snapshot) => metrics::observe_capture_success(snapshot, started.elapsed()),
        Err(e) if e.is_empty_delta() || e.is_busy() => {}
        Err(_) => metrics::observe_capture_failure(kind),
    }
}
