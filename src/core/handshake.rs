//! Abort handshake primitives.
//!
//! The controller side raises a one-shot request token and then waits for the
//! snapshot loop to report `Stopped`. If the acknowledgment does not arrive in
//! time, the force token cancels in-flight store client calls.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::LatestSnapshots;

/// What the controller learns once the snapshot loop has stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortAck {
    /// Chain state at the moment of acknowledgment; every listed artifact is
    /// fully persisted
    pub latest: LatestSnapshots,
    /// Last store revision covered by the chain
    pub last_revision: u64,
}

#[derive(Debug, Default)]
pub(crate) struct AbortSignal {
    request: CancellationToken,
    force: CancellationToken,
    waiting: AtomicBool,
}

impl AbortSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request(&self) {
        self.waiting.store(true, Ordering::Release);
        self.request.cancel();
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.request.is_cancelled()
    }

    /// Resolves once an abort was requested
    pub(crate) async fn requested(&self) {
        self.request.cancelled().await
    }

    /// Whether a controller is currently blocked on the acknowledgment
    pub(crate) fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    pub(crate) fn finish_waiting(&self) {
        self.waiting.store(false, Ordering::Release);
    }

    pub(crate) fn force(&self) {
        self.force.cancel();
    }

    pub(crate) fn is_forced(&self) -> bool {
        self.force.is_cancelled()
    }

    /// Token handed to store client calls so a forced abort interrupts them
    pub(crate) fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }
}
