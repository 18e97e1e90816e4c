//! Snapshot Lifecycle Error Hierarchy
//!
//! Defines error types for the backup coordinator, categorized by the layer that
//! produced them: capture (store client), persistence (snapshot store), scheduling
//! policy, retention and restore.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::SnapshotKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Snapshot production and scheduling failures
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Snapshot store backend failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Key-value store client failures outside of a capture
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Garbage collection deletion failure
    #[error(transparent)]
    Deletion(#[from] DeletionError),

    /// Chain reconstruction failures
    #[error(transparent)]
    Restore(#[from] RestoreError),

    /// Control surface called while no snapshotter is installed
    #[error("Snapshotter is not configured")]
    SnapshotterNotConfigured,

    /// A data initialization is running, or its outcome has not been read yet
    #[error("Initialization in progress or its outcome not yet read")]
    InitializationInProgress,

    /// External initializer failure
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Store client or serialization failure while capturing
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Snapshot store write failure. The chain cursor is not advanced.
    #[error("Failed to persist snapshot {key}: {source}")]
    Persist {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Delta requested before any full snapshot anchors the chain
    #[error("No full snapshot found to base the delta snapshot on")]
    NoBaseSnapshot,

    /// Nothing changed since the last persisted artifact
    #[error("No changes since revision {revision}")]
    EmptyDelta { revision: u64 },

    /// An abort handshake is in progress or completed on this snapshotter
    #[error("Snapshotter is busy aborting")]
    Busy,

    #[error("Delta snapshots are disabled")]
    DeltaSnapshotsDisabled,

    /// A second snapshot loop was started on the same snapshotter
    #[error("Snapshot loop is already running")]
    AlreadyRunning,

    /// The snapshot loop did not acknowledge an abort request in time
    #[error("Snapshotter did not acknowledge abort within {0:?}")]
    ShutdownTimeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Store client failure: {0}")]
    Client(#[from] ClientError),

    #[error("Failed to encode snapshot payload: {0}")]
    Encode(String),

    #[error("Capture cancelled")]
    Cancelled,

    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),

    /// The store reports a revision older than the chain cursor
    #[error("Store revision {store_revision} is behind chain revision {chain_revision}")]
    RevisionRegressed {
        chain_revision: u64,
        store_revision: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Endpoint unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Requested history was compacted away
    #[error("Revision {requested} has been compacted (compact revision: {compact_revision})")]
    Compacted {
        requested: u64,
        compact_revision: u64,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Malformed store data: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during snapshot operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization failures for persisted payloads
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Key does not follow the snapshot naming layout
    #[error("Invalid snapshot key: {0}")]
    InvalidSnapshotKey(String),

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Backend specific failure
    #[error("Snapshot store error: {0}")]
    Backend(String),
}

/// GC failed to remove one eligible snapshot. Never fatal to the GC loop.
#[derive(Debug, thiserror::Error)]
#[error("Failed to delete snapshot {key}: {source}")]
pub struct DeletionError {
    pub key: String,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("No full snapshot found in the snapshot store")]
    NoSnapshotFound,

    /// Chain has a revision gap between two artifacts
    #[error("Chain gap after revision {previous_revision}: next {kind} snapshot starts at {next_start}")]
    ChainGap {
        previous_revision: u64,
        next_start: u64,
        kind: SnapshotKind,
    },

    /// Delta payload holds a change outside of its declared range
    #[error("Change at revision {revision} is outside of snapshot {key}")]
    RevisionOutOfRange { key: String, revision: u64 },

    #[error("Restore target rejected data: {0}")]
    Target(String),
}

impl Error {
    /// Policy-level condition rather than a fault.
    pub fn is_empty_delta(&self) -> bool {
        matches!(self, Error::Snapshot(SnapshotError::EmptyDelta { .. }))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Snapshot(SnapshotError::Busy))
    }

    /// Snapshot store failure carried by this error, or a backend error wrapping it.
    pub(crate) fn into_storage_error(self) -> StorageError {
        match self {
            Error::Storage(e) => e,
            other => StorageError::Backend(other.to_string()),
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        Error::Snapshot(SnapshotError::Capture(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Storage(StorageError::BincodeError(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(StorageError::IoError(e))
    }
}
