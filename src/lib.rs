//! Snapshot lifecycle coordinator for key-value store backup and restore.
//!
//! - [`Snapshotter`] captures full snapshots on a cron schedule and delta snapshots
//!   on a period or when buffered changes reach a memory limit
//! - [`GarbageCollector`] retires old chains under a [`RetentionPolicy`]
//! - [`Coordinator`] owns both background tasks and the control surface, including
//!   the abort handshake that precedes a restore
//! - [`Restorer`] rebuilds store state from the latest snapshot chain

mod client;
mod config;
mod constants;
mod core;
mod errors;
pub mod metrics;
mod restore;
mod snapshot;
mod storage;
mod utils;

pub use self::core::*;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use restore::*;
pub use snapshot::*;
pub use storage::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
