//! Snapshot lifecycle core.
//!
//! - [`Snapshotter`]: full/delta scheduling loop and on-demand triggers
//! - [`GarbageCollector`]: retention policy enforcement
//! - [`Coordinator`]: composition root owning both background tasks and the
//!   control surface
//! - [`ChainState`]: the published "latest snapshots" cursor shared between them

mod chain_state;
mod coordinator;
mod gc;
mod handshake;
mod snapshotter;

pub use chain_state::*;
pub use coordinator::*;
pub use gc::*;
pub use handshake::*;
pub use snapshotter::*;
