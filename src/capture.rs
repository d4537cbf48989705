//! Capture subsystem
//!
//! This module turns OS connection-table state into a deduplicated stream of
//! discrete connection events.
//!
//! Components:
//! - `types`: the event and endpoint types flowing through the pipeline.
//! - `snapshot`: the SnapshotSource trait and its procfs implementation.
//! - `deduplicator`: snapshot diffing, NEW emission and heartbeats.

pub mod deduplicator;
pub mod snapshot;
pub mod types;

pub use deduplicator::ConnectionDeduplicator;
pub use snapshot::{ProcfsSource, SnapshotSource};
pub use types::{ConnectionEvent, EndpointKey, NewConnection, SocketEntry, Transport};
