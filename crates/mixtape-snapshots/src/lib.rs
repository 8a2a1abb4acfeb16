//! `mixtape-snapshots`: point-in-time captures of collection orderings.
//!
//! Snapshots are written before every automated mutation and on demand.
//! Each (owner, collection) pair keeps at most `retention` records; older
//! ones are trimmed right after a new capture. Restoring only hands back the
//! stored item ids; applying them remotely is the caller's job.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, SnapshotError};
pub use store::SnapshotStore;
