//! `mixtape-jobs`: the three playlist automations and their dispatcher.
//!
//! [`JobExecutor`] looks the schedule's job type up in a handler table and
//! folds whatever happens into a [`JobOutcome`](mixtape_core::JobOutcome):
//!
//! | Job         | Handler            | Mutations                               |
//! |-------------|--------------------|-----------------------------------------|
//! | `reshuffle` | [`ReshuffleHandler`] | replace target ordering               |
//! | `raid`      | [`RaidHandler`]      | append resolved items to target       |
//! | `rotate`    | [`RotateHandler`]    | move items between target and archive |
//!
//! Every destructive call is preceded by a best-effort snapshot and every
//! mutating call is split to the gateway's batch limit.

pub mod algorithm;
pub mod archive;
pub mod batch;
pub mod error;
pub mod executor;
pub mod handler;
pub mod raid;
pub mod reshuffle;
pub mod restore;
pub mod rotate;

#[cfg(test)]
pub(crate) mod testing;

pub use algorithm::{AlgorithmRegistry, Reorder};
pub use archive::ArchivePairs;
pub use error::RestoreError;
pub use executor::JobExecutor;
pub use handler::JobHandler;
pub use raid::RaidHandler;
pub use reshuffle::ReshuffleHandler;
pub use restore::{RestoreReport, RestoreTarget, SnapshotRestorer};
pub use rotate::{effective_count, RotateHandler};
