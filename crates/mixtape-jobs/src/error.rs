use mixtape_core::JobError;
use mixtape_snapshots::SnapshotError;
use thiserror::Error;

/// Failure applying a stored snapshot back to the remote API.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Job(#[from] JobError),
}

pub type Result<T> = std::result::Result<T, RestoreError>;
