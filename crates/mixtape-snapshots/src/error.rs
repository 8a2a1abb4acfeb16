use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Also returned when the snapshot exists but belongs to another owner.
    #[error("snapshot not found: {id}")]
    NotFound { id: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("snapshot store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
