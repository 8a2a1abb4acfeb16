use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A recurrence that cannot be evaluated (e.g. malformed cron expression).
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No schedule with the given ID exists in the store.
    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("schedule store lock poisoned")]
    Poisoned,

    /// The worker pool was closed while a run was waiting for a slot.
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
