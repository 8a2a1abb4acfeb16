use thiserror::Error;

#[derive(Debug, Error)]
pub enum MixtapeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MixtapeError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            MixtapeError::Config(_) => "CONFIG_ERROR",
            MixtapeError::Database(_) => "DATABASE_ERROR",
            MixtapeError::NotFound { .. } => "NOT_FOUND",
            MixtapeError::InvalidValue { .. } => "INVALID_VALUE",
            MixtapeError::Serialization(_) => "SERIALIZATION_ERROR",
            MixtapeError::Io(_) => "IO_ERROR",
            MixtapeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, MixtapeError>;
