use thiserror::Error;

/// Failure fetching a public page representation.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
}

#[derive(Debug, Error)]
pub enum SourceStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("source not found: {id}")]
    NotFound { id: String },

    #[error("invalid source: {0}")]
    Invalid(String),

    #[error("source store lock poisoned")]
    Poisoned,
}
