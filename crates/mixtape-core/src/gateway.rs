use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Documented per-call item limit of the remote API.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// One entry of a remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Item {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
        }
    }
}

/// Typed failures raised by the remote API client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Remote resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl GatewayError {
    pub fn not_found(resource: &str) -> Self {
        GatewayError::NotFound {
            resource: resource.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

/// Remote playlist API as seen by the automation subsystem.
///
/// Implementations own authentication, token refresh, pagination and
/// rate-limit backoff. Callers never retry in-process; they batch mutating
/// calls to [`PlaylistGateway::batch_limit`] themselves.
#[async_trait]
pub trait PlaylistGateway: Send + Sync {
    /// Full ordered contents of a collection.
    async fn list_items(&self, collection_id: &str) -> Result<Vec<Item>, GatewayError>;

    /// Overwrite the collection with exactly `item_ids` (at most `batch_limit`).
    async fn replace_items(&self, collection_id: &str, item_ids: &[String])
        -> Result<(), GatewayError>;

    /// Append `item_ids` to the end of the collection (at most `batch_limit`).
    async fn add_items(&self, collection_id: &str, item_ids: &[String]) -> Result<(), GatewayError>;

    /// Remove every occurrence of `item_ids` (at most `batch_limit`).
    async fn remove_items(&self, collection_id: &str, item_ids: &[String])
        -> Result<(), GatewayError>;

    /// Text search over the provider catalogue.
    async fn search(&self, query: &str, limit: usize, offset: usize)
        -> Result<Vec<Item>, GatewayError>;

    /// Create an empty collection owned by `owner_id`, returning its id.
    async fn create_collection(&self, owner_id: &str, name: &str) -> Result<String, GatewayError>;

    /// Maximum number of item ids accepted by a single mutating call.
    fn batch_limit(&self) -> usize {
        DEFAULT_BATCH_LIMIT
    }
}

/// Resolves the archive collection paired with a target collection.
#[async_trait]
pub trait ArchiveLookup: Send + Sync {
    /// `Ok(None)` when the owner has not paired an archive with `collection_id`.
    async fn archive_for(&self, owner_id: &str, collection_id: &str)
        -> crate::error::Result<Option<String>>;
}
