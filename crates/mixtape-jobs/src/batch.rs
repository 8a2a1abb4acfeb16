//! Mutations split to the gateway's per-call item limit.

use mixtape_core::{GatewayError, PlaylistGateway};
use tracing::debug;

fn chunk_size(gateway: &dyn PlaylistGateway) -> usize {
    gateway.batch_limit().max(1)
}

/// Append `ids` in order, one call per chunk.
pub async fn add_batched(
    gateway: &dyn PlaylistGateway,
    collection_id: &str,
    ids: &[String],
) -> Result<(), GatewayError> {
    for chunk in ids.chunks(chunk_size(gateway)) {
        gateway.add_items(collection_id, chunk).await?;
    }
    debug!(collection = %collection_id, items = ids.len(), "items added");
    Ok(())
}

pub async fn remove_batched(
    gateway: &dyn PlaylistGateway,
    collection_id: &str,
    ids: &[String],
) -> Result<(), GatewayError> {
    for chunk in ids.chunks(chunk_size(gateway)) {
        gateway.remove_items(collection_id, chunk).await?;
    }
    debug!(collection = %collection_id, items = ids.len(), "items removed");
    Ok(())
}

/// Overwrite the collection: replace with the first chunk, append the rest.
///
/// An empty `ids` clears the collection.
pub async fn replace_batched(
    gateway: &dyn PlaylistGateway,
    collection_id: &str,
    ids: &[String],
) -> Result<(), GatewayError> {
    let size = chunk_size(gateway);
    let (head, tail) = ids.split_at(ids.len().min(size));
    gateway.replace_items(collection_id, head).await?;
    add_batched(gateway, collection_id, tail).await
}
