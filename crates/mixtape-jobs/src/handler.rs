use async_trait::async_trait;
use mixtape_core::{JobError, JobParams, JobReport, JobType, PlaylistGateway, Schedule, SnapshotCause};
use mixtape_snapshots::SnapshotStore;
use tracing::warn;

/// One job type's implementation, registered in the executor's lookup table.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Run the job for `schedule`. `params` were already parsed for
    /// [`JobHandler::job_type`].
    async fn execute(&self, schedule: &Schedule, params: JobParams) -> Result<JobReport, JobError>;
}

/// Ordered item ids of a collection, mapping `NotFound` to `CollectionNotFound`.
pub(crate) async fn list_ids(
    gateway: &dyn PlaylistGateway,
    collection_id: &str,
) -> Result<Vec<String>, JobError> {
    let items = gateway
        .list_items(collection_id)
        .await
        .map_err(|e| JobError::from_gateway(e, collection_id))?;
    Ok(items.into_iter().map(|i| i.id).collect())
}

/// Capture a snapshot right before a destructive call.
///
/// Never fails the job: a capture error is logged and `None` returned.
pub(crate) fn snapshot_best_effort(
    snapshots: &SnapshotStore,
    schedule: &Schedule,
    collection_id: &str,
    collection_name: &str,
    item_ids: &[String],
    cause: SnapshotCause,
) -> Option<String> {
    let note = format!("schedule {}", schedule.id);
    match snapshots.capture(
        &schedule.owner_id,
        collection_id,
        collection_name,
        item_ids,
        cause,
        Some(&note),
    ) {
        Ok(snapshot) => Some(snapshot.id),
        Err(e) => {
            warn!(
                schedule_id = %schedule.id,
                collection = %collection_id,
                error = %e,
                "snapshot capture failed, continuing"
            );
            None
        }
    }
}

/// Parameters of the wrong variant reaching a handler.
pub(crate) fn mismatched(expected: JobType, got: &JobParams) -> JobError {
    JobError::Config(format!("{expected} handler received {got:?}"))
}
