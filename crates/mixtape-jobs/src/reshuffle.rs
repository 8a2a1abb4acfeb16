use std::sync::Arc;

use async_trait::async_trait;
use mixtape_core::{JobError, JobParams, JobReport, JobType, PlaylistGateway, Schedule, SnapshotCause};
use mixtape_snapshots::SnapshotStore;
use tracing::{debug, info};

use crate::algorithm::AlgorithmRegistry;
use crate::batch::replace_batched;
use crate::handler::{list_ids, mismatched, snapshot_best_effort, JobHandler};

/// Reorders the target with a named algorithm.
pub struct ReshuffleHandler {
    gateway: Arc<dyn PlaylistGateway>,
    snapshots: Arc<SnapshotStore>,
    algorithms: AlgorithmRegistry,
}

impl ReshuffleHandler {
    pub fn new(
        gateway: Arc<dyn PlaylistGateway>,
        snapshots: Arc<SnapshotStore>,
        algorithms: AlgorithmRegistry,
    ) -> Self {
        Self {
            gateway,
            snapshots,
            algorithms,
        }
    }
}

#[async_trait]
impl JobHandler for ReshuffleHandler {
    fn job_type(&self) -> JobType {
        JobType::Reshuffle
    }

    async fn execute(&self, schedule: &Schedule, params: JobParams) -> Result<JobReport, JobError> {
        let params = match params {
            JobParams::Reshuffle(p) => p,
            other => return Err(mismatched(JobType::Reshuffle, &other)),
        };
        let algorithm = self.algorithms.get(&params.algorithm).ok_or_else(|| {
            JobError::Config(format!(
                "unknown reshuffle algorithm '{}' (known: {})",
                params.algorithm,
                self.algorithms.names().join(", ")
            ))
        })?;

        let target = &schedule.target_id;
        let items = list_ids(self.gateway.as_ref(), target).await?;
        if items.is_empty() {
            debug!(schedule_id = %schedule.id, "target empty, nothing to reshuffle");
            return Ok(JobReport::no_op(JobType::Reshuffle, 0, "collection is empty"));
        }

        let snapshot_id = snapshot_best_effort(
            &self.snapshots,
            schedule,
            target,
            &schedule.target_name,
            &items,
            SnapshotCause::PreReshuffle,
        );

        let count = items.len();
        let reordered = algorithm.reorder(items, &params.options);
        replace_batched(self.gateway.as_ref(), target, &reordered)
            .await
            .map_err(|e| JobError::from_gateway(e, target))?;

        info!(schedule_id = %schedule.id, algorithm = %params.algorithm, items = count, "target reshuffled");
        Ok(JobReport {
            job_type: JobType::Reshuffle,
            items_before: count,
            items_after: reordered.len(),
            added: 0,
            removed: 0,
            snapshot_ids: snapshot_id.into_iter().collect(),
            sources: Vec::new(),
            detail: Some(format!("algorithm {}", params.algorithm)),
        })
    }
}
