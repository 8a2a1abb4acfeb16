use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mixtape_core::{
    ArchiveLookup, JobError, JobOutcome, JobParams, JobRunner, JobType, PlaylistGateway, Schedule,
};
use mixtape_resolver::{SourceResolver, SourceStore};
use mixtape_snapshots::SnapshotStore;
use tracing::{info, instrument, warn};

use crate::algorithm::AlgorithmRegistry;
use crate::handler::JobHandler;
use crate::raid::RaidHandler;
use crate::reshuffle::ReshuffleHandler;
use crate::rotate::RotateHandler;

/// Dispatches a schedule to the handler registered for its job type.
pub struct JobExecutor {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Build from an explicit handler list. A later handler for the same job
    /// type replaces an earlier one.
    pub fn new(handlers: Vec<Arc<dyn JobHandler>>) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.job_type(), h)).collect();
        Self { handlers }
    }

    /// The three built-in handlers over shared collaborators.
    pub fn standard(
        gateway: Arc<dyn PlaylistGateway>,
        snapshots: Arc<SnapshotStore>,
        sources: Arc<SourceStore>,
        resolver: Arc<SourceResolver>,
        archives: Arc<dyn ArchiveLookup>,
        algorithms: AlgorithmRegistry,
    ) -> Self {
        let handlers: Vec<Arc<dyn JobHandler>> = vec![
            Arc::new(ReshuffleHandler::new(
                Arc::clone(&gateway),
                Arc::clone(&snapshots),
                algorithms,
            )),
            Arc::new(RaidHandler::new(
                Arc::clone(&gateway),
                Arc::clone(&snapshots),
                sources,
                resolver,
            )),
            Arc::new(RotateHandler::new(gateway, snapshots, archives)),
        ];
        Self::new(handlers)
    }

    pub fn supports(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    async fn dispatch(&self, schedule: &Schedule) -> Result<mixtape_core::JobReport, JobError> {
        let params = JobParams::for_schedule(schedule)?;
        let handler = self.handlers.get(&schedule.job_type).ok_or_else(|| {
            JobError::Config(format!("no handler registered for {}", schedule.job_type))
        })?;
        handler.execute(schedule, params).await
    }
}

#[async_trait]
impl JobRunner for JobExecutor {
    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id, job_type = %schedule.job_type, target = %schedule.target_id))]
    async fn run(&self, schedule: &Schedule) -> JobOutcome {
        let started_at = Utc::now();
        info!("job started");
        let result = self.dispatch(schedule).await;
        let finished_at = Utc::now();

        match &result {
            Ok(report) => info!(
                added = report.added,
                removed = report.removed,
                items = report.items_after,
                elapsed_ms = (finished_at - started_at).num_milliseconds(),
                "job succeeded"
            ),
            Err(e) => warn!(
                code = e.code(),
                retryable = e.is_retryable(),
                error = %e,
                "job failed"
            ),
        }

        JobOutcome {
            schedule_id: schedule.id.clone(),
            started_at,
            finished_at,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixtape_core::ExecutionStatus;
    use serde_json::json;

    use crate::testing::Fixture;

    #[tokio::test]
    async fn dispatches_by_job_type() {
        let fx = Fixture::new();
        fx.gateway.set_items("mix", &["a", "b", "c"]);
        let executor = fx.executor();
        assert!(JobType::ALL.iter().all(|t| executor.supports(*t)));

        let schedule = fx.schedule(JobType::Reshuffle, "mix", json!({"algorithm": "reverse"}));
        let outcome = executor.run(&schedule).await;
        assert!(outcome.is_success());
        assert_eq!(fx.gateway.items("mix"), vec!["c", "b", "a"]);
        assert!(outcome.finished_at >= outcome.started_at);
    }

    #[tokio::test]
    async fn invalid_params_become_failed_outcome() {
        let fx = Fixture::new();
        let schedule = fx.schedule(JobType::Rotate, "mix", json!({"algorithm": "random"}));

        let outcome = fx.executor().run(&schedule).await;
        let exec = outcome.to_execution();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_code.as_deref(), Some("CONFIG_ERROR"));
        assert!(fx.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_handler_is_config_error() {
        let fx = Fixture::new();
        let only_reshuffle: Vec<Arc<dyn JobHandler>> = vec![Arc::new(fx.reshuffle())];
        let executor = JobExecutor::new(only_reshuffle);
        let schedule = fx.schedule(JobType::Raid, "mix", json!(null));

        let outcome = executor.run(&schedule).await;
        assert!(matches!(outcome.result, Err(JobError::Config(_))));
    }

    #[tokio::test]
    async fn success_report_is_persistable() {
        let fx = Fixture::new();
        fx.gateway.set_items("mix", &[] as &[&str]);
        let schedule = fx.schedule(JobType::Reshuffle, "mix", json!({"algorithm": "random"}));

        let exec = fx.executor().run(&schedule).await.to_execution();
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.result["added"], json!(0));
        assert_eq!(exec.result["job_type"], json!("reshuffle"));
    }
}
