use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mixtape_core::job::SourceReport;
use mixtape_core::{JobError, JobParams, JobReport, JobType, PlaylistGateway, Schedule, SnapshotCause};
use mixtape_resolver::{ResolvedSources, SourceResolver, SourceStore};
use mixtape_snapshots::SnapshotStore;
use tracing::{info, warn};

use crate::batch::add_batched;
use crate::handler::{list_ids, mismatched, snapshot_best_effort, JobHandler};

/// Appends new items from every source attached to the target.
pub struct RaidHandler {
    gateway: Arc<dyn PlaylistGateway>,
    snapshots: Arc<SnapshotStore>,
    sources: Arc<SourceStore>,
    resolver: Arc<SourceResolver>,
}

impl RaidHandler {
    pub fn new(
        gateway: Arc<dyn PlaylistGateway>,
        snapshots: Arc<SnapshotStore>,
        sources: Arc<SourceStore>,
        resolver: Arc<SourceResolver>,
    ) -> Self {
        Self {
            gateway,
            snapshots,
            sources,
            resolver,
        }
    }

    /// Write per-source bookkeeping; failures are logged only.
    fn record_bookkeeping(&self, resolved: &ResolvedSources) {
        let now = Utc::now();
        for entry in &resolved.per_source {
            if let Err(e) = self.sources.record_resolution(&entry.source_id, &entry.result, now) {
                warn!(source_id = %entry.source_id, error = %e, "source bookkeeping write failed");
            }
        }
    }
}

fn source_reports(resolved: &ResolvedSources) -> Vec<SourceReport> {
    resolved
        .per_source
        .iter()
        .map(|entry| SourceReport {
            source_id: entry.source_id.clone(),
            pathway: entry.result.pathway.clone(),
            status: entry.result.status_label().to_string(),
            found: entry.result.item_ids.len(),
            error: entry.result.error.clone(),
        })
        .collect()
}

#[async_trait]
impl JobHandler for RaidHandler {
    fn job_type(&self) -> JobType {
        JobType::Raid
    }

    async fn execute(&self, schedule: &Schedule, params: JobParams) -> Result<JobReport, JobError> {
        let params = match params {
            JobParams::Raid(p) => p,
            other => return Err(mismatched(JobType::Raid, &other)),
        };
        let target = &schedule.target_id;

        let existing = list_ids(self.gateway.as_ref(), target).await?;
        let sources = self
            .sources
            .list_for_target(&schedule.owner_id, target)
            .map_err(|e| JobError::Persistence(e.to_string()))?;
        if sources.is_empty() {
            warn!(schedule_id = %schedule.id, "raid has no sources configured");
            return Ok(JobReport::no_op(
                JobType::Raid,
                existing.len(),
                "no sources configured",
            ));
        }

        let snapshot_id = snapshot_best_effort(
            &self.snapshots,
            schedule,
            target,
            &schedule.target_name,
            &existing,
            SnapshotCause::PreRaid,
        );

        let exclude: HashSet<String> = existing.iter().cloned().collect();
        let resolved = self.resolver.resolve_all(&sources, &exclude).await;
        self.record_bookkeeping(&resolved);

        let mut new_items = resolved.item_ids.clone();
        if let Some(cap) = params.max_items {
            new_items.truncate(cap);
        }
        if !new_items.is_empty() {
            add_batched(self.gateway.as_ref(), target, &new_items)
                .await
                .map_err(|e| JobError::from_gateway(e, target))?;
        }

        info!(
            schedule_id = %schedule.id,
            sources = sources.len(),
            found = resolved.item_ids.len(),
            added = new_items.len(),
            "raid finished"
        );
        Ok(JobReport {
            job_type: JobType::Raid,
            items_before: existing.len(),
            items_after: existing.len() + new_items.len(),
            added: new_items.len(),
            removed: 0,
            snapshot_ids: snapshot_id.into_iter().collect(),
            sources: source_reports(&resolved),
            detail: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixtape_core::{GatewayError, SourceKind, UpstreamSource};
    use serde_json::json;

    use crate::testing::Fixture;

    fn params(raw: serde_json::Value) -> JobParams {
        JobParams::parse(JobType::Raid, &raw).unwrap()
    }

    #[tokio::test]
    async fn appends_new_unique_items_from_all_sources() {
        let fx = Fixture::new();
        fx.gateway.set_items("mix", &["a"]);
        fx.gateway.set_items("friends", &["a", "n1", "n2", "n3"]);
        fx.gateway.set_search_results("italo disco", &["n3", "n4"]);
        let owned = UpstreamSource::collection("u1", "mix", SourceKind::Owned, "friends");
        let search = UpstreamSource::search("u1", "mix", "italo disco");
        fx.sources.add(&owned).unwrap();
        fx.sources.add(&search).unwrap();
        let schedule = fx.schedule(JobType::Raid, "mix", json!(null));

        let report = fx.raid().execute(&schedule, params(json!(null))).await.unwrap();
        assert_eq!(fx.gateway.items("mix"), vec!["a", "n1", "n2", "n3", "n4"]);
        assert_eq!(report.added, 4);
        assert_eq!(report.items_after, 5);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(fx.snapshots.count("u1", "mix").unwrap(), 1);

        let stored = fx.sources.get("u1", &owned.id).unwrap();
        assert_eq!(stored.last_pathway.as_deref(), Some("direct-fetch"));
        assert_eq!(stored.last_status.as_deref(), Some("ok"));
        let stored = fx.sources.get("u1", &search.id).unwrap();
        assert_eq!(stored.last_status.as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn succeeds_when_nothing_is_new() {
        let fx = Fixture::new();
        fx.gateway.set_items("mix", &["a", "b"]);
        fx.gateway.set_items("friends", &["b", "a"]);
        fx.sources
            .add(&UpstreamSource::collection("u1", "mix", SourceKind::Owned, "friends"))
            .unwrap();
        let schedule = fx.schedule(JobType::Raid, "mix", json!(null));

        let report = fx.raid().execute(&schedule, params(json!(null))).await.unwrap();
        assert_eq!(report.added, 0);
        assert!(fx.gateway.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn failing_source_does_not_block_others() {
        let fx = Fixture::new();
        fx.gateway.set_items("mix", &[] as &[&str]);
        fx.gateway.set_items("good", &["x", "y"]);
        fx.gateway
            .fail_collection("gone", GatewayError::UpstreamUnavailable("503".into()));
        fx.sources
            .add(&UpstreamSource::collection("u1", "mix", SourceKind::External, "gone"))
            .unwrap();
        fx.sources
            .add(&UpstreamSource::collection("u1", "mix", SourceKind::Owned, "good"))
            .unwrap();
        let schedule = fx.schedule(JobType::Raid, "mix", json!(null));

        let report = fx.raid().execute(&schedule, params(json!(null))).await.unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.sources[0].status, "failed");
        assert!(report.sources[0].error.is_some());
    }

    #[tokio::test]
    async fn max_items_caps_and_batches_additions() {
        let fx = Fixture::with_batch_limit(2);
        fx.gateway.set_items("mix", &[] as &[&str]);
        let big: Vec<String> = (0..9).map(|i| format!("n{i}")).collect();
        fx.gateway.set_items("big", &big);
        fx.sources
            .add(&UpstreamSource::collection("u1", "mix", SourceKind::Owned, "big"))
            .unwrap();
        let schedule = fx.schedule(JobType::Raid, "mix", json!({"max_items": 5}));

        let report = fx
            .raid()
            .execute(&schedule, params(json!({"max_items": 5})))
            .await
            .unwrap();
        assert_eq!(report.added, 5);
        assert_eq!(fx.gateway.items("mix"), big[..5].to_vec());
        assert_eq!(fx.gateway.mutation_calls().len(), 3);
    }

    #[tokio::test]
    async fn no_sources_is_a_no_op() {
        let fx = Fixture::new();
        fx.gateway.set_items("mix", &["a"]);
        let schedule = fx.schedule(JobType::Raid, "mix", json!(null));

        let report = fx.raid().execute(&schedule, params(json!(null))).await.unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.detail.as_deref(), Some("no sources configured"));
    }

    #[tokio::test]
    async fn missing_target_is_not_found() {
        let fx = Fixture::new();
        let schedule = fx.schedule(JobType::Raid, "deleted", json!(null));

        let err = fx.raid().execute(&schedule, params(json!(null))).await.unwrap_err();
        assert!(matches!(err, JobError::CollectionNotFound { ref collection } if collection == "deleted"));
        assert!(!err.is_retryable());
    }
}
