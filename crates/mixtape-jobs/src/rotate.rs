use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use mixtape_core::job::RotateParams;
use mixtape_core::{
    ArchiveLookup, JobError, JobParams, JobReport, JobType, PlaylistGateway, RotationMode,
    Schedule, SnapshotCause,
};
use mixtape_snapshots::SnapshotStore;
use tracing::{debug, info};

use crate::batch::{add_batched, remove_batched};
use crate::handler::{list_ids, mismatched, snapshot_best_effort, JobHandler};

/// Rotation count actually applied: `requested` clamped to `[1, available]`,
/// or zero when there is nothing to rotate.
pub fn effective_count(requested: usize, available: usize) -> usize {
    if available == 0 {
        0
    } else {
        requested.clamp(1, available)
    }
}

/// Cycles items between the target and its paired archive.
///
/// "Oldest" is the front of the target's stored ordering; "most recently
/// archived" is the end of the archive's ordering.
pub struct RotateHandler {
    gateway: Arc<dyn PlaylistGateway>,
    snapshots: Arc<SnapshotStore>,
    archives: Arc<dyn ArchiveLookup>,
}

/// Item movements decided before any remote call.
#[derive(Debug, Default, PartialEq)]
struct RotationPlan {
    add_to_target: Vec<String>,
    add_to_archive: Vec<String>,
    remove_from_target: Vec<String>,
    remove_from_archive: Vec<String>,
}

impl RotationPlan {
    fn is_empty(&self) -> bool {
        self.add_to_target.is_empty() && self.remove_from_target.is_empty()
    }
}

/// Archive items absent from the target, most recently archived first.
fn replacements(target: &[String], archive: &[String]) -> Vec<String> {
    let in_target: HashSet<&String> = target.iter().collect();
    let mut seen = HashSet::new();
    archive
        .iter()
        .rev()
        .filter(|id| !in_target.contains(id) && seen.insert(*id))
        .cloned()
        .collect()
}

/// Target ids that can leave one at a time, front first.
///
/// Removal drops every occurrence of an id, so an id held more than once is
/// never an eviction candidate.
fn evictable(target: &[String]) -> Vec<String> {
    let mut occurrences: HashMap<&String, usize> = HashMap::new();
    for id in target {
        *occurrences.entry(id).or_default() += 1;
    }
    target
        .iter()
        .filter(|id| occurrences.get(id) == Some(&1))
        .cloned()
        .collect()
}

fn missing_from(ids: &[String], collection: &[String]) -> Vec<String> {
    let present: HashSet<&String> = collection.iter().collect();
    ids.iter().filter(|id| !present.contains(id)).cloned().collect()
}

fn plan(mode: RotationMode, count: usize, target: &[String], archive: &[String]) -> RotationPlan {
    let n = effective_count(count, target.len());
    let candidates = evictable(target);
    let n = n.min(candidates.len());
    match mode {
        RotationMode::ArchiveOldest => {
            let oldest = candidates[..n].to_vec();
            RotationPlan {
                add_to_archive: missing_from(&oldest, archive),
                remove_from_target: oldest,
                ..RotationPlan::default()
            }
        }
        RotationMode::Refresh => {
            // never evict more than can be replaced
            let picks: Vec<String> = replacements(target, archive).into_iter().take(n).collect();
            let evicted = candidates[..picks.len()].to_vec();
            RotationPlan {
                add_to_archive: missing_from(&evicted, archive),
                add_to_target: picks,
                remove_from_target: evicted,
                remove_from_archive: Vec::new(),
            }
        }
        RotationMode::Swap => {
            let incoming: Vec<String> = replacements(target, archive).into_iter().take(n).collect();
            let outgoing = candidates[..incoming.len()].to_vec();
            RotationPlan {
                add_to_archive: missing_from(&outgoing, archive),
                remove_from_target: outgoing,
                remove_from_archive: incoming.clone(),
                add_to_target: incoming,
            }
        }
    }
}

impl RotateHandler {
    pub fn new(
        gateway: Arc<dyn PlaylistGateway>,
        snapshots: Arc<SnapshotStore>,
        archives: Arc<dyn ArchiveLookup>,
    ) -> Self {
        Self {
            gateway,
            snapshots,
            archives,
        }
    }

    /// Additions on both sides happen before any removal.
    async fn apply(&self, target: &str, archive: &str, plan: &RotationPlan) -> Result<(), JobError> {
        let gw = self.gateway.as_ref();
        add_batched(gw, target, &plan.add_to_target)
            .await
            .map_err(|e| JobError::from_gateway(e, target))?;
        add_batched(gw, archive, &plan.add_to_archive)
            .await
            .map_err(|e| JobError::from_gateway(e, archive))?;
        remove_batched(gw, target, &plan.remove_from_target)
            .await
            .map_err(|e| JobError::from_gateway(e, target))?;
        remove_batched(gw, archive, &plan.remove_from_archive)
            .await
            .map_err(|e| JobError::from_gateway(e, archive))?;
        Ok(())
    }

    async fn archive_for(&self, schedule: &Schedule) -> Result<String, JobError> {
        self.archives
            .archive_for(&schedule.owner_id, &schedule.target_id)
            .await
            .map_err(|e| JobError::Persistence(e.to_string()))?
            .ok_or_else(|| {
                JobError::Config(format!(
                    "no archive collection paired with {}",
                    schedule.target_id
                ))
            })
    }
}

#[async_trait]
impl JobHandler for RotateHandler {
    fn job_type(&self) -> JobType {
        JobType::Rotate
    }

    async fn execute(&self, schedule: &Schedule, params: JobParams) -> Result<JobReport, JobError> {
        let RotateParams { mode, count } = match params {
            JobParams::Rotate(p) => p,
            other => return Err(mismatched(JobType::Rotate, &other)),
        };
        let target = schedule.target_id.as_str();
        let archive = self.archive_for(schedule).await?;

        let target_items = list_ids(self.gateway.as_ref(), target).await?;
        let archive_items = list_ids(self.gateway.as_ref(), &archive).await?;

        let plan = plan(mode, count, &target_items, &archive_items);
        if plan.is_empty() {
            debug!(schedule_id = %schedule.id, ?mode, "nothing to rotate");
            return Ok(JobReport::no_op(
                JobType::Rotate,
                target_items.len(),
                "nothing to rotate",
            ));
        }

        let mut snapshot_ids = Vec::new();
        snapshot_ids.extend(snapshot_best_effort(
            &self.snapshots,
            schedule,
            target,
            &schedule.target_name,
            &target_items,
            SnapshotCause::PreRotate,
        ));
        snapshot_ids.extend(snapshot_best_effort(
            &self.snapshots,
            schedule,
            &archive,
            &format!("{} (archive)", schedule.target_name),
            &archive_items,
            SnapshotCause::PreRotate,
        ));

        self.apply(target, &archive, &plan).await?;

        let added = plan.add_to_target.len();
        let removed = plan.remove_from_target.len();
        info!(
            schedule_id = %schedule.id,
            ?mode,
            requested = count,
            added,
            removed,
            archive = %archive,
            "rotation applied"
        );
        Ok(JobReport {
            job_type: JobType::Rotate,
            items_before: target_items.len(),
            items_after: target_items.len() + added - removed,
            added,
            removed,
            snapshot_ids,
            sources: Vec::new(),
            detail: Some(format!("archive {archive}")),
        })
    }
}
