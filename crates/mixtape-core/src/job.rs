//! Job parameters, outcomes and the failure taxonomy shared by the executor
//! and the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::types::{new_id, ExecutionStatus, JobExecution, JobType, Schedule};

/// Reorder a collection with a named algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReshuffleParams {
    pub algorithm: String,
    /// Algorithm-specific options, passed through untouched.
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Import items from every source configured for the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RaidParams {
    /// Cap on items appended per run.
    #[serde(default)]
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationMode {
    /// Move the oldest target items to the archive.
    ArchiveOldest,
    /// Replace the oldest target items with recent archive items.
    Refresh,
    /// Exchange items between target and archive.
    Swap,
}

/// Cycle items between the target and its paired archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotateParams {
    pub mode: RotationMode,
    pub count: usize,
}

/// Validated, job-type-specific parameters.
#[derive(Debug, Clone)]
pub enum JobParams {
    Reshuffle(ReshuffleParams),
    Raid(RaidParams),
    Rotate(RotateParams),
}

impl JobParams {
    /// Parse the raw schedule parameters for `job_type`.
    ///
    /// Unknown fields are rejected so parameters belonging to another job
    /// type never slip through.
    pub fn parse(job_type: JobType, raw: &serde_json::Value) -> Result<Self, JobError> {
        let config_err =
            |e: serde_json::Error| JobError::Config(format!("invalid {job_type} parameters: {e}"));
        match job_type {
            JobType::Reshuffle => serde_json::from_value(raw.clone())
                .map(JobParams::Reshuffle)
                .map_err(config_err),
            JobType::Raid if raw.is_null() => Ok(JobParams::Raid(RaidParams::default())),
            JobType::Raid => serde_json::from_value(raw.clone())
                .map(JobParams::Raid)
                .map_err(config_err),
            JobType::Rotate => serde_json::from_value(raw.clone())
                .map(JobParams::Rotate)
                .map_err(config_err),
        }
    }

    pub fn for_schedule(schedule: &Schedule) -> Result<Self, JobError> {
        Self::parse(schedule.job_type, &schedule.params)
    }
}

/// Why a job run failed.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Missing or invalid job parameters, missing archive pairing, unknown algorithm.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The target or archive collection no longer exists remotely.
    #[error("Collection not found: {collection}")]
    CollectionNotFound { collection: String },

    /// Rate limiting, unavailability or auth failure on the remote API.
    #[error("Upstream error: {0}")]
    Upstream(GatewayError),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl JobError {
    /// Map a gateway failure raised while touching `collection`.
    pub fn from_gateway(err: GatewayError, collection: &str) -> Self {
        match err {
            GatewayError::NotFound { .. } => JobError::CollectionNotFound {
                collection: collection.to_string(),
            },
            other => JobError::Upstream(other),
        }
    }

    /// Whether the next trigger may succeed without user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Upstream(_) | JobError::Persistence(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            JobError::Config(_) => "CONFIG_ERROR",
            JobError::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            JobError::Upstream(GatewayError::RateLimited { .. }) => "RATE_LIMITED",
            JobError::Upstream(GatewayError::Unauthorized(_)) => "UNAUTHORIZED",
            JobError::Upstream(_) => "UPSTREAM_ERROR",
            JobError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

/// Per-source line of a raid report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    pub pathway: String,
    pub status: String,
    pub found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a successful run did; persisted as the execution's result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_type: JobType,
    pub items_before: usize,
    pub items_after: usize,
    pub added: usize,
    pub removed: usize,
    /// Snapshots captured before mutating. Empty when capture failed or nothing changed.
    #[serde(default)]
    pub snapshot_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobReport {
    /// A run that had nothing to do.
    pub fn no_op(job_type: JobType, items: usize, detail: &str) -> Self {
        Self {
            job_type,
            items_before: items,
            items_after: items,
            added: 0,
            removed: 0,
            snapshot_ids: Vec::new(),
            sources: Vec::new(),
            detail: Some(detail.to_string()),
        }
    }
}

/// Result of one `JobRunner::run` call.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub schedule_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: Result<JobReport, JobError>,
}

impl JobOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self.result {
            Ok(_) => ExecutionStatus::Success,
            Err(_) => ExecutionStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Build the audit record for this outcome.
    pub fn to_execution(&self) -> JobExecution {
        let (result, error, error_code, retryable) = match &self.result {
            Ok(report) => (
                serde_json::to_value(report).unwrap_or(serde_json::Value::Null),
                None,
                None,
                false,
            ),
            Err(e) => (
                serde_json::Value::Null,
                Some(e.to_string()),
                Some(e.code().to_string()),
                e.is_retryable(),
            ),
        };
        JobExecution {
            id: new_id(),
            schedule_id: self.schedule_id.clone(),
            status: self.status(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            result,
            error,
            error_code,
            retryable,
        }
    }
}

/// Performs one schedule's job end-to-end.
///
/// Implementations never panic on job failure: every failure is folded into
/// the returned [`JobOutcome`] so the caller can always write an audit record.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, schedule: &Schedule) -> JobOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reshuffle_requires_algorithm() {
        let err = JobParams::parse(JobType::Reshuffle, &json!({})).unwrap_err();
        assert!(matches!(err, JobError::Config(_)));
        assert!(!err.is_retryable());

        let ok = JobParams::parse(JobType::Reshuffle, &json!({"algorithm": "random"})).unwrap();
        assert!(matches!(ok, JobParams::Reshuffle(p) if p.algorithm == "random"));
    }

    #[test]
    fn raid_accepts_null_and_empty_params() {
        assert!(matches!(
            JobParams::parse(JobType::Raid, &serde_json::Value::Null),
            Ok(JobParams::Raid(RaidParams { max_items: None }))
        ));
        assert!(JobParams::parse(JobType::Raid, &json!({"max_items": 20})).is_ok());
    }

    #[test]
    fn foreign_parameters_are_rejected() {
        let raw = json!({"mode": "swap", "count": 3, "algorithm": "random"});
        assert!(JobParams::parse(JobType::Rotate, &raw).is_err());
        assert!(JobParams::parse(JobType::Raid, &json!({"mode": "swap"})).is_err());
    }

    #[test]
    fn rotate_params_parse_kebab_modes() {
        let p = JobParams::parse(JobType::Rotate, &json!({"mode": "archive-oldest", "count": 5}))
            .unwrap();
        match p {
            JobParams::Rotate(r) => {
                assert_eq!(r.mode, RotationMode::ArchiveOldest);
                assert_eq!(r.count, 5);
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn gateway_errors_map_to_taxonomy() {
        let nf = JobError::from_gateway(GatewayError::not_found("pl-1"), "pl-1");
        assert_eq!(nf.code(), "COLLECTION_NOT_FOUND");
        assert!(!nf.is_retryable());

        let rl = JobError::from_gateway(GatewayError::RateLimited { retry_after_ms: 500 }, "pl-1");
        assert_eq!(rl.code(), "RATE_LIMITED");
        assert!(rl.is_retryable());
    }

    #[test]
    fn failed_outcome_becomes_failed_execution() {
        let now = Utc::now();
        let outcome = JobOutcome {
            schedule_id: "s-1".to_string(),
            started_at: now,
            finished_at: now,
            result: Err(JobError::Config("no archive paired".to_string())),
        };
        let exec = outcome.to_execution();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_code.as_deref(), Some("CONFIG_ERROR"));
        assert!(!exec.retryable);
        assert!(exec.result.is_null());
    }
}
