use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// New record identifier (UUIDv7, time-sortable).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Which automation a schedule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Reshuffle,
    Raid,
    Rotate,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Reshuffle, JobType::Raid, JobType::Rotate];
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Reshuffle => write!(f, "reshuffle"),
            JobType::Raid => write!(f, "raid"),
            JobType::Rotate => write!(f, "rotate"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "reshuffle" => Ok(JobType::Reshuffle),
            "raid" => Ok(JobType::Raid),
            "rotate" => Ok(JobType::Rotate),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

/// When a schedule fires.
///
/// Both variants keep the raw user input; interpretation (and the fallback for
/// values that don't parse) happens in the scheduler, never at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// Named interval from a closed vocabulary (`daily`, `every-6h`, …).
    Interval { every: String },

    /// Five-field cron expression: minute hour day-of-month month day-of-week.
    Cron { expression: String },
}

impl Recurrence {
    pub fn interval(every: &str) -> Self {
        Recurrence::Interval {
            every: every.to_string(),
        }
    }

    pub fn cron(expression: &str) -> Self {
        Recurrence::Cron {
            expression: expression.to_string(),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recurrence::Interval { every } => write!(f, "interval:{every}"),
            Recurrence::Cron { expression } => write!(f, "cron:{expression}"),
        }
    }
}

/// A persisted automation schedule for one target collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub owner_id: String,
    /// Remote collection the job mutates.
    pub target_id: String,
    /// Collection name as last seen; display only.
    pub target_name: String,
    pub job_type: JobType,
    /// Job-type-specific parameters, validated at run time by `JobParams::parse`.
    pub params: serde_json::Value,
    pub recurrence: Recurrence,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        owner_id: &str,
        target_id: &str,
        target_name: &str,
        job_type: JobType,
        params: serde_json::Value,
        recurrence: Recurrence,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            owner_id: owner_id.to_string(),
            target_id: target_id.to_string(),
            target_name: target_name.to_string(),
            job_type,
            params,
            recurrence,
            enabled: true,
            last_run_at: None,
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Final state of one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    /// The trigger fired while a previous run of the same schedule was still in flight.
    Skipped,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "skipped" => Ok(ExecutionStatus::Skipped),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Immutable audit record; exactly one per trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: String,
    pub schedule_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Serialised `JobReport` on success, `null` otherwise.
    pub result: serde_json::Value,
    pub error: Option<String>,
    /// Short code from `JobError::code`, e.g. `COLLECTION_NOT_FOUND`.
    pub error_code: Option<String>,
    pub retryable: bool,
}

impl JobExecution {
    /// Record a trigger that was dropped because the schedule was already running.
    pub fn skipped(schedule_id: &str, at: DateTime<Utc>, reason: &str) -> Self {
        Self {
            id: new_id(),
            schedule_id: schedule_id.to_string(),
            status: ExecutionStatus::Skipped,
            started_at: at,
            finished_at: at,
            result: serde_json::Value::Null,
            error: Some(reason.to_string()),
            error_code: None,
            retryable: false,
        }
    }
}

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotCause {
    Manual,
    PreReshuffle,
    PreRaid,
    PreRotate,
    PreRestore,
}

impl SnapshotCause {
    /// Cause tag used before a job of the given type mutates its target.
    pub fn before(job_type: JobType) -> Self {
        match job_type {
            JobType::Reshuffle => SnapshotCause::PreReshuffle,
            JobType::Raid => SnapshotCause::PreRaid,
            JobType::Rotate => SnapshotCause::PreRotate,
        }
    }
}

impl fmt::Display for SnapshotCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotCause::Manual => "manual",
            SnapshotCause::PreReshuffle => "pre-reshuffle",
            SnapshotCause::PreRaid => "pre-raid",
            SnapshotCause::PreRotate => "pre-rotate",
            SnapshotCause::PreRestore => "pre-restore",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SnapshotCause {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SnapshotCause::Manual),
            "pre-reshuffle" => Ok(SnapshotCause::PreReshuffle),
            "pre-raid" => Ok(SnapshotCause::PreRaid),
            "pre-rotate" => Ok(SnapshotCause::PreRotate),
            "pre-restore" => Ok(SnapshotCause::PreRestore),
            other => Err(format!("unknown snapshot cause: {other}")),
        }
    }
}

/// Point-in-time ordering of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub id: String,
    pub owner_id: String,
    pub collection_id: String,
    pub collection_name: String,
    pub item_ids: Vec<String>,
    /// Always equal to `item_ids.len()`.
    pub item_count: usize,
    pub cause: SnapshotCause,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How a raid source is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A collection the owner controls.
    Owned,
    /// A collection owned by someone else; the provider may withhold its items.
    External,
    /// Free-text search, no backing collection.
    SearchQuery,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Owned => "owned",
            SourceKind::External => "external",
            SourceKind::SearchQuery => "search-query",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "owned" => Ok(SourceKind::Owned),
            "external" => Ok(SourceKind::External),
            "search-query" => Ok(SourceKind::SearchQuery),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// A raid source attached to a target collection.
///
/// The `last_*` fields are resolver bookkeeping; they are written by the
/// caller after a resolution, never by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSource {
    pub id: String,
    pub owner_id: String,
    pub target_id: String,
    pub kind: SourceKind,
    /// `None` for `SearchQuery` sources.
    pub source_collection_id: Option<String>,
    /// Required for `SearchQuery`; optional enrichment hint otherwise.
    pub query: Option<String>,
    pub last_resolved_at: Option<DateTime<Utc>>,
    pub last_pathway: Option<String>,
    pub last_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UpstreamSource {
    pub fn collection(owner_id: &str, target_id: &str, kind: SourceKind, collection_id: &str) -> Self {
        Self::build(owner_id, target_id, kind, Some(collection_id.to_string()), None)
    }

    pub fn search(owner_id: &str, target_id: &str, query: &str) -> Self {
        Self::build(
            owner_id,
            target_id,
            SourceKind::SearchQuery,
            None,
            Some(query.to_string()),
        )
    }

    fn build(
        owner_id: &str,
        target_id: &str,
        kind: SourceKind,
        source_collection_id: Option<String>,
        query: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            owner_id: owner_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            source_collection_id,
            query,
            last_resolved_at: None,
            last_pathway: None,
            last_status: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a search hint to a collection source (enables search enrichment).
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }
}

/// Outcome of resolving one source. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResult {
    pub item_ids: Vec<String>,
    /// Name of the pathway that produced this result.
    pub pathway: String,
    pub success: bool,
    /// True when the pathway can only ever return a sample of the source.
    pub partial: bool,
    pub error: Option<String>,
}

impl ResolveResult {
    pub fn complete(pathway: &str, item_ids: Vec<String>) -> Self {
        Self {
            item_ids,
            pathway: pathway.to_string(),
            success: true,
            partial: false,
            error: None,
        }
    }

    pub fn partial(pathway: &str, item_ids: Vec<String>) -> Self {
        Self {
            item_ids,
            pathway: pathway.to_string(),
            success: true,
            partial: true,
            error: None,
        }
    }

    pub fn failed(pathway: &str, error: impl Into<String>) -> Self {
        Self {
            item_ids: Vec::new(),
            pathway: pathway.to_string(),
            success: false,
            partial: false,
            error: Some(error.into()),
        }
    }

    /// A definitive answer: no further pathway needs to be tried.
    pub fn is_final(&self) -> bool {
        self.success && !self.partial
    }

    /// Bookkeeping label stored in `UpstreamSource::last_status`.
    pub fn status_label(&self) -> &'static str {
        match (self.success, self.partial) {
            (true, false) => "ok",
            (true, true) => "partial",
            (false, _) => "failed",
        }
    }
}
