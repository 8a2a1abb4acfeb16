use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mixtape_core::{ExecutionStatus, JobExecution, JobType, Recurrence, Schedule};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::error::{Result, SchedulerError};

const SCHEDULE_COLUMNS: &str = "id, owner_id, target_id, target_name, job_type, params,
                                recurrence, enabled, last_run_at, run_count, created_at, updated_at";

const EXECUTION_COLUMNS: &str = "id, schedule_id, status, started_at, finished_at, result,
                                 error, error_code, retryable";

/// Persistence for schedules and their execution history.
///
/// Each method holds the connection lock for one statement group only.
pub struct ScheduleStore {
    db: Mutex<Connection>,
}

impl ScheduleStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Insert a schedule or overwrite its definition.
    ///
    /// Run bookkeeping (`last_run_at`, `run_count`) is only taken from
    /// `schedule` on insert; afterwards `record_run` owns it.
    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    pub fn upsert(&self, schedule: &Schedule) -> Result<()> {
        let params = serde_json::to_string(&schedule.params)
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?;
        let recurrence = serde_json::to_string(&schedule.recurrence)
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?;

        let db = self.conn()?;
        db.execute(
            "INSERT INTO schedules
             (id, owner_id, target_id, target_name, job_type, params, recurrence,
              enabled, last_run_at, run_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                target_id = excluded.target_id,
                target_name = excluded.target_name,
                job_type = excluded.job_type,
                params = excluded.params,
                recurrence = excluded.recurrence,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
            rusqlite::params![
                schedule.id,
                schedule.owner_id,
                schedule.target_id,
                schedule.target_name,
                schedule.job_type.to_string(),
                params,
                recurrence,
                schedule.enabled,
                schedule.last_run_at.map(|t| t.to_rfc3339()),
                schedule.run_count,
                schedule.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!("schedule saved");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Schedule>> {
        let db = self.conn()?;
        let schedule = db
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                [id],
                row_to_schedule,
            )
            .optional()?;
        Ok(schedule)
    }

    /// All schedules ordered by creation time.
    pub fn list(&self) -> Result<Vec<Schedule>> {
        self.query_schedules(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY created_at"
        ))
    }

    pub fn list_enabled(&self) -> Result<Vec<Schedule>> {
        self.query_schedules(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE enabled = 1 ORDER BY created_at"
        ))
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE schedules SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![enabled, Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(SchedulerError::ScheduleNotFound { id: id.to_string() });
        }
        info!(schedule_id = %id, enabled, "schedule toggled");
        Ok(())
    }

    /// Delete a schedule. Its execution history is kept.
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute("DELETE FROM schedules WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::ScheduleNotFound { id: id.to_string() });
        }
        info!(schedule_id = %id, "schedule deleted");
        Ok(())
    }

    /// Post-run bookkeeping: stamp `last_run_at` and bump `run_count`.
    pub fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let db = self.conn()?;
        let at = at.to_rfc3339();
        let n = db.execute(
            "UPDATE schedules SET last_run_at = ?1, run_count = run_count + 1, updated_at = ?1
             WHERE id = ?2",
            rusqlite::params![at, id],
        )?;
        if n == 0 {
            return Err(SchedulerError::ScheduleNotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Append one audit record. Records are never updated afterwards.
    pub fn insert_execution(&self, exec: &JobExecution) -> Result<()> {
        let result = serde_json::to_string(&exec.result)
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO job_executions
             (id, schedule_id, status, started_at, finished_at, result,
              error, error_code, retryable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                exec.id,
                exec.schedule_id,
                exec.status.to_string(),
                exec.started_at.to_rfc3339(),
                exec.finished_at.to_rfc3339(),
                result,
                exec.error,
                exec.error_code,
                exec.retryable,
            ],
        )?;
        Ok(())
    }

    /// Most-recent-first execution history of one schedule.
    pub fn list_executions(&self, schedule_id: &str, limit: usize) -> Result<Vec<JobExecution>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM job_executions
             WHERE schedule_id = ?1
             ORDER BY seq DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![schedule_id, limit as i64],
            row_to_execution,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn query_schedules(&self, sql: &str) -> Result<Vec<Schedule>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map([], row_to_schedule)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| SchedulerError::Poisoned)
    }
}

fn conversion_error(
    col: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, e.into())
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let job_type: String = row.get(4)?;
    let params: String = row.get(5)?;
    let recurrence: String = row.get(6)?;
    let last_run_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    let job_type: JobType = job_type.parse().map_err(|e: String| conversion_error(4, e))?;
    let params: serde_json::Value =
        serde_json::from_str(&params).map_err(|e| conversion_error(5, e))?;
    let recurrence: Recurrence =
        serde_json::from_str(&recurrence).map_err(|e| conversion_error(6, e))?;

    Ok(Schedule {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        target_id: row.get(2)?,
        target_name: row.get(3)?,
        job_type,
        params,
        recurrence,
        enabled: row.get(7)?,
        last_run_at: last_run_at.as_deref().and_then(parse_time),
        run_count: row.get(9)?,
        created_at: parse_time(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_time(&updated_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobExecution> {
    let status: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let finished_at: String = row.get(4)?;
    let result: String = row.get(5)?;

    let status: ExecutionStatus = status.parse().map_err(|e: String| conversion_error(2, e))?;
    Ok(JobExecution {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        status,
        started_at: parse_time(&started_at).unwrap_or_else(Utc::now),
        finished_at: parse_time(&finished_at).unwrap_or_else(Utc::now),
        result: serde_json::from_str(&result).unwrap_or(serde_json::Value::Null),
        error: row.get(6)?,
        error_code: row.get(7)?,
        retryable: row.get(8)?,
    })
}
