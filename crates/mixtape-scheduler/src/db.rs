use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `schedules` and `job_executions` tables (idempotent). The
/// execution index serves the most-recent-first history query.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedules (
            id           TEXT    NOT NULL PRIMARY KEY,
            owner_id     TEXT    NOT NULL,
            target_id    TEXT    NOT NULL,
            target_name  TEXT    NOT NULL,
            job_type     TEXT    NOT NULL,   -- reshuffle | raid | rotate
            params       TEXT    NOT NULL,   -- JSON, validated at run time
            recurrence   TEXT    NOT NULL,   -- JSON-encoded Recurrence
            enabled      INTEGER NOT NULL DEFAULT 1,
            last_run_at  TEXT,               -- RFC 3339 or NULL
            run_count    INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT    NOT NULL,
            updated_at   TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_schedules_enabled ON schedules (enabled);

        CREATE TABLE IF NOT EXISTS job_executions (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT    NOT NULL UNIQUE,
            schedule_id  TEXT    NOT NULL,
            status       TEXT    NOT NULL,   -- success | failed | skipped
            started_at   TEXT    NOT NULL,
            finished_at  TEXT    NOT NULL,
            result       TEXT    NOT NULL,   -- JSON JobReport or null
            error        TEXT,
            error_code   TEXT,
            retryable    INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_executions_schedule
            ON job_executions (schedule_id, seq DESC);
        ",
    )?;
    Ok(())
}
