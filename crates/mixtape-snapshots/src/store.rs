use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mixtape_core::{new_id, PlaylistSnapshot, SnapshotCause};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SnapshotError};

const SNAPSHOT_COLUMNS: &str = "id, owner_id, collection_id, collection_name, item_ids,
                                item_count, cause, note, created_at";

/// Captures, lists and restores collection snapshots.
///
/// Thread-safe: wraps a SQLite connection in a Mutex. The lock is held only
/// for the duration of one statement group, never across remote calls.
pub struct SnapshotStore {
    db: Mutex<Connection>,
    retention: usize,
}

impl SnapshotStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    ///
    /// `retention` is clamped to at least one snapshot per collection.
    pub fn new(conn: Connection, retention: usize) -> Self {
        Self {
            db: Mutex::new(conn),
            retention: retention.max(1),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Store one immutable snapshot, then trim the oldest records for the
    /// same (owner, collection) beyond the retention count.
    ///
    /// A failed trim is logged and does not fail the capture.
    #[instrument(skip(self, item_ids, note), fields(items = item_ids.len()))]
    pub fn capture(
        &self,
        owner_id: &str,
        collection_id: &str,
        collection_name: &str,
        item_ids: &[String],
        cause: SnapshotCause,
        note: Option<&str>,
    ) -> Result<PlaylistSnapshot> {
        let snapshot = PlaylistSnapshot {
            id: new_id(),
            owner_id: owner_id.to_string(),
            collection_id: collection_id.to_string(),
            collection_name: collection_name.to_string(),
            item_ids: item_ids.to_vec(),
            item_count: item_ids.len(),
            cause,
            note: note.map(String::from),
            created_at: Utc::now(),
        };
        let ids_json = serde_json::to_string(&snapshot.item_ids)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        let mut db = self.conn()?;
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO playlist_snapshots
             (id, owner_id, collection_id, collection_name, item_ids,
              item_count, cause, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                snapshot.id,
                snapshot.owner_id,
                snapshot.collection_id,
                snapshot.collection_name,
                ids_json,
                snapshot.item_count as i64,
                snapshot.cause.to_string(),
                snapshot.note,
                snapshot.created_at.to_rfc3339(),
            ],
        )?;

        match trim(&tx, owner_id, collection_id, self.retention) {
            Ok(0) => {}
            Ok(n) => debug!(trimmed = n, "old snapshots trimmed"),
            Err(e) => warn!(error = %e, "snapshot retention trim failed"),
        }
        tx.commit()?;
        info!(snapshot_id = %snapshot.id, cause = %cause, "snapshot captured");

        Ok(snapshot)
    }

    /// Most-recent-first snapshots of one collection.
    pub fn list(
        &self,
        owner_id: &str,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistSnapshot>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM playlist_snapshots
             WHERE owner_id = ?1 AND collection_id = ?2
             ORDER BY seq DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![owner_id, collection_id, limit as i64],
            row_to_snapshot,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Number of snapshots currently kept for one collection.
    pub fn count(&self, owner_id: &str, collection_id: &str) -> Result<usize> {
        let db = self.conn()?;
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM playlist_snapshots
             WHERE owner_id = ?1 AND collection_id = ?2",
            rusqlite::params![owner_id, collection_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Fetch one snapshot. Another owner's snapshot is reported as not found.
    pub fn get(&self, owner_id: &str, id: &str) -> Result<PlaylistSnapshot> {
        let db = self.conn()?;
        db.query_row(
            &format!(
                "SELECT {SNAPSHOT_COLUMNS}
                 FROM playlist_snapshots
                 WHERE id = ?1 AND owner_id = ?2"
            ),
            rusqlite::params![id, owner_id],
            row_to_snapshot,
        )
        .optional()?
        .ok_or_else(|| SnapshotError::NotFound { id: id.to_string() })
    }

    /// Delete one snapshot owned by `owner_id`.
    pub fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "DELETE FROM playlist_snapshots WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![id, owner_id],
        )?;
        if n == 0 {
            return Err(SnapshotError::NotFound { id: id.to_string() });
        }
        info!(snapshot_id = %id, "snapshot deleted");
        Ok(())
    }

    /// Stored ordering of a snapshot. Read-only; applying it is up to the caller.
    pub fn restore(&self, owner_id: &str, id: &str) -> Result<Vec<String>> {
        self.get(owner_id, id).map(|s| s.item_ids)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| SnapshotError::Poisoned)
    }
}

/// Delete everything but the `keep` newest snapshots of one collection.
fn trim(db: &Connection, owner_id: &str, collection_id: &str, keep: usize) -> Result<usize> {
    let n = db.execute(
        "DELETE FROM playlist_snapshots
         WHERE owner_id = ?1 AND collection_id = ?2
           AND seq NOT IN (
               SELECT seq FROM playlist_snapshots
               WHERE owner_id = ?1 AND collection_id = ?2
               ORDER BY seq DESC
               LIMIT ?3
           )",
        rusqlite::params![owner_id, collection_id, keep as i64],
    )?;
    Ok(n)
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlaylistSnapshot> {
    let ids_json: String = row.get(4)?;
    let cause_str: String = row.get(6)?;
    let created_str: String = row.get(8)?;
    let item_ids: Vec<String> = serde_json::from_str(&ids_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(PlaylistSnapshot {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        collection_id: row.get(2)?,
        collection_name: row.get(3)?,
        item_count: item_ids.len(),
        item_ids,
        cause: cause_str.parse().unwrap_or(SnapshotCause::Manual),
        note: row.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
