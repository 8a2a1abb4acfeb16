//! Target → archive collection pairings used by rotation.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use mixtape_core::{ArchiveLookup, MixtapeError, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

/// Initialise the `archive_pairs` table. Idempotent.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS archive_pairs (
            owner_id    TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            archive_id  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (owner_id, target_id)
        );",
    )
}

/// One pairing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePair {
    pub owner_id: String,
    pub target_id: String,
    pub archive_id: String,
}

/// SQLite-backed [`ArchiveLookup`].
pub struct ArchivePairs {
    db: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> MixtapeError {
    MixtapeError::Database(e.to_string())
}

impl ArchivePairs {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Pair `target_id` with `archive_id`, replacing any existing pairing.
    pub fn pair(&self, owner_id: &str, target_id: &str, archive_id: &str) -> Result<()> {
        if target_id == archive_id {
            return Err(MixtapeError::InvalidValue {
                field: "archive_id",
                value: format!("{archive_id} (same as target)"),
            });
        }
        let db = self.conn()?;
        db.execute(
            "INSERT INTO archive_pairs (owner_id, target_id, archive_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id, target_id) DO UPDATE SET archive_id = excluded.archive_id",
            rusqlite::params![owner_id, target_id, archive_id, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        info!(owner = %owner_id, target = %target_id, archive = %archive_id, "archive paired");
        Ok(())
    }

    /// Remove a pairing. Returns whether one existed.
    pub fn unpair(&self, owner_id: &str, target_id: &str) -> Result<bool> {
        let db = self.conn()?;
        let n = db
            .execute(
                "DELETE FROM archive_pairs WHERE owner_id = ?1 AND target_id = ?2",
                rusqlite::params![owner_id, target_id],
            )
            .map_err(db_err)?;
        Ok(n > 0)
    }

    pub fn list(&self, owner_id: &str) -> Result<Vec<ArchivePair>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT owner_id, target_id, archive_id FROM archive_pairs
                 WHERE owner_id = ?1 ORDER BY target_id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([owner_id], |row| {
                Ok(ArchivePair {
                    owner_id: row.get(0)?,
                    target_id: row.get(1)?,
                    archive_id: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn lookup(&self, owner_id: &str, target_id: &str) -> Result<Option<String>> {
        let db = self.conn()?;
        db.query_row(
            "SELECT archive_id FROM archive_pairs WHERE owner_id = ?1 AND target_id = ?2",
            rusqlite::params![owner_id, target_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| MixtapeError::Internal("archive pair store lock poisoned".into()))
    }
}

#[async_trait]
impl ArchiveLookup for ArchivePairs {
    async fn archive_for(&self, owner_id: &str, collection_id: &str) -> Result<Option<String>> {
        self.lookup(owner_id, collection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> ArchivePairs {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        ArchivePairs::new(conn)
    }

    #[tokio::test]
    async fn pair_replaces_and_unpair_removes() {
        let pairs = pairs();
        assert_eq!(pairs.archive_for("u1", "mix").await.unwrap(), None);

        pairs.pair("u1", "mix", "vault-1").unwrap();
        pairs.pair("u1", "mix", "vault-2").unwrap();
        assert_eq!(pairs.archive_for("u1", "mix").await.unwrap().as_deref(), Some("vault-2"));
        assert_eq!(pairs.archive_for("u2", "mix").await.unwrap(), None);
        assert_eq!(pairs.list("u1").unwrap().len(), 1);

        assert!(pairs.unpair("u1", "mix").unwrap());
        assert!(!pairs.unpair("u1", "mix").unwrap());
        assert_eq!(pairs.archive_for("u1", "mix").await.unwrap(), None);
    }

    #[test]
    fn collection_cannot_archive_into_itself() {
        let pairs = pairs();
        assert!(matches!(
            pairs.pair("u1", "mix", "mix"),
            Err(MixtapeError::InvalidValue { .. })
        ));
    }
}
