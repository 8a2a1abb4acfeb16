use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mixtape_core::{ResolveResult, SourceKind, UpstreamSource};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::SourceStoreError;

type Result<T> = std::result::Result<T, SourceStoreError>;

const SOURCE_COLUMNS: &str = "id, owner_id, target_id, kind, source_collection_id, query,
                              last_resolved_at, last_pathway, last_status, created_at";

/// Raid sources attached to target collections.
pub struct SourceStore {
    db: Mutex<Connection>,
}

impl SourceStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Attach a source. Search sources need a query, collection sources an id.
    pub fn add(&self, source: &UpstreamSource) -> Result<()> {
        validate(source)?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO upstream_sources
             (id, owner_id, target_id, kind, source_collection_id, query,
              last_resolved_at, last_pathway, last_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                source.id,
                source.owner_id,
                source.target_id,
                source.kind.to_string(),
                source.source_collection_id,
                source.query,
                source.last_resolved_at.map(|t| t.to_rfc3339()),
                source.last_pathway,
                source.last_status,
                source.created_at.to_rfc3339(),
            ],
        )?;
        info!(source_id = %source.id, target = %source.target_id, kind = %source.kind, "source added");
        Ok(())
    }

    /// Sources of one target, oldest first.
    pub fn list_for_target(&self, owner_id: &str, target_id: &str) -> Result<Vec<UpstreamSource>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {SOURCE_COLUMNS}
             FROM upstream_sources
             WHERE owner_id = ?1 AND target_id = ?2
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(rusqlite::params![owner_id, target_id], row_to_source)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get(&self, owner_id: &str, id: &str) -> Result<UpstreamSource> {
        let db = self.conn()?;
        db.query_row(
            &format!(
                "SELECT {SOURCE_COLUMNS}
                 FROM upstream_sources
                 WHERE id = ?1 AND owner_id = ?2"
            ),
            rusqlite::params![id, owner_id],
            row_to_source,
        )
        .optional()?
        .ok_or_else(|| SourceStoreError::NotFound { id: id.to_string() })
    }

    pub fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "DELETE FROM upstream_sources WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![id, owner_id],
        )?;
        if n == 0 {
            return Err(SourceStoreError::NotFound { id: id.to_string() });
        }
        info!(source_id = %id, "source removed");
        Ok(())
    }

    /// Write resolver bookkeeping (`last_resolved_at`, pathway, status).
    pub fn record_resolution(
        &self,
        source_id: &str,
        result: &ResolveResult,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE upstream_sources
             SET last_resolved_at = ?1, last_pathway = ?2, last_status = ?3
             WHERE id = ?4",
            rusqlite::params![
                at.to_rfc3339(),
                result.pathway,
                result.status_label(),
                source_id
            ],
        )?;
        if n == 0 {
            return Err(SourceStoreError::NotFound {
                id: source_id.to_string(),
            });
        }
        debug!(source_id, pathway = %result.pathway, status = result.status_label(), "resolution recorded");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| SourceStoreError::Poisoned)
    }
}

fn validate(source: &UpstreamSource) -> Result<()> {
    let has_text = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    match source.kind {
        SourceKind::SearchQuery if !has_text(&source.query) => Err(SourceStoreError::Invalid(
            "search-query source needs a query".into(),
        )),
        SourceKind::Owned | SourceKind::External if !has_text(&source.source_collection_id) => {
            Err(SourceStoreError::Invalid(format!(
                "{} source needs a collection id",
                source.kind
            )))
        }
        _ => Ok(()),
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<UpstreamSource> {
    let kind_str: String = row.get(3)?;
    let kind = kind_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let resolved_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(9)?;
    Ok(UpstreamSource {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        target_id: row.get(2)?,
        kind,
        source_collection_id: row.get(4)?,
        query: row.get(5)?,
        last_resolved_at: resolved_at.as_deref().and_then(parse_time),
        last_pathway: row.get(7)?,
        last_status: row.get(8)?,
        created_at: parse_time(&created_at).unwrap_or_else(Utc::now),
    })
}
