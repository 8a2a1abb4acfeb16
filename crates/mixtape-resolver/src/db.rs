use rusqlite::{Connection, Result};

/// Initialise the raid source table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS upstream_sources (
            id                   TEXT NOT NULL PRIMARY KEY,
            owner_id             TEXT NOT NULL,
            target_id            TEXT NOT NULL,
            kind                 TEXT NOT NULL,   -- owned | external | search-query
            source_collection_id TEXT,
            query                TEXT,
            last_resolved_at     TEXT,
            last_pathway         TEXT,
            last_status          TEXT,
            created_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sources_target
            ON upstream_sources(owner_id, target_id, created_at);",
    )
}
