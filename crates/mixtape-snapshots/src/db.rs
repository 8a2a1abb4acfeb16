use rusqlite::{Connection, Result};

/// Initialise snapshot tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_snapshots_table(conn)
}

/// `seq` gives a strict capture order even when two snapshots share a timestamp.
fn create_snapshots_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS playlist_snapshots (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            owner_id        TEXT NOT NULL,
            collection_id   TEXT NOT NULL,
            collection_name TEXT NOT NULL,
            item_ids        TEXT NOT NULL,   -- JSON array, capture order
            item_count      INTEGER NOT NULL,
            cause           TEXT NOT NULL,
            note            TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_owner_collection
            ON playlist_snapshots(owner_id, collection_id, seq DESC);",
    )
}
