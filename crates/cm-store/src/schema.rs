use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Checkpoint every ~400KB instead of the default ~4MB — keeps WAL files small
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Force-checkpoint any stale WAL data into the main DB on startup.
    // Errors are non-fatal: in-memory DBs and fresh files legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    // Fresh databases get the full v2 schema. Existing v1 databases fall
    // through CREATE TABLE IF NOT EXISTS as a no-op and get the missing
    // embeds column via ALTER TABLE below.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id        TEXT NOT NULL,
            author    TEXT NOT NULL,
            saved_by  TEXT NOT NULL,
            body      TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            likes     INTEGER NOT NULL DEFAULT 0,
            replies   INTEGER NOT NULL DEFAULT 0,
            recasts   INTEGER NOT NULL DEFAULT 0,
            embeds    TEXT NOT NULL DEFAULT '[]',
            features  TEXT,
            scores    TEXT,
            PRIMARY KEY (id, saved_by)
        );

        CREATE TABLE IF NOT EXISTS opinions (
            id                   TEXT PRIMARY KEY,
            content_id           TEXT NOT NULL,
            requested_by         TEXT NOT NULL,
            opinion_text         TEXT NOT NULL,
            confidence           REAL NOT NULL,
            response_tone        TEXT NOT NULL,
            topic_analysis       TEXT NOT NULL DEFAULT '[]',
            reasoning            TEXT NOT NULL DEFAULT '[]',
            sources_used         TEXT NOT NULL DEFAULT '[]',
            web_research_summary TEXT,
            created_at           INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_items_saved_by ON items(saved_by);
        CREATE INDEX IF NOT EXISTS idx_items_timestamp ON items(timestamp);
        CREATE INDEX IF NOT EXISTS idx_opinions_content ON opinions(content_id);
        ",
    )?;

    // Add embeds to v1 databases that lack it
    if conn.prepare("SELECT embeds FROM items LIMIT 0").is_err() {
        conn.execute_batch("ALTER TABLE items ADD COLUMN embeds TEXT NOT NULL DEFAULT '[]';")?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
