use anyhow::{bail, Result};
use rusqlite::Connection;
use tracing::info;

/// Current schema version - increment when making schema changes
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for the ledger database
pub const SCHEMA: &str = r#"
-- Schema metadata for version tracking
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Sequence ledger: one row per chain block, never updated except for finality
-- Progress columns are decimal text (unbounded integers)
CREATE TABLE IF NOT EXISTS blocks (
    block_number INTEGER PRIMARY KEY,
    block_hash TEXT NOT NULL,
    parent_hash TEXT NOT NULL,
    extrinsics_root TEXT NOT NULL,
    state_root TEXT NOT NULL,
    author TEXT,
    is_finalized INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL,
    session_index INTEGER NOT NULL,
    epoch_index INTEGER NOT NULL,
    era_length TEXT NOT NULL,
    session_progress TEXT NOT NULL,
    era_progress TEXT NOT NULL,
    is_epoch_start INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_hash ON blocks(block_hash);
CREATE INDEX IF NOT EXISTS idx_blocks_session ON blocks(session_index);
CREATE INDEX IF NOT EXISTS idx_blocks_author ON blocks(author);

-- One row per observed session change
CREATE TABLE IF NOT EXISTS chain_snapshots (
    session_index INTEGER PRIMARY KEY,
    block_height INTEGER NOT NULL,
    total_issuance TEXT NOT NULL,
    total_emission TEXT NOT NULL,
    active_accounts INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);
"#;

/// Initialize database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Get a metadata value from schema_meta
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    );
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Set a metadata value in schema_meta
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get the current schema version from the database (0 if not set)
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    match get_meta(conn, "schema_version")? {
        Some(v) => Ok(v.parse().unwrap_or(0)),
        None => Ok(0),
    }
}

/// Stamp a fresh database, or refuse one written by a newer release
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let db_version = get_schema_version(conn)?;

    if db_version > CURRENT_SCHEMA_VERSION {
        bail!(
            "Database schema version ({}) is newer than this application supports ({}). \
             Please upgrade pledger to a newer version.",
            db_version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if db_version == 0 {
        let now = chrono::Utc::now().to_rfc3339();
        set_meta(conn, "schema_version", &CURRENT_SCHEMA_VERSION.to_string())?;
        set_meta(conn, "created_at", &now)?;
        set_meta(conn, "created_by", app_version)?;
        info!("Initialized new database with schema version {}", CURRENT_SCHEMA_VERSION);
    }

    Ok(())
}
