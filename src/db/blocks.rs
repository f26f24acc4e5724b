use anyhow::Result;
use num_bigint::BigUint;
use rusqlite::{params, Connection, Row};
use std::str::FromStr;

/// Block record for database storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub block_number: u64,
    pub block_hash: String,
    pub parent_hash: String,
    pub extrinsics_root: String,
    pub state_root: String,
    pub author: Option<String>,
    pub is_finalized: bool,
    /// Milliseconds since Unix epoch, from the block's timestamp inherent
    pub timestamp: i64,
    pub session_index: u64,
    pub epoch_index: u64,
    pub era_length: BigUint,
    pub session_progress: BigUint,
    pub era_progress: BigUint,
    pub is_epoch_start: bool,
}

const BLOCK_COLUMNS: &str = "block_number, block_hash, parent_hash, extrinsics_root, state_root,
    author, is_finalized, timestamp, session_index, epoch_index, era_length,
    session_progress, era_progress, is_epoch_start";

/// Read a decimal text column back into an unbounded integer
pub(crate) fn big_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<BigUint> {
    let text: String = row.get(idx)?;
    BigUint::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<BlockRecord> {
    Ok(BlockRecord {
        block_number: row.get::<_, i64>(0)? as u64,
        block_hash: row.get(1)?,
        parent_hash: row.get(2)?,
        extrinsics_root: row.get(3)?,
        state_root: row.get(4)?,
        author: row.get(5)?,
        is_finalized: row.get::<_, i32>(6)? != 0,
        timestamp: row.get(7)?,
        session_index: row.get::<_, i64>(8)? as u64,
        epoch_index: row.get::<_, i64>(9)? as u64,
        era_length: big_column(row, 10)?,
        session_progress: big_column(row, 11)?,
        era_progress: big_column(row, 12)?,
        is_epoch_start: row.get::<_, i32>(13)? != 0,
    })
}

/// Insert a block unless its number is already stored
///
/// Returns `false` when the row already existed (re-harvest is a no-op).
pub fn insert_block(conn: &Connection, block: &BlockRecord) -> Result<bool> {
    let inserted = conn.execute(
        &format!(
            "INSERT INTO blocks ({}, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(block_number) DO NOTHING",
            BLOCK_COLUMNS
        ),
        params![
            block.block_number as i64,
            &block.block_hash,
            &block.parent_hash,
            &block.extrinsics_root,
            &block.state_root,
            &block.author,
            block.is_finalized as i32,
            block.timestamp,
            block.session_index as i64,
            block.epoch_index as i64,
            block.era_length.to_string(),
            block.session_progress.to_string(),
            block.era_progress.to_string(),
            block.is_epoch_start as i32,
            chrono::Utc::now().timestamp()
        ],
    )?;
    Ok(inserted > 0)
}

/// Get a block by number
pub fn get_block(conn: &Connection, block_number: u64) -> Result<Option<BlockRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM blocks WHERE block_number = ?1",
        BLOCK_COLUMNS
    ))?;

    match stmt.query_row(params![block_number as i64], block_from_row) {
        Ok(block) => Ok(Some(block)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get the highest block number in the database
pub fn get_max_block_number(conn: &Connection) -> Result<Option<u64>> {
    let result: Option<i64> =
        conn.query_row("SELECT MAX(block_number) FROM blocks", [], |row| row.get(0))?;
    Ok(result.map(|n| n as u64))
}

/// All stored block numbers, ascending
pub fn get_block_numbers(conn: &Connection) -> Result<Vec<u64>> {
    let mut stmt = conn.prepare("SELECT block_number FROM blocks ORDER BY block_number ASC")?;
    let rows = stmt.query_map([], |row| Ok(row.get::<_, i64>(0)? as u64))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Unfinalized blocks at or below `up_to_block`, ascending, with their stored hash
pub fn get_unfinalized_hashes(conn: &Connection, up_to_block: u64) -> Result<Vec<(u64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT block_number, block_hash FROM blocks
         WHERE block_number <= ?1 AND is_finalized = 0
         ORDER BY block_number ASC",
    )?;
    let rows = stmt.query_map(params![up_to_block as i64], |row| {
        Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Mark one block finalized, only while it is still stored under `block_hash`
pub fn finalize_block(conn: &Connection, block_number: u64, block_hash: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE blocks SET is_finalized = 1
         WHERE block_number = ?1 AND block_hash = ?2 AND is_finalized = 0",
        params![block_number as i64, block_hash],
    )?;
    Ok(updated > 0)
}

/// Remove an unfinalized block stored under `block_hash`
///
/// Used for rows from a fork that lost; the number becomes a gap again.
pub fn delete_unfinalized_block(
    conn: &Connection,
    block_number: u64,
    block_hash: &str,
) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM blocks WHERE block_number = ?1 AND block_hash = ?2 AND is_finalized = 0",
        params![block_number as i64, block_hash],
    )?;
    Ok(deleted > 0)
}

/// Count total blocks in database
pub fn count_blocks(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Count finalized blocks
pub fn count_finalized_blocks(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blocks WHERE is_finalized = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Get blocks in a range
pub fn get_blocks_in_range(
    conn: &Connection,
    from: u64,
    to: u64,
    limit: Option<u32>,
) -> Result<Vec<BlockRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM blocks WHERE block_number >= ?1 AND block_number <= ?2
         ORDER BY block_number ASC LIMIT ?3",
        BLOCK_COLUMNS
    ))?;

    let limit = limit.map_or(-1, i64::from);
    let rows = stmt.query_map(params![from as i64, to as i64, limit], block_from_row)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}
