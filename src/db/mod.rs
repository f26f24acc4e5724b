mod blocks;
mod schema;
mod snapshots;
mod writer;

pub use blocks::BlockRecord;
pub use snapshots::SnapshotRecord;
pub use writer::LedgerWriter;

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Database wrapper for the ledger
///
/// The connection sits behind a mutex so the backfill and live paths can
/// share one handle; each call holds the lock for a single statement.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at the specified path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::init_schema(&conn)?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    // Block operations
    pub fn insert_block(&self, block: &BlockRecord) -> Result<bool> {
        blocks::insert_block(&*self.conn()?, block)
    }

    pub fn get_block(&self, block_number: u64) -> Result<Option<BlockRecord>> {
        blocks::get_block(&*self.conn()?, block_number)
    }

    pub fn get_max_block_number(&self) -> Result<Option<u64>> {
        blocks::get_max_block_number(&*self.conn()?)
    }

    pub fn get_block_numbers(&self) -> Result<Vec<u64>> {
        blocks::get_block_numbers(&*self.conn()?)
    }

    pub fn get_unfinalized_hashes(&self, up_to_block: u64) -> Result<Vec<(u64, String)>> {
        blocks::get_unfinalized_hashes(&*self.conn()?, up_to_block)
    }

    pub fn finalize_block(&self, block_number: u64, block_hash: &str) -> Result<bool> {
        blocks::finalize_block(&*self.conn()?, block_number, block_hash)
    }

    pub fn delete_unfinalized_block(&self, block_number: u64, block_hash: &str) -> Result<bool> {
        blocks::delete_unfinalized_block(&*self.conn()?, block_number, block_hash)
    }

    pub fn count_blocks(&self) -> Result<u64> {
        blocks::count_blocks(&*self.conn()?)
    }

    pub fn count_finalized_blocks(&self) -> Result<u64> {
        blocks::count_finalized_blocks(&*self.conn()?)
    }

    pub fn get_blocks_in_range(
        &self,
        from: u64,
        to: u64,
        limit: Option<u32>,
    ) -> Result<Vec<BlockRecord>> {
        blocks::get_blocks_in_range(&*self.conn()?, from, to, limit)
    }

    // Snapshot operations
    pub fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> Result<bool> {
        snapshots::insert_snapshot(&*self.conn()?, snapshot)
    }

    pub fn get_latest_session_index(&self) -> Result<Option<u64>> {
        snapshots::get_latest_session_index(&*self.conn()?)
    }

    pub fn get_recent_snapshots(&self, limit: u32) -> Result<Vec<SnapshotRecord>> {
        snapshots::get_recent_snapshots(&*self.conn()?, limit)
    }

    pub fn count_snapshots(&self) -> Result<u64> {
        snapshots::count_snapshots(&*self.conn()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_operations() {
        let db = Database::open_in_memory().unwrap();

        let block = crate::testing::block_record(100);
        assert!(db.insert_block(&block).unwrap());
        assert!(!db.insert_block(&block).unwrap());
        assert_eq!(db.get_block(100).unwrap().unwrap().block_hash, block.block_hash);
        assert_eq!(db.count_blocks().unwrap(), 1);

        assert_eq!(db.get_latest_session_index().unwrap(), None);
    }

    #[test]
    fn test_open_file_database_twice() {
        let dir = std::env::temp_dir().join(format!("pledger-db-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ledger.db");

        {
            let db = Database::open(&path).unwrap();
            db.insert_block(&crate::testing::block_record(1)).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_block_numbers().unwrap(), vec![1]);

        drop(db);
        std::fs::remove_dir_all(&dir).ok();
    }
}
