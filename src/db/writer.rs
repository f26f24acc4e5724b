//! Async boundary into the store
//!
//! SQLite calls are synchronous; they run on the blocking pool so fetch and
//! write suspension only ever parks the issuing task.

use super::{BlockRecord, Database, SnapshotRecord};
use anyhow::{Context, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct LedgerWriter {
    db: Arc<Database>,
}

impl LedgerWriter {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .context("Database task panicked")?
    }

    /// Upsert-by-number; `Ok(false)` means the block was already stored
    pub async fn write_block(&self, record: BlockRecord) -> Result<bool> {
        let number = record.block_number;
        self.run(move |db| db.insert_block(&record))
            .await
            .with_context(|| format!("Failed to write block {}", number))
    }

    /// Insert-if-absent-by-session; `Ok(false)` means the session index was
    /// not above the latest stored one
    pub async fn write_snapshot(&self, record: SnapshotRecord) -> Result<bool> {
        let session = record.session_index;
        self.run(move |db| db.insert_snapshot(&record))
            .await
            .with_context(|| format!("Failed to write snapshot for session {}", session))
    }

    pub async fn latest_session_index(&self) -> Result<Option<u64>> {
        self.run(|db| db.get_latest_session_index()).await
    }

    pub async fn block_numbers(&self) -> Result<Vec<u64>> {
        self.run(|db| db.get_block_numbers()).await
    }

    pub async fn unfinalized_hashes(&self, up_to_block: u64) -> Result<Vec<(u64, String)>> {
        self.run(move |db| db.get_unfinalized_hashes(up_to_block)).await
    }

    pub async fn finalize_block(&self, block_number: u64, block_hash: String) -> Result<bool> {
        self.run(move |db| db.finalize_block(block_number, &block_hash)).await
    }

    pub async fn discard_block(&self, block_number: u64, block_hash: String) -> Result<bool> {
        self.run(move |db| db.delete_unfinalized_block(block_number, &block_hash))
            .await
            .with_context(|| format!("Failed to discard block {}", block_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_record, snapshot_record};

    #[tokio::test]
    async fn test_concurrent_writes_to_same_block() {
        let writer = LedgerWriter::new(Arc::new(Database::open_in_memory().unwrap()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let writer = writer.clone();
                tokio::spawn(async move { writer.write_block(block_record(5)).await.unwrap() })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(writer.block_numbers().await.unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let writer = LedgerWriter::new(Arc::new(Database::open_in_memory().unwrap()));
        assert!(writer.write_snapshot(snapshot_record(3)).await.unwrap());
        assert!(!writer.write_snapshot(snapshot_record(3)).await.unwrap());
        assert_eq!(writer.latest_session_index().await.unwrap(), Some(3));
    }
}
