//! Shared fixtures: an in-memory node and sample records

use crate::chain::{ChainAggregates, HeadNotification, HeadStream, HeaderInfo, NodeApi};
use crate::db::{BlockRecord, SnapshotRecord};
use crate::ingest::SessionCounters;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use num_bigint::BigUint;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const EPOCH_DURATION: u64 = 600;

/// Deterministic chain `0..=head` where block `n` sits at slot `n`
pub struct MockNode {
    head: AtomicU64,
    finalized: AtomicU64,
    session_index: AtomicU64,
    failures: Mutex<HashMap<u64, u32>>,
    corrupt: Mutex<HashSet<u64>>,
    counters_delay: Mutex<Duration>,
    requested: Mutex<Vec<u64>>,
    counters_calls: AtomicUsize,
    heads: Mutex<Option<mpsc::UnboundedReceiver<HeadNotification>>>,
}

impl MockNode {
    pub fn with_chain(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            finalized: AtomicU64::new(head),
            session_index: AtomicU64::new(0),
            failures: Mutex::new(HashMap::new()),
            corrupt: Mutex::new(HashSet::new()),
            counters_delay: Mutex::new(Duration::ZERO),
            requested: Mutex::new(Vec::new()),
            counters_calls: AtomicUsize::new(0),
            heads: Mutex::new(None),
        }
    }

    pub fn hash_of(number: u64) -> String {
        format!("0x{:064x}", number)
    }

    fn number_of(hash: &str) -> Result<u64> {
        u64::from_str_radix(hash.trim_start_matches("0x"), 16)
            .map_err(|_| anyhow!("unknown hash {}", hash))
    }

    /// Make `block_hash(number)` fail the next `times` calls
    pub fn fail_block(&self, number: u64, times: u32) {
        self.failures.lock().unwrap().insert(number, times);
    }

    /// Give `number` a slot before its epoch start
    pub fn corrupt_counters(&self, number: u64) {
        self.corrupt.lock().unwrap().insert(number);
    }

    pub fn set_finalized(&self, number: u64) {
        self.finalized.store(number, Ordering::SeqCst);
    }

    pub fn set_session(&self, index: u64) {
        self.session_index.store(index, Ordering::SeqCst);
    }

    pub fn set_counters_delay(&self, delay: Duration) {
        *self.counters_delay.lock().unwrap() = delay;
    }

    /// Block numbers in the order their hashes were requested
    pub fn requested(&self) -> Vec<u64> {
        self.requested.lock().unwrap().clone()
    }

    pub fn counters_calls(&self) -> usize {
        self.counters_calls.load(Ordering::SeqCst)
    }

    /// Sender feeding the stream returned by the next `subscribe_new_heads`
    pub fn head_sender(&self) -> mpsc::UnboundedSender<HeadNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.heads.lock().unwrap() = Some(rx);
        tx
    }

    pub fn head(number: u64) -> HeadNotification {
        HeadNotification {
            number,
            hash: Self::hash_of(number),
        }
    }
}

#[async_trait]
impl NodeApi for MockNode {
    async fn block_hash(&self, number: u64) -> Result<String> {
        self.requested.lock().unwrap().push(number);

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&number) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("connection reset while fetching #{}", number);
            }
        }

        if number > self.head.load(Ordering::SeqCst) {
            bail!("Block {} not known to node", number);
        }
        Ok(Self::hash_of(number))
    }

    async fn header(&self, hash: &str) -> Result<HeaderInfo> {
        let number = Self::number_of(hash)?;
        Ok(HeaderInfo {
            number,
            parent_hash: Self::hash_of(number.saturating_sub(1)),
            state_root: format!("0xstate{}", number),
            extrinsics_root: format!("0xext{}", number),
            author: (number > 0).then(|| format!("0xvalidator{}", number % 4)),
            is_epoch_start: number % EPOCH_DURATION == 0,
            timestamp_ms: 1_600_000_000_000 + number as i64 * 6_000,
        })
    }

    async fn counters_at(&self, hash: &str) -> Result<SessionCounters> {
        self.counters_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.counters_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let number = Self::number_of(hash)?;
        let epoch_index = if self.corrupt.lock().unwrap().contains(&number) {
            number / EPOCH_DURATION + 1
        } else {
            number / EPOCH_DURATION
        };

        Ok(SessionCounters {
            epoch_duration: EPOCH_DURATION.into(),
            sessions_per_era: 6u32.into(),
            epoch_index: epoch_index.into(),
            genesis_slot: BigUint::default(),
            current_slot: number.into(),
            current_index: self.session_index.load(Ordering::SeqCst).into(),
            current_era_start_session_index: BigUint::default(),
        })
    }

    async fn chain_aggregates(&self, _hash: &str) -> Result<ChainAggregates> {
        Ok(ChainAggregates {
            total_issuance: BigUint::from(10u32).pow(30),
            total_emission: 5_000u32.into(),
            active_accounts: 17,
        })
    }

    async fn best_head(&self) -> Result<HeadNotification> {
        Ok(Self::head(self.head.load(Ordering::SeqCst)))
    }

    async fn finalized_number(&self) -> Result<u64> {
        Ok(self.finalized.load(Ordering::SeqCst))
    }

    async fn subscribe_new_heads(&self) -> Result<HeadStream> {
        let rx = self
            .heads
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("no head sender installed"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

pub fn block_record(number: u64) -> BlockRecord {
    BlockRecord {
        block_number: number,
        block_hash: MockNode::hash_of(number),
        parent_hash: MockNode::hash_of(number.saturating_sub(1)),
        extrinsics_root: "0xext".to_string(),
        state_root: "0xstate".to_string(),
        author: None,
        is_finalized: false,
        timestamp: 1_600_000_000_000,
        session_index: 1,
        epoch_index: 0,
        era_length: 3_600u32.into(),
        session_progress: number.into(),
        era_progress: number.into(),
        is_epoch_start: number == 0,
    }
}

pub fn snapshot_record(session_index: u64) -> SnapshotRecord {
    SnapshotRecord {
        block_height: session_index * EPOCH_DURATION,
        session_index,
        total_issuance: 1_000_000u32.into(),
        total_emission: 10u32.into(),
        active_accounts: 3,
        timestamp: 1_700_000_000_000,
    }
}
