//! Node access for the ledger
//!
//! - [`NodeApi`]: the capability set the ingestion engine consumes
//! - [`SubstrateNode`]: JSON-RPC implementation against a Substrate node
//! - SCALE decoding, storage keys and BABE digest parsing it relies on

pub mod digest;
mod node;
pub mod scale;
pub mod storage;

pub use node::{ChainConstants, SubstrateNode};

use crate::ingest::SessionCounters;
use anyhow::Result;
use async_trait::async_trait;
use num_bigint::BigUint;
use std::pin::Pin;
use tokio_stream::Stream;

/// Latest head reported by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadNotification {
    pub number: u64,
    pub hash: String,
}

/// Header fields of a block, with author and timestamp resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub number: u64,
    pub parent_hash: String,
    pub state_root: String,
    pub extrinsics_root: String,
    /// Session validator that claimed the slot; `None` for genesis
    pub author: Option<String>,
    pub is_epoch_start: bool,
    /// `Timestamp::Now` at the block, in milliseconds
    pub timestamp_ms: i64,
}

/// Chain-wide counters captured once per session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainAggregates {
    pub total_issuance: BigUint,
    pub total_emission: BigUint,
    pub active_accounts: u64,
}

/// Stream of new heads; only the most recent head is guaranteed to arrive
pub type HeadStream = Pin<Box<dyn Stream<Item = HeadNotification> + Send>>;

#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn block_hash(&self, number: u64) -> Result<String>;

    async fn header(&self, hash: &str) -> Result<HeaderInfo>;

    async fn counters_at(&self, hash: &str) -> Result<SessionCounters>;

    async fn chain_aggregates(&self, hash: &str) -> Result<ChainAggregates>;

    /// Current best head
    async fn best_head(&self) -> Result<HeadNotification>;

    /// Number of the latest finalized block
    async fn finalized_number(&self) -> Result<u64>;

    async fn subscribe_new_heads(&self) -> Result<HeadStream>;
}
