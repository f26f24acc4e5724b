use super::digest::{extract_babe_pre_digest, is_epoch_start};
use super::scale::{decode_account_ids, decode_hex, decode_uint};
use super::storage::{self, StorageItem};
use super::{ChainAggregates, HeadNotification, HeadStream, HeaderInfo, NodeApi};
use crate::ingest::SessionCounters;
use crate::rpc::{BlockHeader, RpcClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Page size for `state_getKeysPaged` when counting accounts
const KEYS_PAGE_SIZE: u32 = 1000;

/// Runtime constants that are not exposed through storage
#[derive(Debug, Clone, Copy)]
pub struct ChainConstants {
    pub epoch_duration: u64,
    pub sessions_per_era: u32,
}

/// [`NodeApi`] over a Substrate node's JSON-RPC endpoint
#[derive(Clone)]
pub struct SubstrateNode {
    rpc: RpcClient,
    constants: ChainConstants,
    poll_interval: Duration,
}

impl SubstrateNode {
    pub fn new(rpc: RpcClient, constants: ChainConstants, poll_interval: Duration) -> Self {
        Self {
            rpc,
            constants,
            poll_interval,
        }
    }

    async fn storage(&self, item: StorageItem, at: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<String> = self
            .rpc
            .call_optional("state_getStorage", vec![item.key().as_str(), at])
            .await
            .with_context(|| format!("Failed to read {}.{} at {}", item.pallet, item.item, at))?;
        value.map(|v| decode_hex(&v)).transpose()
    }

    async fn storage_uint(&self, item: StorageItem, at: &str) -> Result<BigUint> {
        let bytes = self.storage(item, at).await?;
        decode_uint(bytes.as_deref(), item.width)
            .with_context(|| format!("Failed to decode {}.{}", item.pallet, item.item))
    }

    async fn raw_header(&self, hash: Option<&str>) -> Result<BlockHeader> {
        let params: Vec<&str> = hash.into_iter().collect();
        self.rpc.call("chain_getHeader", params).await
    }

    async fn resolve_author(&self, header: &BlockHeader, hash: &str) -> Result<Option<String>> {
        let Some(pre_digest) = extract_babe_pre_digest(header.logs()) else {
            return Ok(None);
        };

        let validators = match self.storage(storage::SESSION_VALIDATORS, hash).await? {
            Some(bytes) => decode_account_ids(&bytes)?,
            None => Vec::new(),
        };

        let author = validators.get(pre_digest.authority_index as usize).cloned();
        if author.is_none() {
            warn!(
                "Authority index {} out of range ({} validators) at {}",
                pre_digest.authority_index,
                validators.len(),
                hash
            );
        }
        Ok(author)
    }

    async fn count_accounts(&self, at: &str) -> Result<u64> {
        let prefix = storage::SYSTEM_ACCOUNT.key();
        let mut start_key: Option<String> = None;
        let mut total = 0u64;

        loop {
            let page: Vec<String> = self
                .rpc
                .call(
                    "state_getKeysPaged",
                    json!([&prefix, KEYS_PAGE_SIZE, &start_key, at]),
                )
                .await
                .context("Failed to page System.Account keys")?;

            total += page.len() as u64;
            if page.len() < KEYS_PAGE_SIZE as usize {
                return Ok(total);
            }
            start_key = page.last().cloned();
        }
    }
}

#[async_trait]
impl NodeApi for SubstrateNode {
    async fn block_hash(&self, number: u64) -> Result<String> {
        let hash: Option<String> = self
            .rpc
            .call_optional("chain_getBlockHash", vec![number])
            .await?;
        hash.with_context(|| format!("Block {} not known to node", number))
    }

    async fn header(&self, hash: &str) -> Result<HeaderInfo> {
        let header = self
            .raw_header(Some(hash))
            .await
            .with_context(|| format!("Failed to get header {}", hash))?;

        let (author, timestamp) = tokio::try_join!(
            self.resolve_author(&header, hash),
            self.storage_uint(storage::TIMESTAMP_NOW, hash),
        )?;

        Ok(HeaderInfo {
            number: header.block_number()?,
            is_epoch_start: is_epoch_start(header.logs()),
            parent_hash: header.parent_hash,
            state_root: header.state_root,
            extrinsics_root: header.extrinsics_root,
            author,
            timestamp_ms: i64::try_from(timestamp).context("Block timestamp out of range")?,
        })
    }

    async fn counters_at(&self, hash: &str) -> Result<SessionCounters> {
        let (epoch_index, genesis_slot, current_slot, current_index, era_start) = tokio::try_join!(
            self.storage_uint(storage::EPOCH_INDEX, hash),
            self.storage_uint(storage::GENESIS_SLOT, hash),
            self.storage_uint(storage::CURRENT_SLOT, hash),
            self.storage_uint(storage::SESSION_INDEX, hash),
            self.storage_uint(storage::ERA_START_SESSION_INDEX, hash),
        )?;

        Ok(SessionCounters {
            epoch_duration: self.constants.epoch_duration.into(),
            sessions_per_era: self.constants.sessions_per_era.into(),
            epoch_index,
            genesis_slot,
            current_slot,
            current_index,
            current_era_start_session_index: era_start,
        })
    }

    async fn chain_aggregates(&self, hash: &str) -> Result<ChainAggregates> {
        let (total_issuance, total_emission, active_accounts) = tokio::try_join!(
            self.storage_uint(storage::TOTAL_ISSUANCE, hash),
            self.storage_uint(storage::EMISSION_SUPPLY, hash),
            self.count_accounts(hash),
        )?;

        Ok(ChainAggregates {
            total_issuance,
            total_emission,
            active_accounts,
        })
    }

    async fn best_head(&self) -> Result<HeadNotification> {
        let hash: String = self
            .rpc
            .call("chain_getBlockHash", Vec::<()>::new())
            .await
            .context("Failed to get best block hash")?;
        let header = self.raw_header(Some(&hash)).await?;
        Ok(HeadNotification {
            number: header.block_number()?,
            hash,
        })
    }

    async fn finalized_number(&self) -> Result<u64> {
        let hash: String = self
            .rpc
            .call("chain_getFinalizedHead", Vec::<()>::new())
            .await
            .context("Failed to get finalized head")?;
        self.raw_header(Some(&hash)).await?.block_number()
    }

    /// Poll the best head and forward changes through a single-slot channel.
    ///
    /// A head that cannot be delivered because the consumer still holds the
    /// previous one is retried on the next tick, so the latest head always
    /// arrives eventually.
    async fn subscribe_new_heads(&self) -> Result<HeadStream> {
        let (tx, rx) = mpsc::channel(1);
        let node = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(node.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_sent: Option<HeadNotification> = None;

            loop {
                ticker.tick().await;

                let head = match node.best_head().await {
                    Ok(head) => head,
                    Err(e) => {
                        warn!("Failed to poll best head: {:#}", e);
                        continue;
                    }
                };

                if last_sent.as_ref() == Some(&head) {
                    continue;
                }

                match tx.try_send(head.clone()) {
                    Ok(()) => last_sent = Some(head),
                    Err(TrySendError::Full(_)) => {
                        debug!("Head #{} not delivered, consumer busy", head.number);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Head subscription closed");
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
