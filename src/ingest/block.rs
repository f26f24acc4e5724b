//! Compose a ledger row for one block from node data

use super::error::IngestError;
use super::progress::{compute_progress, ProgressError};
use crate::chain::NodeApi;
use crate::db::BlockRecord;
use anyhow::anyhow;
use num_bigint::BigUint;

fn counter_u64(value: &BigUint, name: &'static str) -> Result<u64, IngestError> {
    u64::try_from(value).map_err(|_| IngestError::Computation(ProgressError::MalformedCounters(name)))
}

/// Fetch hash, header and counters for `number` and derive its progress.
///
/// `finalized` is the latest finalized block number known to the caller.
pub async fn fetch_block_record<N>(
    node: &N,
    number: u64,
    finalized: Option<u64>,
) -> Result<BlockRecord, IngestError>
where
    N: NodeApi + ?Sized,
{
    let hash = node.block_hash(number).await.map_err(IngestError::Node)?;
    let header = node.header(&hash).await.map_err(IngestError::Node)?;

    if header.number != number {
        return Err(IngestError::Node(anyhow!(
            "Node returned header #{} for block #{} ({})",
            header.number,
            number,
            hash
        )));
    }

    let counters = node.counters_at(&hash).await.map_err(IngestError::Node)?;
    let progress = compute_progress(&counters)?;

    Ok(BlockRecord {
        block_number: number,
        block_hash: hash,
        parent_hash: header.parent_hash,
        extrinsics_root: header.extrinsics_root,
        state_root: header.state_root,
        author: header.author,
        is_finalized: finalized.is_some_and(|f| number <= f),
        timestamp: header.timestamp_ms,
        session_index: counter_u64(&counters.current_index, "session index exceeds 64 bits")?,
        epoch_index: counter_u64(&counters.epoch_index, "epoch index exceeds 64 bits")?,
        era_length: progress.era_length,
        session_progress: progress.session_progress,
        era_progress: progress.era_progress,
        is_epoch_start: header.is_epoch_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNode;

    #[tokio::test]
    async fn test_record_carries_header_and_progress() {
        let node = MockNode::with_chain(10);
        let record = fetch_block_record(&node, 4, Some(3)).await.unwrap();

        assert_eq!(record.block_number, 4);
        assert_eq!(record.block_hash, MockNode::hash_of(4));
        assert_eq!(record.parent_hash, MockNode::hash_of(3));
        assert!(!record.is_finalized);
        assert_eq!(record.session_progress, BigUint::from(4u32));

        let finalized = fetch_block_record(&node, 3, Some(3)).await.unwrap();
        assert!(finalized.is_finalized);
    }

    #[tokio::test]
    async fn test_negative_progress_is_computation_error() {
        let node = MockNode::with_chain(10);
        node.corrupt_counters(6);

        let err = fetch_block_record(&node, 6, None).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Computation(ProgressError::SlotBeforeEpochStart { .. })
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unknown_block_is_node_error() {
        let node = MockNode::with_chain(3);
        let err = fetch_block_record(&node, 50, None).await.unwrap_err();
        assert!(err.is_transient());
    }
}
