//! Finality reconciliation for rows stored ahead of the finalized head

use crate::chain::NodeApi;
use crate::db::LedgerWriter;
use anyhow::Result;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalityReport {
    pub finalized: usize,
    /// Rows whose hash lost a reorg; their numbers are gaps again
    pub discarded: usize,
}

/// Finalize every unfinalized row at or below `finalized` whose hash is the
/// canonical one, and drop the rest so the gap scan re-harvests them.
pub async fn reconcile_finality<N>(
    node: &N,
    writer: &LedgerWriter,
    finalized: u64,
) -> Result<FinalityReport>
where
    N: NodeApi + ?Sized,
{
    let mut report = FinalityReport::default();

    for (number, stored_hash) in writer.unfinalized_hashes(finalized).await? {
        let canonical = node.block_hash(number).await?;

        if canonical == stored_hash {
            if writer.finalize_block(number, stored_hash).await? {
                report.finalized += 1;
            }
        } else {
            warn!(
                block = number,
                stored = %stored_hash,
                canonical = %canonical,
                "Stored block is not on the finalized chain, discarding"
            );
            if writer.discard_block(number, stored_hash).await? {
                report.discarded += 1;
            }
        }
    }

    if report.finalized > 0 {
        debug!("Marked {} blocks as finalized (up to #{})", report.finalized, finalized);
    }

    Ok(report)
}
