//! Backfill of missing block ranges

use super::block::fetch_block_record;
use super::error::IngestError;
use super::gaps::Gap;
use crate::chain::NodeApi;
use crate::db::LedgerWriter;
use crate::rpc::{retry_with_backoff, RetryConfig, RetryOutcome};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a single gap ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapOutcome {
    /// Every block in the gap is now stored
    Completed { written: u64, already_present: u64 },
    /// Gave up at `failed_at`; it and everything after it in the gap stay absent
    Abandoned { failed_at: u64, written: u64 },
    /// Shutdown requested; blocks from `next` on were not attempted
    Cancelled { next: u64, written: u64 },
}

/// Totals over one backfill pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub gaps_completed: usize,
    pub gaps_abandoned: usize,
    pub gaps_cancelled: usize,
    pub blocks_written: u64,
}

impl BackfillReport {
    fn record(&mut self, outcome: &GapOutcome) {
        match *outcome {
            GapOutcome::Completed { written, .. } => {
                self.gaps_completed += 1;
                self.blocks_written += written;
            }
            GapOutcome::Abandoned { written, .. } => {
                self.gaps_abandoned += 1;
                self.blocks_written += written;
            }
            GapOutcome::Cancelled { written, .. } => {
                self.gaps_cancelled += 1;
                self.blocks_written += written;
            }
        }
    }
}

/// Fills gaps block by block, strictly ascending within each gap
pub struct BackfillHarvester<N: ?Sized> {
    node: Arc<N>,
    writer: LedgerWriter,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl<N> BackfillHarvester<N>
where
    N: NodeApi + ?Sized,
{
    pub fn new(
        node: Arc<N>,
        writer: LedgerWriter,
        retry: RetryConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node,
            writer,
            retry,
            cancel,
        }
    }

    /// Fetch and write one block, retrying transient failures
    async fn harvest_block(&self, number: u64, finalized: Option<u64>) -> Result<bool, RetryOutcome<IngestError>> {
        retry_with_backoff(
            &self.retry,
            &self.cancel,
            |attempt| async move {
                if attempt > 1 {
                    debug!("Retrying block #{} (attempt {})", number, attempt);
                }
                let record = fetch_block_record(&*self.node, number, finalized).await?;
                self.writer
                    .write_block(record)
                    .await
                    .map_err(IngestError::Store)
            },
            |_, e: &IngestError| e.disposition(),
        )
        .await
    }

    /// Process `gap.start..=gap.end` in order, stopping at the first block
    /// that cannot be written.
    pub async fn harvest_gap(&self, gap: Gap) -> GapOutcome {
        info!("Harvesting gap {} ({} blocks)", gap, gap.len());

        let finalized = match self.node.finalized_number().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Could not read finalized head, storing gap {} as unfinalized: {:#}", gap, e);
                None
            }
        };

        let mut written = 0;
        let mut already_present = 0;

        for number in gap.start..=gap.end {
            if self.cancel.is_cancelled() {
                info!("Gap {} interrupted before block #{}", gap, number);
                return GapOutcome::Cancelled { next: number, written };
            }

            match self.harvest_block(number, finalized).await {
                Ok(true) => written += 1,
                Ok(false) => {
                    debug!("Block #{} already stored, skipping", number);
                    already_present += 1;
                }
                Err(RetryOutcome::Cancelled) => {
                    info!("Gap {} interrupted while retrying block #{}", gap, number);
                    return GapOutcome::Cancelled { next: number, written };
                }
                Err(RetryOutcome::Failed { error, attempts }) => {
                    error!(
                        block = number,
                        attempts,
                        transient = error.is_transient(),
                        "Abandoning gap {}: {}",
                        gap,
                        error
                    );
                    return GapOutcome::Abandoned {
                        failed_at: number,
                        written,
                    };
                }
            }
        }

        info!("Gap {} complete ({} written, {} already present)", gap, written, already_present);
        GapOutcome::Completed {
            written,
            already_present,
        }
    }

    /// Harvest every gap, running up to `workers` gaps at once
    pub async fn harvest_all(&self, gaps: Vec<Gap>, workers: usize) -> BackfillReport {
        let mut report = BackfillReport::default();

        let mut outcomes = stream::iter(gaps)
            .map(|gap| self.harvest_gap(gap))
            .buffer_unordered(workers.max(1));

        while let Some(outcome) = outcomes.next().await {
            report.record(&outcome);
        }

        report
    }
}
