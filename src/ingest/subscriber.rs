//! Live head subscription: session snapshots and head blocks

use super::block::fetch_block_record;
use super::error::IngestError;
use super::guard::IngestionGuard;
use super::progress::{compute_progress, ProgressError};
use crate::chain::{HeadNotification, NodeApi};
use crate::db::{LedgerWriter, SnapshotRecord};
use crate::rpc::{retry_with_backoff, RetryConfig, RetryOutcome};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of comparing a head's session with the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Nothing was stored yet; the first snapshot was written
    Bootstrapped { session_index: u64 },
    /// Session advanced and a snapshot was written
    Advanced { from: u64, to: u64 },
    /// Session not above the latest stored one
    Unchanged { session_index: u64 },
    /// Another writer stored this session (or a later one) first
    Superseded { session_index: u64 },
}

pub struct LiveHeadSubscriber<N: ?Sized> {
    node: Arc<N>,
    writer: LedgerWriter,
    guard: IngestionGuard,
    retry: RetryConfig,
    record_head_blocks: bool,
}

impl<N> LiveHeadSubscriber<N>
where
    N: NodeApi + ?Sized + 'static,
{
    pub fn new(
        node: Arc<N>,
        writer: LedgerWriter,
        retry: RetryConfig,
        record_head_blocks: bool,
    ) -> Self {
        Self {
            node,
            writer,
            guard: IngestionGuard::new(),
            retry,
            record_head_blocks,
        }
    }

    /// Compare the session at `head` with the ledger and write a snapshot
    /// if it advanced (or if the ledger has none yet)
    pub async fn observe(&self, head: &HeadNotification) -> Result<Observation, IngestError> {
        let counters = self
            .node
            .counters_at(&head.hash)
            .await
            .map_err(IngestError::Node)?;
        let progress = compute_progress(&counters)?;
        let session_index = u64::try_from(&counters.current_index).map_err(|_| {
            IngestError::Computation(ProgressError::MalformedCounters(
                "session index exceeds 64 bits",
            ))
        })?;

        debug!(
            block = head.number,
            session_index,
            epoch_start_slot = %progress.epoch_start_slot,
            session_progress = %progress.session_progress,
            era_progress = %progress.era_progress,
            "Observed head"
        );

        let last = self
            .writer
            .latest_session_index()
            .await
            .map_err(IngestError::Store)?;

        if let Some(last) = last.filter(|&last| session_index <= last) {
            if session_index < last {
                warn!(
                    "Head #{} reports session {} behind stored session {}",
                    head.number, session_index, last
                );
            }
            return Ok(Observation::Unchanged { session_index });
        }

        let aggregates = self
            .node
            .chain_aggregates(&head.hash)
            .await
            .map_err(IngestError::Node)?;

        let record = SnapshotRecord {
            block_height: head.number,
            session_index,
            total_issuance: aggregates.total_issuance,
            total_emission: aggregates.total_emission,
            active_accounts: aggregates.active_accounts,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let inserted = self
            .writer
            .write_snapshot(record)
            .await
            .map_err(IngestError::Store)?;

        Ok(match (inserted, last) {
            (false, _) => Observation::Superseded { session_index },
            (true, None) => Observation::Bootstrapped { session_index },
            (true, Some(from)) => Observation::Advanced {
                from,
                to: session_index,
            },
        })
    }

    /// Store the head block itself; gaps left by failures are backfilled later
    async fn record_head(&self, head: &HeadNotification) {
        let result = match fetch_block_record(&*self.node, head.number, None).await {
            Ok(record) => self.writer.write_block(record).await.map_err(IngestError::Store),
            Err(e) => Err(e),
        };

        match result {
            Ok(true) => debug!("Stored head block #{}", head.number),
            Ok(false) => debug!("Head block #{} already stored", head.number),
            Err(e) => warn!("Failed to store head block #{}: {}", head.number, e),
        }
    }

    async fn process(&self, head: HeadNotification, cancel: &CancellationToken) {
        if self.record_head_blocks {
            self.record_head(&head).await;
        }

        let outcome = retry_with_backoff(
            &self.retry,
            cancel,
            |_| self.observe(&head),
            |_, e: &IngestError| e.disposition(),
        )
        .await;

        match outcome {
            Ok(Observation::Bootstrapped { session_index }) => {
                info!("First chain snapshot stored at session {} (block #{})", session_index, head.number)
            }
            Ok(Observation::Advanced { from, to }) => {
                info!("Session {} -> {}, chain snapshot stored at block #{}", from, to, head.number)
            }
            Ok(Observation::Unchanged { .. }) => {}
            Ok(Observation::Superseded { session_index }) => {
                debug!("Session {} already stored by another writer", session_index)
            }
            Err(RetryOutcome::Cancelled) => {
                debug!("Snapshot for head #{} abandoned on shutdown", head.number)
            }
            Err(RetryOutcome::Failed { error, attempts }) => error!(
                block = head.number,
                hash = %head.hash,
                attempts,
                "Rejected head notification: {}",
                error
            ),
        }
    }

    /// Admit `head` if idle and process it on a new task; `None` if dropped
    pub fn dispatch(
        self: &Arc<Self>,
        head: HeadNotification,
        cancel: &CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let Some(permit) = self.guard.try_enter() else {
            debug!(
                guard = ?self.guard.state(),
                "Dropping head #{}, previous head still processing",
                head.number
            );
            return None;
        };

        let this = Arc::clone(self);
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            let _permit = permit;
            this.process(head, &cancel).await;
        }))
    }

    /// Consume new heads until `cancel` fires, then wait for the in-flight
    /// notification to finish its writes.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let mut heads = self
            .node
            .subscribe_new_heads()
            .await
            .context("Failed to subscribe to new heads")?;
        info!("Subscribed to new heads");

        let mut in_flight: Option<JoinHandle<()>> = None;

        match self.node.best_head().await {
            Ok(head) => in_flight = self.dispatch(head, &cancel),
            Err(e) => warn!("Could not read best head for initial snapshot: {:#}", e),
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = heads.next() => match next {
                    Some(head) => {
                        if let Some(handle) = self.dispatch(head, &cancel) {
                            in_flight = Some(handle);
                        }
                    }
                    None => {
                        warn!("New head stream ended");
                        break;
                    }
                },
            }
        }

        drop(heads);
        if let Some(handle) = in_flight {
            debug!("Waiting for in-flight head to finish");
            if let Err(e) = handle.await {
                error!("Head processing task failed: {}", e);
            }
        }
        info!("Live head subscription stopped");
        Ok(())
    }
}
