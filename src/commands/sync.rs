//! Sync command - backfill the ledger and follow new heads until shutdown

use super::backfill::{backfill_pass, Ledger};
use crate::chain::NodeApi;
use crate::config::{Config, SyncConfig};
use crate::daemon::{PidFile, ShutdownSignals};
use crate::db::LedgerWriter;
use crate::ingest::{BackfillHarvester, LiveHeadSubscriber};
use crate::rpc::RetryConfig;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sync command arguments
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Node RPC endpoint URL
    #[arg(short, long)]
    pub rpc_url: Option<String>,

    /// SQLite database path
    #[arg(short, long)]
    pub db_path: Option<PathBuf>,

    /// Seconds between new head polls
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Gaps harvested concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Seconds between gap rescans
    #[arg(long)]
    pub rescan_interval: Option<u64>,

    /// Only backfill up to the finalized head
    #[arg(long)]
    pub finalized_only: bool,

    /// PID file path
    #[arg(long)]
    pub pid_file: Option<PathBuf>,
}

impl SyncArgs {
    /// CLI flags take priority over environment and config file
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.rpc_url {
            config.rpc.url = url;
        }
        if let Some(path) = self.db_path {
            config.database.path = path.display().to_string();
        }
        if let Some(interval) = self.poll_interval {
            config.sync.poll_interval_secs = interval;
        }
        if let Some(workers) = self.workers {
            config.sync.backfill_workers = workers;
        }
        if let Some(interval) = self.rescan_interval {
            config.sync.rescan_interval_secs = interval;
        }
        if let Some(pid_file) = self.pid_file {
            config.daemon.pid_file = Some(pid_file.display().to_string());
        }
        config.sync.finalized_only |= self.finalized_only;
    }
}

/// Run the sync command
pub async fn run(args: SyncArgs) -> Result<()> {
    let mut config = Config::load()?;
    args.apply(&mut config);
    config.validate()?;

    info!("Starting ledger sync");
    info!("RPC endpoint: {}", config.rpc.url);

    let _pid_file = match config.daemon.pid_file {
        Some(ref path) => Some(PidFile::create(Path::new(path))?),
        None => None,
    };

    let ledger = Ledger::connect(&config).await?;

    let cancel = CancellationToken::new();
    let _signals = ShutdownSignals::install(cancel.clone())?;

    let result = follow_chain(
        Arc::clone(&ledger.node),
        ledger.writer.clone(),
        &config.sync,
        config.rpc.retry_config(),
        cancel,
    )
    .await;

    let total = ledger.writer.database().count_blocks()?;
    info!("Sync stopped ({} blocks in ledger)", total);

    result
}

/// Run the live subscriber alongside periodic backfill passes until `cancel`
/// fires or the subscription ends. A failed subscription is returned as an
/// error.
pub(crate) async fn follow_chain<N>(
    node: Arc<N>,
    writer: LedgerWriter,
    sync: &SyncConfig,
    retry: RetryConfig,
    cancel: CancellationToken,
) -> Result<()>
where
    N: NodeApi + ?Sized + 'static,
{
    // Head rows are unfinalized by definition
    let record_head_blocks = sync.record_head_blocks && !sync.finalized_only;

    let subscriber = Arc::new(LiveHeadSubscriber::new(
        Arc::clone(&node),
        writer.clone(),
        retry.clone(),
        record_head_blocks,
    ));
    let mut live = tokio::spawn(subscriber.run(cancel.clone()));

    let harvester = BackfillHarvester::new(Arc::clone(&node), writer.clone(), retry, cancel.clone());

    info!(
        "Backfilling with {} worker(s), rescanning every {}s",
        sync.backfill_workers, sync.rescan_interval_secs
    );
    let mut rescan = time::interval(Duration::from_secs(sync.rescan_interval_secs.max(1)));
    rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut live_exit = None;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = &mut live => {
                live_exit = Some(live_outcome(result));
                cancel.cancel();
                break;
            }
            _ = rescan.tick() => {
                match backfill_pass(
                    &*node,
                    &writer,
                    &harvester,
                    sync.backfill_workers,
                    sync.finalized_only,
                )
                .await
                {
                    Ok(report) if report.blocks_written > 0 || report.gaps_abandoned > 0 => info!(
                        "Backfill pass: {} block(s) written, {} gap(s) completed, {} abandoned",
                        report.blocks_written, report.gaps_completed, report.gaps_abandoned
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("Backfill pass failed: {:#}", e),
                }
            }
        }
    }

    match live_exit {
        Some(result) => result,
        None => {
            info!("Shutting down, waiting for in-flight head");
            live_outcome(live.await)
        }
    }
}

fn live_outcome(result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match result {
        Ok(outcome) => outcome.context("Live head subscription failed"),
        Err(e) => Err(anyhow!("Live head task panicked: {}", e)),
    }
}
