//! Backfill command - one pass of gap detection and harvesting

use crate::chain::{NodeApi, SubstrateNode};
use crate::config::Config;
use crate::daemon::ShutdownSignals;
use crate::db::{Database, LedgerWriter};
use crate::ingest::{
    detect_gaps, missing_blocks, reconcile_finality, BackfillHarvester, BackfillReport,
};
use crate::rpc::RpcClient;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Backfill command arguments
#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Node RPC endpoint URL
    #[arg(short, long)]
    pub rpc_url: Option<String>,

    /// SQLite database path
    #[arg(short, long)]
    pub db_path: Option<PathBuf>,

    /// Gaps harvested concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Only backfill up to the finalized head
    #[arg(long)]
    pub finalized_only: bool,
}

/// Node and store handles shared by the sync and backfill commands
pub(crate) struct Ledger {
    pub node: Arc<SubstrateNode>,
    pub writer: LedgerWriter,
}

impl Ledger {
    /// Open the store and check that the node answers; both are fatal
    pub(crate) async fn connect(config: &Config) -> Result<Self> {
        let db_path = PathBuf::from(&config.database.path);
        let db = Database::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        info!("Database opened: {}", db_path.display());

        let rpc = RpcClient::with_timeout(&config.rpc.url, config.rpc.timeout_ms);
        let node = SubstrateNode::new(
            rpc,
            config.chain.constants(),
            Duration::from_secs(config.sync.poll_interval_secs),
        );

        let head = node
            .best_head()
            .await
            .with_context(|| format!("Cannot reach node at {}", config.rpc.url))?;
        info!("Connected to {} (best block #{})", config.rpc.url, head.number);

        Ok(Self {
            node: Arc::new(node),
            writer: LedgerWriter::new(Arc::new(db)),
        })
    }
}

/// Reconcile rows at or below the finalized head, scan for gaps up to the
/// current head and harvest them
pub(crate) async fn backfill_pass<N>(
    node: &N,
    writer: &LedgerWriter,
    harvester: &BackfillHarvester<N>,
    workers: usize,
    finalized_only: bool,
) -> Result<BackfillReport>
where
    N: NodeApi + ?Sized,
{
    let finalized = node.finalized_number().await?;
    let known_head = if finalized_only {
        finalized
    } else {
        node.best_head().await?.number
    };

    let finality = reconcile_finality(node, writer, finalized).await?;
    if finality.discarded > 0 {
        info!(
            "Discarded {} block(s) from abandoned forks at or below #{}",
            finality.discarded, finalized
        );
    }

    let mut stored = writer.block_numbers().await?;
    // Rows above the target are live-head rows; they must not open gaps
    // beyond the finalized head
    stored.retain(|&n| n <= known_head);
    let gaps = detect_gaps(&stored, Some(known_head));
    if gaps.is_empty() {
        debug!("No gaps up to #{}", known_head);
        return Ok(BackfillReport::default());
    }

    info!(
        "Found {} gap(s), {} missing block(s) up to #{}",
        gaps.len(),
        missing_blocks(&gaps),
        known_head
    );

    Ok(harvester.harvest_all(gaps, workers).await)
}

/// Run the backfill command
pub async fn run(args: BackfillArgs) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = args.rpc_url {
        config.rpc.url = url;
    }
    if let Some(path) = args.db_path {
        config.database.path = path.display().to_string();
    }
    if let Some(workers) = args.workers {
        config.sync.backfill_workers = workers;
    }
    config.sync.finalized_only |= args.finalized_only;
    config.validate()?;

    let ledger = Ledger::connect(&config).await?;

    let cancel = CancellationToken::new();
    let _signals = ShutdownSignals::install(cancel.clone())?;

    let harvester = BackfillHarvester::new(
        Arc::clone(&ledger.node),
        ledger.writer.clone(),
        config.rpc.retry_config(),
        cancel,
    );

    let report = backfill_pass(
        &*ledger.node,
        &ledger.writer,
        &harvester,
        config.sync.backfill_workers,
        config.sync.finalized_only,
    )
    .await?;

    info!(
        "Backfill finished: {} block(s) written, {} gap(s) completed",
        report.blocks_written, report.gaps_completed
    );

    if report.gaps_cancelled > 0 {
        warn!("{} gap(s) interrupted by shutdown", report.gaps_cancelled);
    }
    if report.gaps_abandoned > 0 {
        anyhow::bail!(
            "{} gap(s) abandoned after errors; rerun to retry them",
            report.gaps_abandoned
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RetryConfig;
    use crate::testing::{block_record, MockNode};

    fn setup(head: u64) -> (Arc<MockNode>, LedgerWriter, BackfillHarvester<MockNode>) {
        let node = Arc::new(MockNode::with_chain(head));
        let writer = LedgerWriter::new(Arc::new(Database::open_in_memory().unwrap()));
        let retry = RetryConfig {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
        };
        let harvester = BackfillHarvester::new(
            Arc::clone(&node),
            writer.clone(),
            retry,
            CancellationToken::new(),
        );
        (node, writer, harvester)
    }

    #[tokio::test]
    async fn test_empty_ledger_is_seeded_from_head() {
        let (node, writer, harvester) = setup(12);

        let report = backfill_pass(&*node, &writer, &harvester, 2, false).await.unwrap();

        assert_eq!(report.blocks_written, 13);
        assert_eq!(writer.block_numbers().await.unwrap(), (0..=12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pass_marks_previously_unfinalized_blocks() {
        let (node, writer, harvester) = setup(5);
        for n in 0..=5 {
            writer.write_block(block_record(n)).await.unwrap();
        }
        assert_eq!(writer.database().count_finalized_blocks().unwrap(), 0);

        let report = backfill_pass(&*node, &writer, &harvester, 1, true).await.unwrap();

        assert_eq!(report, BackfillReport::default());
        assert_eq!(writer.database().count_finalized_blocks().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_fork_block_below_finalized_is_replaced() {
        let (node, writer, harvester) = setup(10);
        let mut fork = block_record(5);
        fork.block_hash = "0xfork".to_string();
        writer.write_block(fork).await.unwrap();

        backfill_pass(&*node, &writer, &harvester, 1, false).await.unwrap();

        let db = writer.database();
        let block5 = db.get_block(5).unwrap().unwrap();
        let block6 = db.get_block(6).unwrap().unwrap();
        assert_eq!(block5.block_hash, MockNode::hash_of(5));
        assert!(block5.is_finalized);
        assert_eq!(block6.parent_hash, block5.block_hash);
        assert_eq!(writer.block_numbers().await.unwrap(), (0..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_finalized_only_ignores_rows_above_finalized() {
        let (node, writer, harvester) = setup(10);
        node.set_finalized(4);
        writer.write_block(block_record(9)).await.unwrap();

        let report = backfill_pass(&*node, &writer, &harvester, 1, true).await.unwrap();

        assert_eq!(report.blocks_written, 5);
        assert_eq!(writer.block_numbers().await.unwrap(), vec![0, 1, 2, 3, 4, 9]);
        assert_eq!(writer.database().count_finalized_blocks().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_abandoned_gap_is_found_again() {
        let (node, writer, harvester) = setup(8);
        node.fail_block(4, 10);

        let first = backfill_pass(&*node, &writer, &harvester, 1, false).await.unwrap();
        assert_eq!(first.gaps_abandoned, 1);
        assert_eq!(writer.block_numbers().await.unwrap(), vec![0, 1, 2, 3]);

        node.fail_block(4, 0);
        let second = backfill_pass(&*node, &writer, &harvester, 1, false).await.unwrap();
        assert_eq!(second.blocks_written, 5);
        assert_eq!(writer.block_numbers().await.unwrap(), (0..=8).collect::<Vec<_>>());
    }
}
