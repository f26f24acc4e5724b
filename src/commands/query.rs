//! Query command - inspect the stored ledger

use crate::db::Database;
use crate::ingest::{detect_gaps, missing_blocks};
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Query command arguments
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// SQLite database path (defaults to the configured path)
    #[arg(short, long)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: QueryCommands,
}

#[derive(Subcommand, Debug)]
pub enum QueryCommands {
    /// Show ledger statistics
    Stats,

    /// List blocks in a range
    Blocks {
        /// Start block number
        #[arg(short, long)]
        from: Option<u64>,

        /// End block number
        #[arg(short, long)]
        to: Option<u64>,

        /// Number of blocks to show
        #[arg(short, long, default_value_t = 10)]
        limit: u64,
    },

    /// Find missing block ranges
    Gaps,

    /// List the most recent chain snapshots
    Snapshots {
        /// Number of snapshots to show
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
}

/// Run the query command
pub async fn run(args: QueryArgs) -> Result<()> {
    let db_path = match args.db_path {
        Some(path) => path,
        None => PathBuf::from(crate::config::Config::load()?.database.path),
    };
    let db = Database::open(&db_path)?;

    match args.command {
        QueryCommands::Stats => run_stats(&db)?,
        QueryCommands::Blocks { from, to, limit } => run_blocks(&db, from, to, limit.max(1))?,
        QueryCommands::Gaps => run_gaps(&db)?,
        QueryCommands::Snapshots { limit } => run_snapshots(&db, limit)?,
    }

    Ok(())
}

fn run_stats(db: &Database) -> Result<()> {
    let total_blocks = db.count_blocks()?;
    let finalized_blocks = db.count_finalized_blocks()?;

    info!("Ledger Statistics");
    info!("─────────────────────────────────────────");
    info!("Total blocks:     {}", total_blocks);
    info!("Finalized blocks: {}", finalized_blocks);
    info!("Unfinalized:      {}", total_blocks.saturating_sub(finalized_blocks));

    if let Some(max_block) = db.get_max_block_number()? {
        if let Some(latest) = db.get_block(max_block)? {
            info!("─────────────────────────────────────────");
            info!("Highest block:    #{}", latest.block_number);
            info!("  Session:        {}", latest.session_index);
            info!("  Epoch:          {}", latest.epoch_index);
            info!("  Era progress:   {}/{}", latest.era_progress, latest.era_length);
        }
    }

    let gaps = detect_gaps(&db.get_block_numbers()?, None);
    if gaps.is_empty() {
        info!("Gaps:             None (continuous)");
    } else {
        info!(
            "Gaps:             {} gap(s), {} block(s) missing",
            gaps.len(),
            missing_blocks(&gaps)
        );
    }

    info!("─────────────────────────────────────────");
    info!("Chain snapshots:  {}", db.count_snapshots()?);
    if let Some(session) = db.get_latest_session_index()? {
        info!("Latest session:   {}", session);
    }

    Ok(())
}

fn run_blocks(db: &Database, from: Option<u64>, to: Option<u64>, limit: u64) -> Result<()> {
    let (start, end) = match (from, to) {
        (Some(f), Some(t)) => (f, t),
        (Some(f), None) => (f, f.saturating_add(limit - 1)),
        (None, Some(t)) => (t.saturating_sub(limit - 1), t),
        (None, None) => {
            // Most recent blocks
            let max = db.get_max_block_number()?.unwrap_or(0);
            (max.saturating_sub(limit - 1), max)
        }
    };

    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    let blocks = db.get_blocks_in_range(start, end, Some(limit.saturating_add(1)))?;

    if blocks.is_empty() {
        info!("No blocks found in range {} - {}", start, end);
        return Ok(());
    }

    info!("Blocks {} - {} ({} found)", start, end, blocks.len());
    info!("─────────────────────────────────────────────────────────────────────────────");
    info!(
        "{:>10} {:>8} {:>8} {:>10} {:>6} {:>6} {:>10}",
        "Block", "Session", "Epoch", "Slot", "Start", "Final", "Hash"
    );
    info!("─────────────────────────────────────────────────────────────────────────────");

    for block in blocks.iter().take(limit as usize) {
        let finalized = if block.is_finalized { "✓" } else { "" };
        let epoch_start = if block.is_epoch_start { "*" } else { "" };
        let hash_short = block.block_hash.get(..12).unwrap_or(&block.block_hash);
        info!(
            "{:>10} {:>8} {:>8} {:>10} {:>6} {:>6} {}...",
            block.block_number,
            block.session_index,
            block.epoch_index,
            block.session_progress.to_string(),
            epoch_start,
            finalized,
            hash_short
        );
    }

    if blocks.len() > limit as usize {
        info!("... and more");
    }

    Ok(())
}

fn run_gaps(db: &Database) -> Result<()> {
    let gaps = detect_gaps(&db.get_block_numbers()?, None);

    if gaps.is_empty() {
        info!("No gaps found - block data is continuous");
        return Ok(());
    }

    info!("Found {} gap(s) in block data:", gaps.len());
    info!("─────────────────────────────────────────");
    info!("{:>12} {:>12} {:>12}", "From", "To", "Missing");
    info!("─────────────────────────────────────────");

    for gap in &gaps {
        info!("{:>12} {:>12} {:>12}", gap.start, gap.end, gap.len());
    }

    info!("─────────────────────────────────────────");
    info!("Total missing blocks: {}", missing_blocks(&gaps));
    info!("");
    info!("To fill gaps, run: pledger backfill");

    Ok(())
}

fn run_snapshots(db: &Database, limit: u32) -> Result<()> {
    let snapshots = db.get_recent_snapshots(limit)?;

    if snapshots.is_empty() {
        info!("No chain snapshots stored yet");
        return Ok(());
    }

    info!("{:>8} {:>10} {:>10} {:>28} {:>20}", "Session", "Block", "Accounts", "Total issuance", "Emission");
    info!("─────────────────────────────────────────────────────────────────────────────");
    for snapshot in &snapshots {
        info!(
            "{:>8} {:>10} {:>10} {:>28} {:>20}",
            snapshot.session_index,
            snapshot.block_height,
            snapshot.active_accounts,
            snapshot.total_issuance.to_string(),
            snapshot.total_emission.to_string()
        );
    }

    Ok(())
}
