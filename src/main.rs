mod chain;
mod commands;
mod config;
mod daemon;
mod db;
mod ingest;
mod rpc;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{BackfillArgs, ConfigArgs, QueryArgs, SyncArgs};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// pledger - block and session ledger for Substrate chains
#[derive(Parser, Debug)]
#[command(name = "pledger")]
#[command(version, about = "Mirror a Substrate chain's blocks and session counters into SQLite")]
struct Cli {
    /// Enable verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Backfill missing blocks, then follow new heads until interrupted
    Sync(SyncArgs),

    /// Fill missing block ranges once and exit
    Backfill(BackfillArgs),

    /// Inspect the stored ledger
    Query(QueryArgs),

    /// Show, validate or generate configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Sync(args) => commands::sync::run(args).await,
        Commands::Backfill(args) => commands::backfill::run(args).await,
        Commands::Query(args) => commands::query::run(args).await,
        Commands::Config(args) => commands::config::run(args).await,
    }
}
