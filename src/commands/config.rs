//! Config command - inspect and validate configuration

use crate::config::Config;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration (file, environment and defaults merged)
    Show,

    /// Load and validate the configuration
    Validate,

    /// Print an annotated example configuration file
    Example,

    /// Show configuration file search paths
    Paths,
}

pub async fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => run_show(),
        ConfigCommands::Validate => run_validate(),
        ConfigCommands::Example => run_example(),
        ConfigCommands::Paths => run_paths(),
    }
}

fn run_show() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    println!("# Effective configuration");
    println!("# Priority: CLI flags > Environment variables > Config file > Defaults\n");
    println!("{}", toml::to_string_pretty(&config)?);

    let era_length = config.chain.epoch_duration * u64::from(config.chain.sessions_per_era);
    println!("# Era length: {} slots", era_length);

    Ok(())
}

fn run_validate() -> Result<()> {
    match Config::config_file_paths().into_iter().find(|p| p.exists()) {
        Some(path) => println!("Found config file: {}", path.display()),
        None => {
            println!("{}\n", Config::config_not_found_help());
            println!("Validating defaults and environment overrides...");
        }
    }

    match Config::load().and_then(|config| config.validate()) {
        Ok(()) => {
            println!("✓ Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration is invalid: {:#}", e);
            Err(e)
        }
    }
}

fn run_example() -> Result<()> {
    println!(
        r#"# pledger configuration file
#
# Location priority (first found is used):
#   1. ./pledger.toml (current directory)
#   2. ~/.config/pledger/config.toml (user config)
#   3. /etc/pledger/config.toml (system-wide)
#
# Override priority: CLI flags > Environment variables > Config file > Defaults
#
# Environment variables: PLEDGER_RPC_URL, PLEDGER_RPC_TIMEOUT_MS, PLEDGER_DB_PATH,
#   PLEDGER_POLL_INTERVAL, PLEDGER_BACKFILL_WORKERS, PLEDGER_RESCAN_INTERVAL,
#   PLEDGER_EPOCH_DURATION, PLEDGER_SESSIONS_PER_ERA, PLEDGER_PID_FILE
#
# [chain] must match the runtime: babe.epochDuration and staking.sessionsPerEra.
# record_head_blocks is ignored when finalized_only is set.
# Set [daemon] pid_file to write a PID file during sync.
"#
    );
    println!("{}", Config::example_toml());

    Ok(())
}

fn run_paths() -> Result<()> {
    println!("Configuration file search paths (first found is used):\n");

    for (i, path) in Config::config_file_paths().iter().enumerate() {
        let exists = if path.exists() { "✓ EXISTS" } else { "" };
        println!("{}. {} {}", i + 1, path.display(), exists);
    }

    Ok(())
}
