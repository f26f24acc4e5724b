//! Configuration management for pledger

use crate::chain::ChainConstants;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Maximum retry attempts for transient failures (0 = no retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_retry_initial_delay")]
    pub retry_initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between new head polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Gaps harvested concurrently
    #[serde(default = "default_backfill_workers")]
    pub backfill_workers: usize,

    /// Seconds between gap rescans while running
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,

    /// Only backfill up to the finalized head
    #[serde(default)]
    pub finalized_only: bool,

    /// Also store each new head block as it arrives
    #[serde(default = "default_true")]
    pub record_head_blocks: bool,
}

/// Runtime constants that the node does not expose through storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Slots per epoch (`babe.epochDuration`)
    #[serde(default = "default_epoch_duration")]
    pub epoch_duration: u64,

    /// Sessions per era (`staking.sessionsPerEra`)
    #[serde(default = "default_sessions_per_era")]
    pub sessions_per_era: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub pid_file: Option<String>,
}

// Default values
fn default_rpc_url() -> String {
    "http://localhost:9933".to_string()
}

fn default_timeout() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay() -> u64 {
    1000 // 1 second
}

fn default_retry_max_delay() -> u64 {
    30000 // 30 seconds
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_db_path() -> String {
    "./pledger.db".to_string()
}

fn default_poll_interval() -> u64 {
    6
}

fn default_backfill_workers() -> usize {
    4
}

fn default_rescan_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_epoch_duration() -> u64 {
    2400 // 4 hours of 6s slots
}

fn default_sessions_per_era() -> u32 {
    6
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_ms: default_timeout(),
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            retry_backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RpcConfig {
    /// Convert to the retry policy used by the harvester and subscriber
    pub fn retry_config(&self) -> crate::rpc::RetryConfig {
        crate::rpc::RetryConfig {
            max_retries: self.max_retries,
            initial_delay_ms: self.retry_initial_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            backfill_workers: default_backfill_workers(),
            rescan_interval_secs: default_rescan_interval(),
            finalized_only: false,
            record_head_blocks: true,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            epoch_duration: default_epoch_duration(),
            sessions_per_era: default_sessions_per_era(),
        }
    }
}

impl ChainConfig {
    pub fn constants(&self) -> ChainConstants {
        ChainConstants {
            epoch_duration: self.epoch_duration,
            sessions_per_era: self.sessions_per_era,
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and defaults
    /// Priority: Environment variables > Config file > Defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some((file_config, config_path)) = Self::load_from_file()? {
            tracing::info!("Loaded configuration from: {}", config_path.display());
            config = file_config;
        } else {
            tracing::info!("Using default configuration (no config file found)");
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from file (searches multiple locations)
    fn load_from_file() -> Result<Option<(Self, PathBuf)>> {
        for path in &Self::config_file_paths() {
            if path.exists() {
                return Self::from_file(path).map(|config| Some((config, path.clone())));
            }
        }

        Ok(None)
    }

    fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get list of config file paths to search (in order of priority)
    pub fn config_file_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Current directory
        paths.push(PathBuf::from("./pledger.toml"));

        // 2. User config directory (~/.config/pledger/config.toml)
        if let Some(proj_dirs) = ProjectDirs::from("io", "polka-ledger", "pledger") {
            paths.push(proj_dirs.config_dir().join("config.toml"));
        }

        // 3. System-wide
        paths.push(PathBuf::from("/etc/pledger/config.toml"));

        paths
    }

    /// Help text printed when no config file exists
    pub fn config_not_found_help() -> String {
        let mut help = String::from("No configuration file found. Searched:\n");
        for path in Self::config_file_paths() {
            help.push_str(&format!("  - {}\n", path.display()));
        }
        help.push_str("Create one with: pledger config example > pledger.toml");
        help
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        // RPC
        if let Some(url) = var("PLEDGER_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(timeout) = parsed(var("PLEDGER_RPC_TIMEOUT_MS")) {
            self.rpc.timeout_ms = timeout;
        }

        // Database
        if let Some(db_path) = var("PLEDGER_DB_PATH") {
            self.database.path = db_path;
        }

        // Sync
        if let Some(interval) = parsed(var("PLEDGER_POLL_INTERVAL")) {
            self.sync.poll_interval_secs = interval;
        }
        if let Some(workers) = parsed(var("PLEDGER_BACKFILL_WORKERS")) {
            self.sync.backfill_workers = workers;
        }
        if let Some(interval) = parsed(var("PLEDGER_RESCAN_INTERVAL")) {
            self.sync.rescan_interval_secs = interval;
        }

        // Chain
        if let Some(duration) = parsed(var("PLEDGER_EPOCH_DURATION")) {
            self.chain.epoch_duration = duration;
        }
        if let Some(sessions) = parsed(var("PLEDGER_SESSIONS_PER_ERA")) {
            self.chain.sessions_per_era = sessions;
        }

        // Daemon
        if let Some(pid_file) = var("PLEDGER_PID_FILE") {
            self.daemon.pid_file = Some(pid_file);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.rpc.url.starts_with("http://") && !self.rpc.url.starts_with("https://") {
            anyhow::bail!("Invalid RPC URL: {}", self.rpc.url);
        }

        if self.rpc.retry_backoff_multiplier < 1.0 {
            anyhow::bail!("Retry backoff multiplier must be at least 1.0");
        }

        if self.sync.backfill_workers == 0 {
            anyhow::bail!("Backfill workers must be greater than 0");
        }

        if self.sync.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.chain.epoch_duration == 0 || self.chain.sessions_per_era == 0 {
            anyhow::bail!("Chain epoch_duration and sessions_per_era must be greater than 0");
        }

        Ok(())
    }

    /// Get example configuration as TOML string
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}
