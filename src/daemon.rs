//! Daemon support: PID file management and shutdown signals

use anyhow::{Context, Result};
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// PID file removed when dropped
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process ID to `path`, replacing a stale file
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(existing_pid) = read_pid(path)? {
            if process_exists(existing_pid) {
                anyhow::bail!(
                    "PID file {} already exists with running process {}",
                    path.display(),
                    existing_pid
                );
            }
            info!(
                "Removing stale PID file {} (process {} not running)",
                path.display(),
                existing_pid
            );
            fs::remove_file(path)?;
        }

        let pid = std::process::id();
        fs::write(path, pid.to_string())
            .with_context(|| format!("Failed to write PID file {}", path.display()))?;

        debug!("Created PID file {} with PID {}", path.display(), pid);

        Ok(PidFile {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::error!("Failed to remove PID file {}: {}", self.path.display(), e);
            } else {
                debug!("Removed PID file {}", self.path.display());
            }
        }
    }
}

/// Cancel `cancel` on the first SIGTERM, SIGINT or SIGQUIT
pub struct ShutdownSignals {
    handle: signal_hook_tokio::Handle,
    task: JoinHandle<()>,
}

impl ShutdownSignals {
    pub fn install(cancel: CancellationToken) -> Result<Self> {
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT])
            .context("Failed to register signal handlers")?;
        let handle = signals.handle();
        let mut signals = signals.fuse();

        let task = tokio::spawn(async move {
            tokio::select! {
                Some(signal) = signals.next() => {
                    info!("Received signal {}, shutting down", signal);
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });

        Ok(Self { handle, task })
    }
}

impl Drop for ShutdownSignals {
    fn drop(&mut self) {
        self.handle.close();
        self.task.abort();
    }
}

/// PID recorded in `path`; unparsable contents count as no PID
fn read_pid(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read existing PID file {}", path.display()))?;
    Ok(contents.trim().parse().ok())
}

fn process_exists(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Signal 0 only checks that the process can be signalled
        match i32::try_from(pid) {
            Ok(raw) => kill(Pid::from_raw(raw), None).is_ok(),
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}
