use super::progress::ProgressError;
use crate::rpc::RetryDisposition;
use thiserror::Error;

/// Failure of one unit of ingestion work (a block or a notification)
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("node request failed: {0:#}")]
    Node(anyhow::Error),

    #[error("store write failed: {0:#}")]
    Store(anyhow::Error),

    #[error("computation rejected: {0}")]
    Computation(#[from] ProgressError),
}

impl IngestError {
    /// Node and store failures may clear up; bad counters will not
    pub fn is_transient(&self) -> bool {
        !matches!(self, IngestError::Computation(_))
    }

    pub fn disposition(&self) -> RetryDisposition {
        if self.is_transient() {
            RetryDisposition::Retry
        } else {
            RetryDisposition::Abort
        }
    }
}
