//! Bounded exponential backoff shared by the backfill and live paths

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Retry policy for transient node and store failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Abort,
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryOutcome<E> {
    /// The error was classified as not retryable, or attempts ran out
    Failed { error: E, attempts: u32 },
    /// Shutdown was requested while waiting for the next attempt
    Cancelled,
}

/// Run `operation` until it succeeds, `classify` aborts, retries are
/// exhausted, or `cancel` fires during a backoff sleep.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
    mut classify: C,
) -> std::result::Result<T, RetryOutcome<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    C: FnMut(u32, &E) -> RetryDisposition,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if classify(attempt, &error) == RetryDisposition::Abort || attempt > config.max_retries {
            return Err(RetryOutcome::Failed {
                error,
                attempts: attempt,
            });
        }

        let delay = config.delay_for(attempt);
        tracing::debug!(
            attempt,
            backoff_ms = delay.as_millis() as u64,
            "Retrying after error: {}",
            error
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryOutcome::Cancelled),
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(config.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(config.delay_for(10), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryOutcome<String>> = retry_with_backoff(
            &fast(),
            &CancellationToken::new(),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("timeout #{}", attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_, _| RetryDisposition::Retry,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let result: Result<(), RetryOutcome<String>> = retry_with_backoff(
            &fast(),
            &CancellationToken::new(),
            |_| async { Err("down".to_string()) },
            |_, _| RetryDisposition::Retry,
        )
        .await;

        match result {
            Err(RetryOutcome::Failed { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_abort_skips_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryOutcome<String>> = retry_with_backoff(
            &fast(),
            &CancellationToken::new(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("bad counters".to_string()) }
            },
            |_, _| RetryDisposition::Abort,
        )
        .await;

        assert!(matches!(result, Err(RetryOutcome::Failed { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = RetryConfig {
            initial_delay_ms: 60_000,
            ..fast()
        };

        let result: Result<(), RetryOutcome<String>> = retry_with_backoff(
            &config,
            &cancel,
            |_| async { Err("down".to_string()) },
            |_, _| RetryDisposition::Retry,
        )
        .await;

        assert!(matches!(result, Err(RetryOutcome::Cancelled)));
    }
}
