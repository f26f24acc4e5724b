//! Non-reentrant ingestion guard for the live head path

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardState {
    Idle = 0,
    Processing = 1,
}

/// Two-state machine: at most one notification is processed at a time and
/// nothing is queued behind it.
#[derive(Debug, Clone, Default)]
pub struct IngestionGuard {
    state: Arc<AtomicU8>,
}

/// Proof of the `Processing` state; dropping it returns the guard to `Idle`
#[derive(Debug)]
pub struct GuardPermit {
    state: Arc<AtomicU8>,
}

impl IngestionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `Idle -> Processing`, or `None` if a notification is in flight
    pub fn try_enter(&self) -> Option<GuardPermit> {
        self.state
            .compare_exchange(
                GuardState::Idle as u8,
                GuardState::Processing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| GuardPermit {
                state: Arc::clone(&self.state),
            })
    }

    pub fn state(&self) -> GuardState {
        match self.state.load(Ordering::Acquire) {
            0 => GuardState::Idle,
            _ => GuardState::Processing,
        }
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.state.store(GuardState::Idle as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permit_is_exclusive() {
        let guard = IngestionGuard::new();
        assert_eq!(guard.state(), GuardState::Idle);

        let permit = guard.try_enter().expect("idle guard must admit");
        assert_eq!(guard.state(), GuardState::Processing);
        assert!(guard.try_enter().is_none());
        assert!(guard.clone().try_enter().is_none());

        drop(permit);
        assert_eq!(guard.state(), GuardState::Idle);
        assert!(guard.try_enter().is_some());
    }

    #[tokio::test]
    async fn test_permit_released_when_task_fails() {
        let guard = IngestionGuard::new();
        let permit = guard.try_enter().unwrap();

        let result = tokio::spawn(async move {
            let _permit = permit;
            panic!("node query blew up");
        })
        .await;

        assert!(result.is_err());
        assert_eq!(guard.state(), GuardState::Idle);
    }

    #[test]
    fn test_racing_threads_admit_one() {
        let guard = IngestionGuard::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    guard.try_enter()
                })
            })
            .collect();

        let permits: Vec<GuardPermit> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(permits.len(), 1);
    }
}
