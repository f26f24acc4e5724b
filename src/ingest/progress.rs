//! Era / session progress arithmetic
//!
//! Every quantity is an unbounded integer: slot counters on a long-lived
//! chain do not fit comfortably in fixed-width types once multiplied.

use num_bigint::BigUint;
use thiserror::Error;

/// Raw per-block counters read from the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Slots per epoch (`Babe::EpochDuration`)
    pub epoch_duration: BigUint,
    /// Sessions per era (`Staking::SessionsPerEra`)
    pub sessions_per_era: BigUint,
    pub epoch_index: BigUint,
    pub genesis_slot: BigUint,
    pub current_slot: BigUint,
    /// Current session index
    pub current_index: BigUint,
    pub current_era_start_session_index: BigUint,
}

/// Values derived from [`SessionCounters`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub era_length: BigUint,
    pub epoch_start_slot: BigUint,
    pub session_progress: BigUint,
    pub era_progress: BigUint,
}

/// Counters that cannot produce a non-negative progress value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("current slot {current_slot} precedes epoch start slot {epoch_start_slot}")]
    SlotBeforeEpochStart {
        current_slot: BigUint,
        epoch_start_slot: BigUint,
    },

    #[error("session index {current_index} precedes era start session {era_start_session_index}")]
    SessionBeforeEraStart {
        current_index: BigUint,
        era_start_session_index: BigUint,
    },

    #[error("malformed counters: {0}")]
    MalformedCounters(&'static str),
}

/// Derive era and session progress
///
/// ```text
/// eraLength       = epochDuration * sessionsPerEra
/// epochStartSlot  = epochIndex * epochDuration + genesisSlot
/// sessionProgress = currentSlot - epochStartSlot
/// eraProgress     = (currentIndex - currentEraStartSessionIndex) * epochDuration + sessionProgress
/// ```
///
/// A result that would be negative is reported as an error instead of being
/// clamped or wrapped.
pub fn compute_progress(counters: &SessionCounters) -> Result<Progress, ProgressError> {
    let zero = BigUint::default();
    if counters.epoch_duration == zero {
        return Err(ProgressError::MalformedCounters("epoch duration is zero"));
    }
    if counters.sessions_per_era == zero {
        return Err(ProgressError::MalformedCounters("sessions per era is zero"));
    }

    let era_length = &counters.epoch_duration * &counters.sessions_per_era;
    let epoch_start_slot = &counters.epoch_index * &counters.epoch_duration + &counters.genesis_slot;

    if counters.current_slot < epoch_start_slot {
        return Err(ProgressError::SlotBeforeEpochStart {
            current_slot: counters.current_slot.clone(),
            epoch_start_slot,
        });
    }
    if counters.current_index < counters.current_era_start_session_index {
        return Err(ProgressError::SessionBeforeEraStart {
            current_index: counters.current_index.clone(),
            era_start_session_index: counters.current_era_start_session_index.clone(),
        });
    }

    let session_progress = &counters.current_slot - &epoch_start_slot;
    let sessions_into_era = &counters.current_index - &counters.current_era_start_session_index;
    let era_progress = sessions_into_era * &counters.epoch_duration + &session_progress;

    Ok(Progress {
        era_length,
        epoch_start_slot,
        session_progress,
        era_progress,
    })
}
