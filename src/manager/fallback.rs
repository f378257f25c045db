//! Failover state machine primitives
//!
//! The manager's provider-selection state follows the classic three-phase
//! failover shape: healthy remote, degraded-and-retrying, and a terminal
//! permanent fallback once the retry budget is spent. Memory-only and
//! no-cache configurations get their own terminal states so selection never
//! has to consult the config on the hot path.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Provider-selection state of the cache manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackState {
    /// Remote backend healthy and serving all traffic
    ActiveRemote = 0,
    /// Remote unreachable; memory serves while a retry timer runs
    DegradedRetrying = 1,
    /// Retry budget exhausted; memory-only until externally reset
    PermanentFallback = 2,
    /// Memory-only configuration; no fallback machinery engaged
    MemoryOnly = 3,
    /// Remote unreachable and no fallback configured; no cache at all
    Unavailable = 4,
}

impl From<u8> for FallbackState {
    fn from(value: u8) -> Self {
        match value {
            0 => FallbackState::ActiveRemote,
            1 => FallbackState::DegradedRetrying,
            2 => FallbackState::PermanentFallback,
            3 => FallbackState::MemoryOnly,
            // Default to the safest interpretation
            _ => FallbackState::Unavailable,
        }
    }
}

impl FallbackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackState::ActiveRemote => "active-remote",
            FallbackState::DegradedRetrying => "degraded-retrying",
            FallbackState::PermanentFallback => "permanent-fallback",
            FallbackState::MemoryOnly => "memory-only",
            FallbackState::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for FallbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic cell holding the current `FallbackState`
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: FallbackState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> FallbackState {
        FallbackState::from(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: FallbackState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transition only if the current state matches `from`; returns whether
    /// the transition happened. Used so concurrent failure observations
    /// trigger a single degradation episode.
    pub fn transition(&self, from: FallbackState, to: FallbackState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            FallbackState::ActiveRemote,
            FallbackState::DegradedRetrying,
            FallbackState::PermanentFallback,
            FallbackState::MemoryOnly,
            FallbackState::Unavailable,
        ] {
            assert_eq!(FallbackState::from(state as u8), state);
        }
    }

    #[test]
    fn test_unknown_discriminant_is_unavailable() {
        assert_eq!(FallbackState::from(99), FallbackState::Unavailable);
    }

    #[test]
    fn test_transition_only_fires_from_expected_state() {
        let cell = StateCell::new(FallbackState::ActiveRemote);

        assert!(cell.transition(
            FallbackState::ActiveRemote,
            FallbackState::DegradedRetrying
        ));
        assert_eq!(cell.load(), FallbackState::DegradedRetrying);

        // A second concurrent observer must not re-trigger the episode
        assert!(!cell.transition(
            FallbackState::ActiveRemote,
            FallbackState::DegradedRetrying
        ));
        assert_eq!(cell.load(), FallbackState::DegradedRetrying);
    }

    #[test]
    fn test_degraded_to_recovery_and_exhaustion_paths() {
        let cell = StateCell::new(FallbackState::DegradedRetrying);
        assert!(cell.transition(FallbackState::DegradedRetrying, FallbackState::ActiveRemote));

        let cell = StateCell::new(FallbackState::DegradedRetrying);
        assert!(cell.transition(
            FallbackState::DegradedRetrying,
            FallbackState::PermanentFallback
        ));
    }

    #[test]
    fn test_serde_names_are_kebab_case() {
        let json = serde_json::to_string(&FallbackState::DegradedRetrying).unwrap();
        assert_eq!(json, "\"degraded-retrying\"");
    }
}
