//! Worker state
//!
//! The only state a worker keeps across requests: the band it last produced,
//! how many evolutions it has served, and its phase.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::board::{Band, Board};

/// Worker phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Waiting for requests
    Idle,
    /// At least one evolution in flight
    Evolving,
    /// Terminate received
    ShuttingDown,
}

/// Last band a worker produced
#[derive(Debug, Clone)]
pub struct LastEvolution {
    pub turn: u64,
    pub band: Band,
    pub result: Board,
}

/// Local worker state
pub struct WorkerState {
    phase: RwLock<WorkerPhase>,
    /// Evolutions currently running
    in_flight: AtomicU64,
    /// Evolutions completed since start
    evolutions: AtomicU64,
    last: RwLock<Option<LastEvolution>>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(WorkerPhase::Idle),
            in_flight: AtomicU64::new(0),
            evolutions: AtomicU64::new(0),
            last: RwLock::new(None),
        }
    }

    /// Get current phase
    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.read().await
    }

    /// Mark an evolution as started; returns false once shutting down
    pub async fn begin_evolution(&self) -> bool {
        let mut phase = self.phase.write().await;
        if *phase == WorkerPhase::ShuttingDown {
            return false;
        }
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        *phase = WorkerPhase::Evolving;
        true
    }

    /// Mark an evolution as finished, recording its result if it succeeded
    pub async fn end_evolution(&self, outcome: Option<LastEvolution>) {
        if let Some(last) = outcome {
            self.evolutions.fetch_add(1, Ordering::Relaxed);
            *self.last.write().await = Some(last);
        }
        let mut phase = self.phase.write().await;
        let remaining = self.in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
        if remaining == 0 && *phase == WorkerPhase::Evolving {
            *phase = WorkerPhase::Idle;
        }
    }

    /// Enter the terminal phase
    pub async fn shut_down(&self) {
        *self.phase.write().await = WorkerPhase::ShuttingDown;
    }

    /// Evolutions completed since start
    pub fn evolutions(&self) -> u64 {
        self.evolutions.load(Ordering::Relaxed)
    }

    /// Last band produced, if any
    pub async fn last(&self) -> Option<LastEvolution> {
        self.last.read().await.clone()
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_phase_transitions() {
        let state = WorkerState::new();
        assert_eq!(state.phase().await, WorkerPhase::Idle);

        assert!(state.begin_evolution().await);
        assert_eq!(state.phase().await, WorkerPhase::Evolving);

        state
            .end_evolution(Some(LastEvolution {
                turn: 0,
                band: Band::new(0, 1),
                result: Board::new(2, 1),
            }))
            .await;
        assert_eq!(state.phase().await, WorkerPhase::Idle);
        assert_eq!(state.evolutions(), 1);
        assert_eq!(state.last().await.map(|l| l.band), Some(Band::new(0, 1)));

        state.shut_down().await;
        assert!(!state.begin_evolution().await);
    }
}
