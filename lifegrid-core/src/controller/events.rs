//! Events reported by the controller

use std::fmt;
use std::path::PathBuf;

use crate::board::Cell;

/// Whether the run is progressing, from the controller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Executing,
    Paused,
    Quitting,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Executing => "Executing",
            ExecutionState::Paused => "Paused",
            ExecutionState::Quitting => "Quitting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Periodic progress sample
    AliveCellsCount { completed_turns: u64, cells_count: u64 },
    StateChange {
        completed_turns: u64,
        state: ExecutionState,
    },
    /// A snapshot was handed to the sink
    SnapshotTaken {
        completed_turns: u64,
        path: Option<PathBuf>,
    },
    /// The run returned its final board
    FinalTurnComplete { completed_turns: u64, alive: Vec<Cell> },
}

impl fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerEvent::AliveCellsCount {
                completed_turns,
                cells_count,
            } => write!(f, "turn {}: {} cells alive", completed_turns, cells_count),
            ControllerEvent::StateChange {
                completed_turns,
                state,
            } => write!(f, "turn {}: {}", completed_turns, state),
            ControllerEvent::SnapshotTaken {
                completed_turns,
                path: Some(path),
            } => write!(f, "turn {}: snapshot written to {}", completed_turns, path.display()),
            ControllerEvent::SnapshotTaken {
                completed_turns, ..
            } => write!(f, "turn {}: snapshot taken", completed_turns),
            ControllerEvent::FinalTurnComplete {
                completed_turns,
                alive,
            } => write!(
                f,
                "final turn {} complete: {} cells alive",
                completed_turns,
                alive.len()
            ),
        }
    }
}
