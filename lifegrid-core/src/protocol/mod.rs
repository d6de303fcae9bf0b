//! Wire protocol
//!
//! Request/response messages for the Worker and Broker services, the JSON
//! codec that carries them over tonic, and the generated service stubs.

pub mod codec;

pub use codec::JsonCodec;

use serde::{Deserialize, Serialize};

use crate::board::Rows;

include!(concat!(env!("OUT_DIR"), "/lifegrid.Worker.rs"));
include!(concat!(env!("OUT_DIR"), "/lifegrid.Broker.rs"));

/// Lifecycle phase of a broker run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No run started yet
    Idle,
    /// Generations are being computed
    Running,
    /// Run loop is parked until resume
    Paused,
    /// All requested turns applied
    Completed,
    /// A generation could not be completed
    Failed,
    /// Quit requested; terminal
    Quit,
}

impl RunPhase {
    /// Running or paused
    pub fn is_active(&self) -> bool {
        matches!(self, RunPhase::Running | RunPhase::Paused)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Paused => "paused",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::Quit => "quit",
        };
        f.write_str(s)
    }
}

// ========== Worker ==========

/// Evolve one band of the board by a single generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolveRequest {
    pub width: u32,
    pub height: u32,
    /// Full current board; neighbours wrap outside the band
    #[serde(with = "codec::cell_rows")]
    pub board: Rows,
    pub start_y: u32,
    pub end_y: u32,
    /// Generation being computed, for log correlation
    #[serde(default)]
    pub turn: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolveResponse {
    /// `end_y - start_y` rows; row `i` is global row `start_y + i`
    #[serde(with = "codec::cell_rows")]
    pub band: Rows,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminateRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminateResponse {}

// ========== Broker ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunRequest {
    pub width: u32,
    pub height: u32,
    #[serde(with = "codec::cell_rows")]
    pub board: Rows,
    pub turns: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunResponse {
    #[serde(with = "codec::cell_rows")]
    pub board: Rows,
    pub completed_turns: u64,
    /// True when the run stopped early because of Quit
    pub quit: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryStateRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStateResponse {
    pub width: u32,
    pub height: u32,
    #[serde(with = "codec::cell_rows")]
    pub board: Rows,
    pub completed_turns: u64,
    pub alive_count: u64,
    pub phase: RunPhase,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PauseRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseResponse {
    pub completed_turns: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeResponse {
    pub completed_turns: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuitRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuitResponse {
    pub completed_turns: u64,
}
