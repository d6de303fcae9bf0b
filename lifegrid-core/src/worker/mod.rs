//! Worker-side logic
//!
//! Band evolution, the worker's local state, and its RPC service.

pub mod evolve;
pub mod service;
pub mod state;

pub use service::{WorkerConfig, WorkerService};
pub use state::WorkerState;
