//! lifegrid core - distributed Game of Life
//!
//! This crate provides:
//! - Board types and the toroidal B3/S23 rule
//! - Workers that evolve one row band per request
//! - A broker that partitions each generation across a fixed worker pool
//!   and serves pause/resume/query/quit while a run is in flight
//! - A client-side controller for driving a broker

pub mod board;
pub mod broker;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod runtime;
pub mod worker;

pub use board::{Band, Board, Cell, ALIVE, DEAD};
pub use error::LifeError;

/// Workers in the reference deployment
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Largest RPC message, large enough for a full board
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;
