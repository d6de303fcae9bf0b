//! Broker: run orchestration and control plane
//!
//! Partitions each generation into bands, fans them out to the worker pool,
//! merges the results, and serves pause/resume/query/quit alongside the run.

pub mod dispatch;
pub mod leader;
pub mod partition;
pub mod pool;
pub mod run_state;

pub use dispatch::{DispatchConfig, FailurePolicy};
pub use leader::{Broker, BrokerConfig, RunOutcome};
pub use partition::BandPartitioner;
pub use pool::{GrpcWorkerPool, LocalWorkerPool, PoolConfig, WorkerPool};
pub use run_state::{RunSnapshot, RunState};
