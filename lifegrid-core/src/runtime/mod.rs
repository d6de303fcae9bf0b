//! Process runtime support
//!
//! Shutdown signalling shared by the worker and broker servers.

pub mod shutdown;

pub use shutdown::ShutdownSignal;
