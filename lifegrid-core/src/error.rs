//! Error types for lifegrid
//!
//! Errors fall into three families: transport failures between processes,
//! validation failures on board geometry, and lifecycle (state) violations
//! on the broker's run.

use thiserror::Error;
use tonic::{Code, Status};

/// Primary error type for all lifegrid operations
#[derive(Debug, Error)]
pub enum LifeError {
    // ========== Transport Errors ==========

    /// Could not open a connection to a peer
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// A call reached the peer (or tried to) but did not succeed
    #[error("Request to {endpoint} failed ({code:?}): {message}")]
    RequestFailed {
        endpoint: String,
        code: Code,
        message: String,
    },

    /// A worker did not answer within the per-call bound
    #[error("Worker {worker_id} did not respond within {timeout_ms}ms")]
    WorkerTimeout { worker_id: usize, timeout_ms: u64 },

    // ========== Validation Errors ==========

    /// Board rows do not match the declared width/height
    #[error("Invalid board geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// Band is empty or falls outside the board
    #[error("Band [{start_y}, {end_y}) is outside a board of height {height}")]
    BandOutOfBounds { start_y: usize, end_y: usize, height: usize },

    /// Cell holds something other than ALIVE or DEAD
    #[error("Invalid cell value {value} at ({x}, {y})")]
    InvalidCell { x: usize, y: usize, value: u8 },

    /// A band result is absent or has the wrong shape, so the merge is refused
    #[error("Band from worker {worker_id} missing or malformed at turn {turn}: {reason}")]
    MissingBand {
        turn: u64,
        worker_id: usize,
        reason: String,
    },

    // ========== State Errors ==========

    /// No run has been started on this broker
    #[error("No run has been started")]
    NoActiveRun,

    /// The run exists but is not in a phase that accepts the command
    #[error("Run is {phase}, not running or paused")]
    RunNotActive { phase: String },

    /// A run is already executing
    #[error("A run is already in progress")]
    RunInProgress,

    /// Quit has already been requested
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    // ========== Run Errors ==========

    /// A generation could not be completed
    #[error("Generation {turn} failed: {source}")]
    GenerationFailed {
        turn: u64,
        #[source]
        source: Box<LifeError>,
    },

    /// A board snapshot could not be read or written
    #[error("Snapshot {path} failed: {reason}")]
    Snapshot { path: String, reason: String },

    /// Configuration could not be loaded
    #[error("Invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LifeError {
    /// Returns true for failures of the link between processes
    pub fn is_transport(&self) -> bool {
        match self {
            LifeError::ConnectionFailed { .. } | LifeError::WorkerTimeout { .. } => true,
            LifeError::RequestFailed { code, .. } => matches!(
                code,
                Code::Unavailable | Code::DeadlineExceeded | Code::Unknown | Code::Cancelled
            ),
            _ => false,
        }
    }

    /// Returns true when a request's geometry was rejected
    pub fn is_validation(&self) -> bool {
        match self {
            LifeError::InvalidGeometry { .. }
            | LifeError::BandOutOfBounds { .. }
            | LifeError::InvalidCell { .. }
            | LifeError::MissingBand { .. } => true,
            LifeError::RequestFailed { code, .. } => *code == Code::InvalidArgument,
            _ => false,
        }
    }

    /// Returns true when an operation was invoked in the wrong lifecycle phase
    pub fn is_state(&self) -> bool {
        match self {
            LifeError::NoActiveRun
            | LifeError::RunNotActive { .. }
            | LifeError::RunInProgress
            | LifeError::ShutdownInProgress => true,
            LifeError::RequestFailed { code, .. } => *code == Code::FailedPrecondition,
            _ => false,
        }
    }

    /// Returns true if re-issuing the same call may succeed
    pub fn is_retryable(&self) -> bool {
        self.is_transport()
    }

    /// Convert a status received from `endpoint` into an error
    pub fn from_status(endpoint: impl Into<String>, status: Status) -> Self {
        LifeError::RequestFailed {
            endpoint: endpoint.into(),
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<LifeError> for Status {
    fn from(err: LifeError) -> Self {
        let message = err.to_string();
        match &err {
            LifeError::WorkerTimeout { .. } => Status::deadline_exceeded(message),
            LifeError::GenerationFailed { source, .. } if source.is_validation() => {
                Status::invalid_argument(message)
            }
            LifeError::GenerationFailed { .. } => Status::unavailable(message),
            LifeError::RequestFailed { code, .. } => Status::new(*code, message),
            e if e.is_transport() => Status::unavailable(message),
            e if e.is_validation() => Status::invalid_argument(message),
            e if e.is_state() => Status::failed_precondition(message),
            LifeError::Config { .. } => Status::invalid_argument(message),
            _ => Status::internal(message),
        }
    }
}

/// Result type alias for lifegrid operations
pub type Result<T> = std::result::Result<T, LifeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(LifeError::WorkerTimeout { worker_id: 0, timeout_ms: 10 }.is_retryable());
        assert!(LifeError::NoActiveRun.is_state());
        assert!(LifeError::BandOutOfBounds { start_y: 3, end_y: 2, height: 4 }.is_validation());
        assert!(!LifeError::InvalidGeometry { reason: "x".into() }.is_retryable());
    }

    #[test]
    fn test_status_round_trip_keeps_family() {
        let status: Status = LifeError::RunInProgress.into();
        assert_eq!(status.code(), Code::FailedPrecondition);

        let back = LifeError::from_status("http://broker", status);
        assert!(back.is_state());
        assert!(!back.is_retryable());

        let status: Status = LifeError::GenerationFailed {
            turn: 4,
            source: Box::new(LifeError::WorkerTimeout { worker_id: 1, timeout_ms: 5 }),
        }
        .into();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
