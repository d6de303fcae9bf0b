//! Per-generation fan-out and merge
//!
//! One evolve call per band, issued concurrently and joined as a barrier.
//! Bands are merged in ascending `start_y` order; a missing or malformed band
//! fails the generation rather than producing a short board.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::partition::BandPartitioner;
use super::pool::WorkerPool;
use crate::board::{Band, Board, Rows};
use crate::error::{LifeError, Result};
use crate::metrics::standard;
use crate::protocol::EvolveRequest;

/// What to do when a band's evolve call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Fail the generation on the first error
    Abort,
    /// Re-issue the band to the same worker up to `retries` more times.
    /// Only transport errors are retried.
    Retry { retries: u32 },
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Retry { retries: 2 }
    }
}

impl FromStr for FailurePolicy {
    type Err = LifeError;

    /// `abort` or `retry:<n>`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("abort") {
            return Ok(FailurePolicy::Abort);
        }
        if let Some(n) = s.strip_prefix("retry:") {
            let retries = n.parse().map_err(|_| LifeError::Config {
                key: "FAILURE_POLICY".into(),
                reason: format!("bad retry count '{}'", n),
            })?;
            return Ok(FailurePolicy::Retry { retries });
        }
        Err(LifeError::Config {
            key: "FAILURE_POLICY".into(),
            reason: format!("expected 'abort' or 'retry:<n>', got '{}'", s),
        })
    }
}

/// Dispatch configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Bound on each evolve call
    pub evolve_timeout: Duration,
    pub policy: FailurePolicy,
    /// Pause between retries of the same band
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            evolve_timeout: Duration::from_secs(30),
            policy: FailurePolicy::default(),
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Evolve `board` by one generation across the pool
pub async fn run_generation(
    pool: Arc<dyn WorkerPool>,
    config: &DispatchConfig,
    partitioner: &BandPartitioner,
    board: &Board,
    turn: u64,
) -> Result<Board> {
    let _timer = standard::GENERATION_DURATION.start_timer();
    let bands = partitioner.bands();
    let rows = board.to_rows();

    let handles: Vec<_> = bands
        .iter()
        .enumerate()
        .map(|(worker, band)| {
            let request = EvolveRequest {
                width: board.width() as u32,
                height: board.height() as u32,
                board: rows.clone(),
                start_y: band.start_y as u32,
                end_y: band.end_y as u32,
                turn,
            };
            let pool = pool.clone();
            let config = config.clone();
            tokio::spawn(async move { call_band(pool, &config, worker, request).await })
        })
        .collect();

    // Barrier: every call settles before anything is merged
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.map_err(|e| LifeError::Internal {
            message: format!("dispatch task failed: {}", e),
        }));
    }

    let mut evolved = Vec::with_capacity(bands.len());
    for (worker, (band, result)) in bands.iter().zip(results).enumerate() {
        let rows = result.and_then(|r| r).map_err(|source| LifeError::GenerationFailed {
            turn,
            source: Box::new(source),
        })?;
        evolved.push(check_band(turn, worker, board.width(), *band, &rows)?);
    }

    let next = Board::stitch(board.width(), board.height(), evolved).map_err(|e| {
        LifeError::GenerationFailed {
            turn,
            source: Box::new(e),
        }
    })?;
    debug!("Merged {} bands for turn {}", bands.len(), turn);
    Ok(next)
}

/// One band's call, under the timeout and failure policy
async fn call_band(
    pool: Arc<dyn WorkerPool>,
    config: &DispatchConfig,
    worker: usize,
    request: EvolveRequest,
) -> Result<Rows> {
    let attempts = match config.policy {
        FailurePolicy::Abort => 1,
        FailurePolicy::Retry { retries } => retries + 1,
    };

    let mut attempt = 1;
    loop {
        let err = match tokio::time::timeout(
            config.evolve_timeout,
            pool.evolve(worker, request.clone()),
        )
        .await
        {
            Ok(Ok(rows)) => return Ok(rows),
            Ok(Err(e)) => e,
            Err(_) => LifeError::WorkerTimeout {
                worker_id: worker,
                timeout_ms: config.evolve_timeout.as_millis() as u64,
            },
        };
        standard::WORKER_CALL_FAILURES.inc();

        if attempt >= attempts || !err.is_retryable() {
            return Err(err);
        }
        warn!(
            "Worker {} failed turn {} (attempt {}/{}): {}",
            worker, request.turn, attempt, attempts, err
        );
        attempt += 1;
        tokio::time::sleep(config.retry_backoff).await;
    }
}

/// Turn returned rows into a band board, refusing anything of the wrong shape
fn check_band(turn: u64, worker: usize, width: usize, band: Band, rows: &[Vec<u8>]) -> Result<Board> {
    Board::from_rows(width, band.len(), rows).map_err(|e| LifeError::MissingBand {
        turn,
        worker_id: worker,
        reason: e.to_string(),
    })
}
