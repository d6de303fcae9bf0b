//! Unit tests for broker runs
//!
//! Tests partition invariance, turn accounting, lifecycle errors and the
//! failure policy, using in-process worker pools.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lifegrid_core::board::Rows;
use lifegrid_core::broker::{
    Broker, BrokerConfig, DispatchConfig, FailurePolicy, LocalWorkerPool, WorkerPool,
};
use lifegrid_core::error::Result;
use lifegrid_core::protocol::{EvolveRequest, RunPhase};
use lifegrid_core::runtime::ShutdownSignal;
use lifegrid_core::worker::evolve::run_sequential;
use lifegrid_core::{Board, Cell, LifeError};

fn broker(workers: usize) -> Broker {
    Broker::new(
        &BrokerConfig::default(),
        Arc::new(LocalWorkerPool::new(workers)),
        ShutdownSignal::new(),
    )
}

/// Deterministic soup, about a third alive
fn soup(width: usize, height: usize, seed: u64) -> Board {
    let mut state = seed;
    let mut alive = Vec::new();
    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            if (state >> 33) % 3 == 0 {
                alive.push(Cell { x, y });
            }
        }
    }
    Board::with_alive(width, height, &alive).unwrap()
}

#[tokio::test]
async fn test_partition_invariance() {
    let board = soup(17, 13, 7);
    for turns in [0, 1, 5, 20] {
        let one = broker(1).start_run(board.clone(), turns).await.unwrap();
        let three = broker(3).start_run(board.clone(), turns).await.unwrap();
        assert_eq!(one.board, three.board, "N=1 and N=3 differ after {} turns", turns);
        assert_eq!(three.board, run_sequential(&board, turns));
    }
}

#[tokio::test]
async fn test_turn_accounting() {
    let broker = broker(3);
    let board = soup(10, 10, 99);
    let outcome = broker.start_run(board.clone(), 37).await.unwrap();

    assert_eq!(outcome.completed_turns, 37);
    assert!(!outcome.quit);
    assert_eq!(outcome.board, run_sequential(&board, 37));

    let snapshot = broker.query_state().unwrap();
    assert_eq!(snapshot.completed_turns, 37);
    assert_eq!(snapshot.phase, RunPhase::Completed);
    assert_eq!(*snapshot.board, outcome.board);
}

#[tokio::test]
async fn test_zero_turn_run_is_identity() {
    let board = soup(6, 9, 3);
    let outcome = broker(3).start_run(board.clone(), 0).await.unwrap();
    assert_eq!(outcome.board, board);
    assert_eq!(outcome.completed_turns, 0);
}

#[tokio::test]
async fn test_rerun_after_completion() {
    let broker = broker(2);
    broker.start_run(soup(8, 8, 1), 3).await.unwrap();

    let board = soup(12, 4, 2);
    let outcome = broker.start_run(board.clone(), 2).await.unwrap();
    assert_eq!(outcome.board, run_sequential(&board, 2));

    let snapshot = broker.query_state().unwrap();
    assert_eq!(snapshot.board.width(), 12);
    assert_eq!(snapshot.completed_turns, 2);
}

#[tokio::test]
async fn test_control_after_completion_is_state_error() {
    let broker = broker(3);
    broker.start_run(soup(5, 5, 4), 1).await.unwrap();

    assert!(matches!(broker.pause().await, Err(LifeError::RunNotActive { .. })));
    assert!(matches!(broker.resume(), Err(LifeError::RunNotActive { .. })));
}

// ========== Pause ==========

/// Every evolve call takes `delay` before answering
struct SlowPool {
    inner: LocalWorkerPool,
    delay: Duration,
}

#[tonic::async_trait]
impl WorkerPool for SlowPool {
    fn size(&self) -> usize {
        self.inner.size()
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn evolve(&self, worker: usize, request: EvolveRequest) -> Result<Rows> {
        tokio::time::sleep(self.delay).await;
        self.inner.evolve(worker, request).await
    }

    async fn terminate_all(&self) -> Vec<(usize, LifeError)> {
        self.inner.terminate_all().await
    }
}

#[tokio::test]
async fn test_pause_mid_generation_freezes_after_it_lands() {
    let pool = SlowPool {
        inner: LocalWorkerPool::new(3),
        delay: Duration::from_millis(300),
    };
    let broker = Broker::new(&BrokerConfig::default(), Arc::new(pool), ShutdownSignal::new());
    let board = soup(9, 9, 12);

    let runner = broker.clone();
    let start = board.clone();
    let run = tokio::spawn(async move { runner.start_run(start, 100).await });

    // Generation 0 is still being evolved
    tokio::time::sleep(Duration::from_millis(100)).await;
    let paused_at = broker.pause().await.unwrap();
    assert_eq!(paused_at, 1);

    let frozen = broker.query_state().unwrap();
    assert_eq!(frozen.phase, RunPhase::Paused);
    assert_eq!(frozen.completed_turns, paused_at);
    assert_eq!(*frozen.board, run_sequential(&board, 1));

    // Long enough for two more generations if the pause leaked
    tokio::time::sleep(Duration::from_millis(700)).await;
    let later = broker.query_state().unwrap();
    assert_eq!(later.phase, RunPhase::Paused);
    assert_eq!(later.completed_turns, paused_at);
    assert_eq!(*later.board, *frozen.board);

    broker.quit().await.unwrap();
    let outcome = run.await.unwrap().unwrap();
    assert!(outcome.quit);
    assert_eq!(outcome.completed_turns, paused_at);
}

// ========== Failure policy ==========

enum Fault {
    /// Worker 1 fails its first `n` calls with a connection error
    Transient(usize),
    /// Worker 2 drops its last row from `turn` on
    ShortBand { turn: u64 },
    /// Worker 0 never answers from `turn` on
    Hang { turn: u64 },
}

struct FaultyPool {
    inner: LocalWorkerPool,
    fault: Fault,
    failed: AtomicUsize,
}

impl FaultyPool {
    fn new(fault: Fault) -> Self {
        Self {
            inner: LocalWorkerPool::new(3),
            fault,
            failed: AtomicUsize::new(0),
        }
    }
}

#[tonic::async_trait]
impl WorkerPool for FaultyPool {
    fn size(&self) -> usize {
        self.inner.size()
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn evolve(&self, worker: usize, request: EvolveRequest) -> Result<Rows> {
        match self.fault {
            Fault::Transient(n) if worker == 1 && self.failed.load(Ordering::SeqCst) < n => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                return Err(LifeError::ConnectionFailed {
                    endpoint: "worker-1".into(),
                    reason: "connection reset".into(),
                });
            }
            Fault::ShortBand { turn } if worker == 2 && request.turn >= turn => {
                let mut rows = self.inner.evolve(worker, request).await?;
                rows.pop();
                return Ok(rows);
            }
            Fault::Hang { turn } if worker == 0 && request.turn >= turn => {
                std::future::pending::<()>().await;
            }
            _ => {}
        }
        self.inner.evolve(worker, request).await
    }

    async fn terminate_all(&self) -> Vec<(usize, LifeError)> {
        self.inner.terminate_all().await
    }
}

fn faulty_broker(fault: Fault, policy: FailurePolicy) -> Broker {
    let config = BrokerConfig {
        dispatch: DispatchConfig {
            evolve_timeout: Duration::from_millis(200),
            policy,
            retry_backoff: Duration::from_millis(1),
        },
        ..Default::default()
    };
    Broker::new(&config, Arc::new(FaultyPool::new(fault)), ShutdownSignal::new())
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let broker = faulty_broker(Fault::Transient(2), FailurePolicy::Retry { retries: 2 });
    let board = soup(9, 9, 5);
    let outcome = broker.start_run(board.clone(), 4).await.unwrap();
    assert_eq!(outcome.board, run_sequential(&board, 4));
}

#[tokio::test]
async fn test_abort_policy_fails_run() {
    let broker = faulty_broker(Fault::Transient(1), FailurePolicy::Abort);
    let board = soup(9, 9, 5);
    let err = broker.start_run(board.clone(), 4).await.unwrap_err();

    assert!(matches!(err, LifeError::GenerationFailed { turn: 0, .. }));
    let snapshot = broker.query_state().unwrap();
    assert_eq!(snapshot.phase, RunPhase::Failed);
    assert_eq!(snapshot.completed_turns, 0);
    assert_eq!(*snapshot.board, board);
}

#[tokio::test]
async fn test_exhausted_retries_fail_run() {
    let broker = faulty_broker(Fault::Transient(3), FailurePolicy::Retry { retries: 2 });
    let err = broker.start_run(soup(9, 9, 5), 4).await.unwrap_err();
    assert!(matches!(err, LifeError::GenerationFailed { .. }));
}

#[tokio::test]
async fn test_short_band_refuses_merge() {
    let broker = faulty_broker(Fault::ShortBand { turn: 3 }, FailurePolicy::default());
    let board = soup(9, 9, 6);
    let err = broker.start_run(board.clone(), 10).await.unwrap_err();

    assert!(matches!(err, LifeError::MissingBand { turn: 3, worker_id: 2, .. }));
    let snapshot = broker.query_state().unwrap();
    assert_eq!(snapshot.completed_turns, 3);
    assert_eq!(*snapshot.board, run_sequential(&board, 3));
    assert_eq!(snapshot.board.height(), 9);
}

#[tokio::test]
async fn test_unresponsive_worker_times_out() {
    let broker = faulty_broker(Fault::Hang { turn: 1 }, FailurePolicy::Abort);
    let err = broker.start_run(soup(9, 9, 8), 5).await.unwrap_err();

    match err {
        LifeError::GenerationFailed { turn, source } => {
            assert_eq!(turn, 1);
            assert!(matches!(*source, LifeError::WorkerTimeout { worker_id: 0, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(broker.query_state().unwrap().completed_turns, 1);
}

#[tokio::test]
async fn test_rerun_after_failure() {
    let broker = faulty_broker(Fault::Transient(1), FailurePolicy::Abort);
    assert!(broker.start_run(soup(9, 9, 5), 2).await.is_err());

    // Worker 1 has used up its failures
    let board = soup(9, 9, 10);
    let outcome = broker.start_run(board.clone(), 2).await.unwrap();
    assert_eq!(outcome.board, run_sequential(&board, 2));
}
