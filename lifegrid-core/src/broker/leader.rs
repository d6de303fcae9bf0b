//! Broker leader logic
//!
//! Owns the run: drives generations across the worker pool and serves the
//! control plane (query, pause, resume, quit) concurrently with it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::dispatch::{run_generation, DispatchConfig};
use super::partition::BandPartitioner;
use super::pool::{PoolConfig, WorkerPool};
use super::run_state::{RunEnd, RunSnapshot, RunState};
use crate::board::Board;
use crate::error::{LifeError, Result};
use crate::metrics::standard;
use crate::protocol::broker_server::Broker as BrokerTrait;
use crate::protocol::*;
use crate::runtime::ShutdownSignal;

/// Configuration for the broker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Worker endpoints and connection settings
    pub pool: PoolConfig,
    /// Per-generation dispatch settings
    pub dispatch: DispatchConfig,
    /// How long Pause waits for a generation in flight to land
    pub pause_grace: Duration,
    /// How long Quit waits for the run loop before terminating workers
    pub quit_grace: Duration,
    /// Where to serve `/metrics`, if anywhere
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8030)),
            pool: PoolConfig::default(),
            dispatch: DispatchConfig::default(),
            pause_grace: Duration::from_secs(5),
            quit_grace: Duration::from_secs(5),
            metrics_addr: None,
        }
    }
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub board: Board,
    pub completed_turns: u64,
    /// Run stopped early because of Quit
    pub quit: bool,
}

/// The broker. Cheap to clone; clones share one run.
#[derive(Clone)]
pub struct Broker {
    dispatch: DispatchConfig,
    pause_grace: Duration,
    quit_grace: Duration,
    pool: Arc<dyn WorkerPool>,
    state: Arc<RunState>,
    shutdown: ShutdownSignal,
}

impl Broker {
    pub fn new(config: &BrokerConfig, pool: Arc<dyn WorkerPool>, shutdown: ShutdownSignal) -> Self {
        Self {
            dispatch: config.dispatch.clone(),
            pause_grace: config.pause_grace,
            quit_grace: config.quit_grace,
            pool,
            state: Arc::new(RunState::new()),
            shutdown,
        }
    }

    pub fn state(&self) -> Arc<RunState> {
        self.state.clone()
    }

    /// Run `turns` generations from `board` and return the final board.
    ///
    /// The loop runs on its own task, so it keeps going if the caller goes
    /// away; a later QueryState still observes it.
    pub async fn start_run(&self, board: Board, turns: u64) -> Result<RunOutcome> {
        let this = self.clone();
        let span = info_span!("run", run_id = %Uuid::new_v4());
        tokio::spawn(async move { this.run_loop(board, turns).await }.instrument(span))
            .await
            .map_err(|e| LifeError::Internal {
                message: format!("run loop task failed: {}", e),
            })?
    }

    async fn run_loop(&self, board: Board, turns: u64) -> Result<RunOutcome> {
        let partitioner = BandPartitioner::new(board.height(), self.pool.size())?;
        if let Err(e) = self.pool.connect().await {
            error!("Cannot reach worker pool: {}", e);
            return Err(e);
        }

        info!(
            "Starting {}x{} board for {} turns on {} workers",
            board.width(),
            board.height(),
            turns,
            partitioner.worker_count()
        );
        self.state.begin(board, turns)?;
        standard::COMPLETED_TURNS.set(0);

        for turn in 0..turns {
            if !self.state.enter_generation().await {
                break;
            }

            let current = self.state.current_board()?;
            match run_generation(self.pool.clone(), &self.dispatch, &partitioner, &current, turn).await {
                Ok(next) => {
                    self.state.publish(next, turn + 1);
                    standard::GENERATIONS.inc();
                    standard::COMPLETED_TURNS.set((turn + 1) as i64);
                    debug!("Completed turn {}", turn + 1);
                }
                Err(e) if self.state.is_quitting() => {
                    debug!("Generation {} abandoned during quit: {}", turn, e);
                    break;
                }
                Err(e) => {
                    error!("Run failed at turn {}: {}", turn, e);
                    self.state.finish(RunEnd::Failed);
                    return Err(e);
                }
            }
        }

        let quit = self.state.is_quitting();
        let snapshot = self
            .state
            .finish(if quit { RunEnd::Quit } else { RunEnd::Completed });
        Ok(RunOutcome {
            board: (*snapshot.board).clone(),
            completed_turns: snapshot.completed_turns,
            quit,
        })
    }

    /// Consistent snapshot of the run, never torn by a merge
    pub fn query_state(&self) -> Result<RunSnapshot> {
        let snapshot = self.state.snapshot()?;
        standard::ALIVE_CELLS.set(snapshot.alive_count as i64);
        Ok(snapshot)
    }

    /// Pause at the next generation boundary and return the frozen turn
    pub async fn pause(&self) -> Result<u64> {
        self.state.pause(self.pause_grace).await
    }

    pub fn resume(&self) -> Result<u64> {
        self.state.resume()
    }

    /// Stop the run, terminate every worker, then shut the broker down
    pub async fn quit(&self) -> Result<u64> {
        let requested_at = self.state.request_quit()?;
        info!("Quit requested at turn {}", requested_at);

        if !self.state.wait_stopped(self.quit_grace).await {
            warn!(
                "Run loop still busy after {:?}; terminating workers anyway",
                self.quit_grace
            );
        }

        let failures = self.pool.terminate_all().await;
        if !failures.is_empty() {
            warn!("{} workers did not acknowledge terminate", failures.len());
        }

        self.shutdown.shutdown();
        Ok(self
            .state
            .snapshot()
            .map(|s| s.completed_turns)
            .unwrap_or(requested_at))
    }
}

#[tonic::async_trait]
impl BrokerTrait for Broker {
    async fn start_run(
        &self,
        request: Request<StartRunRequest>,
    ) -> std::result::Result<Response<StartRunResponse>, Status> {
        let req = request.into_inner();
        let board = Board::from_rows(req.width as usize, req.height as usize, &req.board)?;
        let outcome = self.start_run(board, req.turns).await?;

        Ok(Response::new(StartRunResponse {
            board: outcome.board.to_rows(),
            completed_turns: outcome.completed_turns,
            quit: outcome.quit,
        }))
    }

    async fn query_state(
        &self,
        _request: Request<QueryStateRequest>,
    ) -> std::result::Result<Response<QueryStateResponse>, Status> {
        let snapshot = self.query_state()?;

        Ok(Response::new(QueryStateResponse {
            width: snapshot.board.width() as u32,
            height: snapshot.board.height() as u32,
            board: snapshot.board.to_rows(),
            completed_turns: snapshot.completed_turns,
            alive_count: snapshot.alive_count as u64,
            phase: snapshot.phase,
        }))
    }

    async fn pause(
        &self,
        _request: Request<PauseRequest>,
    ) -> std::result::Result<Response<PauseResponse>, Status> {
        let completed_turns = self.pause().await?;
        Ok(Response::new(PauseResponse { completed_turns }))
    }

    async fn resume(
        &self,
        _request: Request<ResumeRequest>,
    ) -> std::result::Result<Response<ResumeResponse>, Status> {
        let completed_turns = self.resume()?;
        Ok(Response::new(ResumeResponse { completed_turns }))
    }

    async fn quit(
        &self,
        _request: Request<QuitRequest>,
    ) -> std::result::Result<Response<QuitResponse>, Status> {
        let completed_turns = self.quit().await?;
        Ok(Response::new(QuitResponse { completed_turns }))
    }
}
