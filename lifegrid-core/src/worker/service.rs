//! Worker RPC service
//!
//! Serves Evolve and Terminate. Evolution runs on the blocking pool so a
//! large band never stalls the transport threads.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use super::evolve::evolve_band;
use super::state::{LastEvolution, WorkerState};
use crate::board::{Band, Board};
use crate::error::{LifeError, Result};
use crate::metrics::standard;
use crate::protocol::worker_server::Worker as WorkerTrait;
use crate::protocol::*;
use crate::runtime::ShutdownSignal;

/// Configuration for a worker process
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address to listen on
    pub bind_addr: std::net::SocketAddr,
    /// Largest message accepted or sent
    pub max_message_bytes: usize,
    /// Spread a band's rows across the rayon pool
    pub parallel_rows: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::net::SocketAddr::from(([0, 0, 0, 0], 8050)),
            max_message_bytes: crate::DEFAULT_MAX_MESSAGE_BYTES,
            parallel_rows: true,
        }
    }
}

/// Worker service
pub struct WorkerService {
    config: WorkerConfig,
    state: Arc<WorkerState>,
    shutdown: ShutdownSignal,
}

impl WorkerService {
    pub fn new(config: WorkerConfig, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            state: Arc::new(WorkerState::new()),
            shutdown,
        }
    }

    pub fn state(&self) -> Arc<WorkerState> {
        self.state.clone()
    }

    /// Validate the request and evolve its band
    pub async fn evolve(&self, req: EvolveRequest) -> Result<Board> {
        let board = Board::from_rows(req.width as usize, req.height as usize, &req.board)?;
        let band = Band::new(req.start_y as usize, req.end_y as usize);
        band.validate(board.height())?;

        if !self.state.begin_evolution().await {
            return Err(LifeError::ShutdownInProgress);
        }

        let parallel = self.config.parallel_rows;
        let evolved = tokio::task::spawn_blocking(move || {
            let _timer = standard::EVOLVE_DURATION.start_timer();
            evolve_band(&board, band, parallel)
        })
        .await
        .map_err(|e| LifeError::Internal {
            message: format!("evolution task failed: {}", e),
        })
        .and_then(|r| r);

        let outcome = evolved.as_ref().ok().map(|result| LastEvolution {
            turn: req.turn,
            band,
            result: result.clone(),
        });
        self.state.end_evolution(outcome).await;

        debug!(
            "Evolved rows [{}, {}) for turn {}",
            band.start_y, band.end_y, req.turn
        );
        evolved
    }

    /// Stop accepting work and ask the server loop to exit
    pub async fn terminate(&self) {
        info!(
            "Terminate received after {} evolutions",
            self.state.evolutions()
        );
        self.state.shut_down().await;
        self.shutdown.shutdown();
    }
}

#[tonic::async_trait]
impl WorkerTrait for WorkerService {
    async fn evolve(
        &self,
        request: Request<EvolveRequest>,
    ) -> std::result::Result<Response<EvolveResponse>, Status> {
        let req = request.into_inner();
        let band = self.evolve(req).await.map_err(|e| {
            warn!("Evolve rejected: {}", e);
            Status::from(e)
        })?;

        Ok(Response::new(EvolveResponse {
            band: band.to_rows(),
        }))
    }

    async fn terminate(
        &self,
        _request: Request<TerminateRequest>,
    ) -> std::result::Result<Response<TerminateResponse>, Status> {
        self.terminate().await;
        Ok(Response::new(TerminateResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{ALIVE, DEAD};
    use crate::worker::state::WorkerPhase;

    fn blinker_rows() -> Vec<Vec<u8>> {
        vec![
            vec![DEAD, ALIVE, DEAD],
            vec![DEAD, ALIVE, DEAD],
            vec![DEAD, ALIVE, DEAD],
        ]
    }

    #[tokio::test]
    async fn test_evolve_band_of_blinker() {
        let service = WorkerService::new(WorkerConfig::default(), ShutdownSignal::new());
        let band = service
            .evolve(EvolveRequest {
                width: 3,
                height: 3,
                board: blinker_rows(),
                start_y: 1,
                end_y: 2,
                turn: 0,
            })
            .await
            .unwrap();

        assert_eq!(band.height(), 1);
        assert_eq!(band.row(0), &[ALIVE, ALIVE, ALIVE]);
        assert_eq!(service.state().evolutions(), 1);
    }

    #[tokio::test]
    async fn test_evolve_rejects_inconsistent_dimensions() {
        let service = WorkerService::new(WorkerConfig::default(), ShutdownSignal::new());
        let err = service
            .evolve(EvolveRequest {
                width: 4,
                height: 3,
                board: blinker_rows(),
                start_y: 0,
                end_y: 3,
                turn: 0,
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = service
            .evolve(EvolveRequest {
                width: 3,
                height: 3,
                board: blinker_rows(),
                start_y: 2,
                end_y: 4,
                turn: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifeError::BandOutOfBounds { .. }));
    }

    #[tokio::test]
    async fn test_terminate_triggers_shutdown() {
        let shutdown = ShutdownSignal::new();
        let service = WorkerService::new(WorkerConfig::default(), shutdown.clone());
        service.terminate().await;

        assert!(shutdown.is_triggered());
        assert_eq!(service.state().phase().await, WorkerPhase::ShuttingDown);
        let err = service
            .evolve(EvolveRequest {
                width: 3,
                height: 3,
                board: blinker_rows(),
                start_y: 0,
                end_y: 3,
                turn: 0,
            })
            .await
            .unwrap_err();
        assert!(err.is_state());
    }
}
