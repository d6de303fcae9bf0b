//! Broker client for controllers
//!
//! gRPC client wrapper for controller-broker communication.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use super::{RunControl, StateReport};
use crate::board::Board;
use crate::broker::RunOutcome;
use crate::error::{LifeError, Result};
use crate::protocol::broker_client::BrokerClient as GrpcClient;
use crate::protocol::*;

/// Configuration for a controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Broker address
    pub broker_addr: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Largest message sent or accepted
    pub max_message_bytes: usize,
    /// Plaintext pattern holding the initial board
    pub board_file: Option<PathBuf>,
    /// Generations to run
    pub turns: u64,
    /// Alive-count polling interval
    pub poll_interval: Duration,
    /// Where snapshots are written, if anywhere
    pub output_dir: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            broker_addr: "http://127.0.0.1:8030".into(),
            connect_timeout: Duration::from_secs(10),
            max_message_bytes: crate::DEFAULT_MAX_MESSAGE_BYTES,
            board_file: None,
            turns: 100,
            poll_interval: Duration::from_secs(2),
            output_dir: None,
        }
    }
}

/// Broker client for controllers
pub struct BrokerClient {
    config: ControllerConfig,
    client: RwLock<Option<GrpcClient<Channel>>>,
}

impl BrokerClient {
    /// Create an unconnected client
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Connect to the broker
    pub async fn connect(config: ControllerConfig) -> Result<Self> {
        let client = Self::new(config);
        client.reconnect().await?;
        Ok(client)
    }

    /// Establish connection
    async fn reconnect(&self) -> Result<()> {
        info!("Connecting to broker at {}", self.config.broker_addr);
        let endpoint = Endpoint::from_shared(self.config.broker_addr.clone())
            .map_err(|e| self.connection_failed(e))?
            .connect_timeout(self.config.connect_timeout);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| self.connection_failed(e))?;

        let grpc = GrpcClient::new(channel)
            .max_decoding_message_size(self.config.max_message_bytes)
            .max_encoding_message_size(self.config.max_message_bytes);
        *self.client.write().await = Some(grpc);
        Ok(())
    }

    fn connection_failed(&self, e: impl std::fmt::Display) -> LifeError {
        LifeError::ConnectionFailed {
            endpoint: self.config.broker_addr.clone(),
            reason: e.to_string(),
        }
    }

    /// Clone of the channel handle, so calls run concurrently
    async fn grpc(&self) -> Result<GrpcClient<Channel>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| self.connection_failed("Not connected"))
    }

    fn rpc_error(&self, status: tonic::Status) -> LifeError {
        LifeError::from_status(self.config.broker_addr.clone(), status)
    }

    /// Start a run and wait for its final board
    pub async fn start_run(&self, board: &Board, turns: u64) -> Result<RunOutcome> {
        let req = StartRunRequest {
            width: board.width() as u32,
            height: board.height() as u32,
            board: board.to_rows(),
            turns,
        };
        let response = self
            .grpc()
            .await?
            .start_run(req)
            .await
            .map_err(|s| self.rpc_error(s))?
            .into_inner();

        Ok(RunOutcome {
            board: Board::from_rows(board.width(), board.height(), &response.board)?,
            completed_turns: response.completed_turns,
            quit: response.quit,
        })
    }

    /// Current board, turn count and alive count
    pub async fn query_state(&self) -> Result<StateReport> {
        let response = self
            .grpc()
            .await?
            .query_state(QueryStateRequest {})
            .await
            .map_err(|s| self.rpc_error(s))?
            .into_inner();

        Ok(StateReport {
            board: Board::from_rows(
                response.width as usize,
                response.height as usize,
                &response.board,
            )?,
            completed_turns: response.completed_turns,
            alive_count: response.alive_count,
            phase: response.phase,
        })
    }

    /// Pause the run; returns the turn it paused at
    pub async fn pause(&self) -> Result<u64> {
        let response = self
            .grpc()
            .await?
            .pause(PauseRequest {})
            .await
            .map_err(|s| self.rpc_error(s))?;
        Ok(response.into_inner().completed_turns)
    }

    /// Resume the run; returns the turn it resumed from
    pub async fn resume(&self) -> Result<u64> {
        let response = self
            .grpc()
            .await?
            .resume(ResumeRequest {})
            .await
            .map_err(|s| self.rpc_error(s))?;
        Ok(response.into_inner().completed_turns)
    }

    /// Shut down the broker and its workers
    pub async fn quit(&self) -> Result<u64> {
        let response = self
            .grpc()
            .await?
            .quit(QuitRequest {})
            .await
            .map_err(|s| self.rpc_error(s))?;
        Ok(response.into_inner().completed_turns)
    }
}

#[tonic::async_trait]
impl RunControl for BrokerClient {
    async fn start_run(&self, board: Board, turns: u64) -> Result<RunOutcome> {
        BrokerClient::start_run(self, &board, turns).await
    }

    async fn query_state(&self) -> Result<StateReport> {
        BrokerClient::query_state(self).await
    }

    async fn pause(&self) -> Result<u64> {
        BrokerClient::pause(self).await
    }

    async fn resume(&self) -> Result<u64> {
        BrokerClient::resume(self).await
    }

    async fn quit(&self) -> Result<u64> {
        BrokerClient::quit(self).await
    }
}
