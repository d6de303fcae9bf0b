//! Worker pool
//!
//! The broker's fixed set of workers, addressed by index. Endpoints are
//! injected through configuration; each gets one long-lived channel that is
//! reused for every generation and for the terminate broadcast.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use crate::board::Rows;
use crate::error::{LifeError, Result};
use crate::protocol::worker_client::WorkerClient;
use crate::protocol::{EvolveRequest, TerminateRequest};
use crate::runtime::ShutdownSignal;
use crate::worker::{WorkerConfig, WorkerService};

/// A set of workers the broker can evolve bands on
#[tonic::async_trait]
pub trait WorkerPool: Send + Sync {
    /// Number of workers; also the number of bands per generation
    fn size(&self) -> usize;

    /// Make sure every worker is reachable
    async fn connect(&self) -> Result<()>;

    /// Evolve one band on worker `worker`, returning the raw band rows
    async fn evolve(&self, worker: usize, request: EvolveRequest) -> Result<Rows>;

    /// Ask every worker to exit. Best effort: failures are returned, not raised.
    async fn terminate_all(&self) -> Vec<(usize, LifeError)>;
}

/// Configuration for the gRPC worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker endpoints, e.g. `http://10.0.0.5:8050`
    pub endpoints: Vec<String>,
    /// Bound on establishing each connection
    pub connect_timeout: Duration,
    /// Bound on each terminate call
    pub terminate_timeout: Duration,
    /// Largest message sent or accepted
    pub max_message_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            endpoints: (0..crate::DEFAULT_WORKER_COUNT)
                .map(|i| format!("http://127.0.0.1:{}", 8050 + i))
                .collect(),
            connect_timeout: Duration::from_secs(5),
            terminate_timeout: Duration::from_secs(2),
            max_message_bytes: crate::DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Workers reached over gRPC
pub struct GrpcWorkerPool {
    config: PoolConfig,
    clients: RwLock<Vec<Option<WorkerClient<Channel>>>>,
}

impl GrpcWorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        let clients = vec![None; config.endpoints.len()];
        Self {
            config,
            clients: RwLock::new(clients),
        }
    }

    fn endpoint(&self, worker: usize) -> Result<&str> {
        self.config
            .endpoints
            .get(worker)
            .map(String::as_str)
            .ok_or_else(|| LifeError::Internal {
                message: format!("no worker at index {}", worker),
            })
    }

    /// Cached client for `worker`, connecting on first use
    async fn client(&self, worker: usize) -> Result<WorkerClient<Channel>> {
        let cached = self.clients.read().get(worker).cloned().flatten();
        if let Some(client) = cached {
            return Ok(client);
        }

        let addr = self.endpoint(worker)?;
        info!("Connecting to worker {} at {}", worker, addr);
        let channel = Endpoint::from_shared(addr.to_string())
            .map_err(|e| LifeError::ConnectionFailed {
                endpoint: addr.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(self.config.connect_timeout)
            .connect()
            .await
            .map_err(|e| LifeError::ConnectionFailed {
                endpoint: addr.to_string(),
                reason: e.to_string(),
            })?;

        let client = WorkerClient::new(channel)
            .max_decoding_message_size(self.config.max_message_bytes)
            .max_encoding_message_size(self.config.max_message_bytes);
        self.clients.write()[worker] = Some(client.clone());
        Ok(client)
    }
}

#[tonic::async_trait]
impl WorkerPool for GrpcWorkerPool {
    fn size(&self) -> usize {
        self.config.endpoints.len()
    }

    async fn connect(&self) -> Result<()> {
        for worker in 0..self.size() {
            self.client(worker).await?;
        }
        Ok(())
    }

    async fn evolve(&self, worker: usize, request: EvolveRequest) -> Result<Rows> {
        let mut client = self.client(worker).await?;
        let response = client
            .evolve(request)
            .await
            .map_err(|status| LifeError::from_status(self.config.endpoints[worker].clone(), status))?;
        Ok(response.into_inner().band)
    }

    async fn terminate_all(&self) -> Vec<(usize, LifeError)> {
        let mut failures = Vec::new();
        for worker in 0..self.size() {
            let call = async {
                let mut client = self.client(worker).await?;
                client
                    .terminate(TerminateRequest {})
                    .await
                    .map_err(|status| {
                        LifeError::from_status(self.config.endpoints[worker].clone(), status)
                    })?;
                Ok::<_, LifeError>(())
            };
            match tokio::time::timeout(self.config.terminate_timeout, call).await {
                Ok(Ok(())) => debug!("Worker {} acknowledged terminate", worker),
                Ok(Err(e)) => {
                    warn!("Terminate for worker {} failed: {}", worker, e);
                    failures.push((worker, e));
                }
                Err(_) => {
                    let e = LifeError::WorkerTimeout {
                        worker_id: worker,
                        timeout_ms: self.config.terminate_timeout.as_millis() as u64,
                    };
                    warn!("Terminate for worker {} failed: {}", worker, e);
                    failures.push((worker, e));
                }
            }
        }
        failures
    }
}

/// Workers running inside the broker process.
///
/// Each worker is a full [`WorkerService`] called without a transport; the
/// bands it produces are identical to a remote worker's.
pub struct LocalWorkerPool {
    workers: Vec<Arc<WorkerService>>,
}

impl LocalWorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let workers = (0..worker_count)
            .map(|_| {
                Arc::new(WorkerService::new(
                    WorkerConfig::default(),
                    ShutdownSignal::new(),
                ))
            })
            .collect();
        Self { workers }
    }

    pub fn worker(&self, index: usize) -> Option<Arc<WorkerService>> {
        self.workers.get(index).cloned()
    }
}

#[tonic::async_trait]
impl WorkerPool for LocalWorkerPool {
    fn size(&self) -> usize {
        self.workers.len()
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn evolve(&self, worker: usize, request: EvolveRequest) -> Result<Rows> {
        let service = self.worker(worker).ok_or_else(|| LifeError::Internal {
            message: format!("no worker at index {}", worker),
        })?;
        Ok(service.evolve(request).await?.to_rows())
    }

    async fn terminate_all(&self) -> Vec<(usize, LifeError)> {
        for worker in &self.workers {
            worker.terminate().await;
        }
        Vec::new()
    }
}
