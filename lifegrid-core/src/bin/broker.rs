//! Broker service binary

use std::sync::Arc;

use lifegrid_core::broker::{Broker, GrpcWorkerPool, WorkerPool};
use lifegrid_core::config;
use lifegrid_core::metrics::serve_metrics;
use lifegrid_core::protocol::broker_server::BrokerServer;
use lifegrid_core::runtime::ShutdownSignal;
use tonic::transport::Server;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lifegrid_core::logging::init();

    info!("Starting lifegrid broker");

    let config = match config::broker_config(config::env_lookup) {
        Ok(c) => c,
        Err(e) => {
            error!("Bad configuration: {}", e);
            return Err(e.into());
        }
    };

    let pool = Arc::new(GrpcWorkerPool::new(config.pool.clone()));
    info!("Connecting to {} workers", pool.size());
    if let Err(e) = pool.connect().await {
        error!("Failed to reach worker pool: {}", e);
        return Err(e.into());
    }

    let shutdown = ShutdownSignal::new();
    let broker = Broker::new(&config, pool, shutdown.clone());

    if let Some(metrics_addr) = config.metrics_addr {
        let metrics_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(metrics_addr, metrics_shutdown).await {
                warn!("Metrics server error: {}", e);
            }
        });
    }

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            on_signal.shutdown();
        }
    });

    info!("Broker listening on {}", config.bind_addr);

    Server::builder()
        .add_service(
            BrokerServer::new(broker)
                .max_decoding_message_size(config.pool.max_message_bytes)
                .max_encoding_message_size(config.pool.max_message_bytes),
        )
        .serve_with_shutdown(config.bind_addr, async move { shutdown.wait().await })
        .await?;

    info!("Broker stopped");
    Ok(())
}
