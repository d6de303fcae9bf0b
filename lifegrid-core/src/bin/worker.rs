//! Worker service binary

use lifegrid_core::config;
use lifegrid_core::protocol::worker_server::WorkerServer;
use lifegrid_core::runtime::ShutdownSignal;
use lifegrid_core::worker::WorkerService;
use tonic::transport::Server;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lifegrid_core::logging::init();

    info!("Starting lifegrid worker");

    let config = match config::worker_config(config::env_lookup) {
        Ok(c) => c,
        Err(e) => {
            error!("Bad configuration: {}", e);
            return Err(e.into());
        }
    };

    let shutdown = ShutdownSignal::new();
    let service = WorkerService::new(config.clone(), shutdown.clone());

    // Ctrl-C drains like a Terminate
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            on_signal.shutdown();
        }
    });

    info!("Worker listening on {}", config.bind_addr);

    Server::builder()
        .add_service(
            WorkerServer::new(service)
                .max_decoding_message_size(config.max_message_bytes)
                .max_encoding_message_size(config.max_message_bytes),
        )
        .serve_with_shutdown(config.bind_addr, async move { shutdown.wait().await })
        .await?;

    info!("Worker stopped");
    Ok(())
}
