//! Controller binary
//!
//! Reads the initial board from `BOARD_FILE`, starts the run, and takes one
//! key per line on stdin: `p` pause/resume, `s` snapshot, `q` detach,
//! `k` quit the cluster.

use std::sync::Arc;
use std::time::Duration;

use lifegrid_core::config;
use lifegrid_core::controller::{
    BrokerClient, Controller, DiscardSink, PlainTextSink, SnapshotSink,
};
use lifegrid_core::Board;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lifegrid_core::logging::init();

    let config = match config::controller_config(config::env_lookup) {
        Ok(c) => c,
        Err(e) => {
            error!("Bad configuration: {}", e);
            return Err(e.into());
        }
    };

    let Some(board_file) = config.board_file.clone() else {
        error!("BOARD_FILE is not set");
        return Err("BOARD_FILE is not set".into());
    };
    let board = Board::from_plaintext(&tokio::fs::read_to_string(&board_file).await?)?;
    info!(
        "Loaded {}x{} board from {} ({} alive)",
        board.width(),
        board.height(),
        board_file.display(),
        board.alive_count()
    );

    let sink: Arc<dyn SnapshotSink> = match &config.output_dir {
        Some(dir) => Arc::new(PlainTextSink::new(dir)),
        None => Arc::new(DiscardSink),
    };

    let client = BrokerClient::connect(config.clone()).await?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("{}", event);
        }
    });

    let (keys_tx, keys) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            for key in line.trim().chars() {
                if keys_tx.send(key).await.is_err() {
                    return;
                }
            }
        }
    });

    let controller = Controller::new(Arc::new(client), sink, events_tx, config.poll_interval);
    let result = controller.run(board, config.turns, keys).await;
    // Flush remaining events once every sender is gone
    drop(controller);
    let _ = tokio::time::timeout(Duration::from_secs(1), logger).await;

    match result? {
        Some(outcome) => info!(
            "Run finished after {} turns{}",
            outcome.completed_turns,
            if outcome.quit { " (quit)" } else { "" }
        ),
        None => info!("Controller detached"),
    }
    Ok(())
}
