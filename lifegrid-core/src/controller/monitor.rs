//! Alive-cell progress reporting
//!
//! Samples the broker on a fixed interval while a run is executing. Ticks
//! that land while the run is paused, or before the run has begun, report
//! nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::events::ControllerEvent;
use super::RunControl;
use crate::protocol::RunPhase;
use crate::runtime::ShutdownSignal;

/// Report `AliveCellsCount` every `interval` until the run reaches
/// `total_turns`, leaves the active phases, or `stop` fires
pub async fn watch_alive_cells(
    control: Arc<dyn RunControl>,
    interval: Duration,
    total_turns: u64,
    events: UnboundedSender<ControllerEvent>,
    stop: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.wait() => return,
            _ = ticker.tick() => {}
        }

        let report = match control.query_state().await {
            Ok(report) => report,
            Err(e) if e.is_state() => {
                debug!("No run to sample yet: {}", e);
                continue;
            }
            Err(e) => {
                warn!("Stopping progress reports: {}", e);
                return;
            }
        };

        match report.phase {
            RunPhase::Paused => continue,
            RunPhase::Running | RunPhase::Idle => {}
            phase => {
                debug!("Run is {}; progress reports done", phase);
                return;
            }
        }

        let event = ControllerEvent::AliveCellsCount {
            completed_turns: report.completed_turns,
            cells_count: report.alive_count,
        };
        if events.send(event).is_err() || report.completed_turns >= total_turns {
            return;
        }
    }
}
