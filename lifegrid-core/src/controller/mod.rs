//! Controller
//!
//! Drives a broker from the outside: starts a run, reports progress, and
//! turns key presses into pause, snapshot, detach and quit commands.

pub mod client;
pub mod events;
pub mod monitor;

pub use client::{BrokerClient, ControllerConfig};
pub use events::{ControllerEvent, ExecutionState};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{Receiver, UnboundedSender};
use tracing::{info, warn};

use crate::board::Board;
use crate::broker::{Broker, RunOutcome};
use crate::error::{LifeError, Result};
use crate::protocol::RunPhase;
use crate::runtime::ShutdownSignal;

/// Broker state as reported by QueryState
#[derive(Debug, Clone)]
pub struct StateReport {
    pub board: Board,
    pub completed_turns: u64,
    pub alive_count: u64,
    pub phase: RunPhase,
}

/// The broker operations a controller relies on
#[tonic::async_trait]
pub trait RunControl: Send + Sync {
    async fn start_run(&self, board: Board, turns: u64) -> Result<RunOutcome>;
    async fn query_state(&self) -> Result<StateReport>;
    async fn pause(&self) -> Result<u64>;
    async fn resume(&self) -> Result<u64>;
    async fn quit(&self) -> Result<u64>;
}

/// In-process broker, used without a transport
#[tonic::async_trait]
impl RunControl for Broker {
    async fn start_run(&self, board: Board, turns: u64) -> Result<RunOutcome> {
        Broker::start_run(self, board, turns).await
    }

    async fn query_state(&self) -> Result<StateReport> {
        let snapshot = Broker::query_state(self)?;
        Ok(StateReport {
            board: (*snapshot.board).clone(),
            completed_turns: snapshot.completed_turns,
            alive_count: snapshot.alive_count as u64,
            phase: snapshot.phase,
        })
    }

    async fn pause(&self) -> Result<u64> {
        Broker::pause(self).await
    }

    async fn resume(&self) -> Result<u64> {
        Broker::resume(self)
    }

    async fn quit(&self) -> Result<u64> {
        Broker::quit(self).await
    }
}

/// Where snapshots go
pub trait SnapshotSink: Send + Sync {
    /// Persist `board` as of `completed_turns`; returns where it went, if anywhere
    fn write(&self, completed_turns: u64, board: &Board) -> Result<Option<PathBuf>>;
}

/// Writes `<W>x<H>x<turns>.cells` plaintext files into a directory
pub struct PlainTextSink {
    dir: PathBuf,
}

impl PlainTextSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, completed_turns: u64, board: &Board) -> PathBuf {
        self.dir.join(format!(
            "{}x{}x{}.cells",
            board.width(),
            board.height(),
            completed_turns
        ))
    }
}

impl SnapshotSink for PlainTextSink {
    fn write(&self, completed_turns: u64, board: &Board) -> Result<Option<PathBuf>> {
        let path = self.path_for(completed_turns, board);
        let failed = |e: std::io::Error| LifeError::Snapshot {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&self.dir).map_err(failed)?;
        std::fs::write(&path, board.to_plaintext()).map_err(failed)?;
        Ok(Some(path))
    }
}

/// Drops every snapshot
pub struct DiscardSink;

impl SnapshotSink for DiscardSink {
    fn write(&self, _completed_turns: u64, _board: &Board) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// A key press, decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `p`: pause if executing, resume if paused
    TogglePause,
    /// `s`: write the current board to the sink
    Snapshot,
    /// `q`: stop the controller; the broker keeps running
    Detach,
    /// `k`: snapshot, then shut down broker and workers
    Quit,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'p' => Some(Command::TogglePause),
            's' => Some(Command::Snapshot),
            'q' => Some(Command::Detach),
            'k' => Some(Command::Quit),
            _ => None,
        }
    }
}

/// What the controller does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Detach,
    Quit,
}

pub struct Controller {
    control: Arc<dyn RunControl>,
    sink: Arc<dyn SnapshotSink>,
    events: UnboundedSender<ControllerEvent>,
    poll_interval: Duration,
    paused: AtomicBool,
}

impl Controller {
    pub fn new(
        control: Arc<dyn RunControl>,
        sink: Arc<dyn SnapshotSink>,
        events: UnboundedSender<ControllerEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            control,
            sink,
            events,
            poll_interval,
            paused: AtomicBool::new(false),
        }
    }

    fn emit(&self, event: ControllerEvent) {
        // Nobody listening is not an error
        let _ = self.events.send(event);
    }

    /// Carry out one command
    pub async fn handle(&self, command: Command) -> Result<Flow> {
        match command {
            Command::TogglePause => {
                let (completed_turns, state) = if self.paused.load(Ordering::SeqCst) {
                    (self.control.resume().await?, ExecutionState::Executing)
                } else {
                    (self.control.pause().await?, ExecutionState::Paused)
                };
                self.paused
                    .store(state == ExecutionState::Paused, Ordering::SeqCst);
                self.emit(ControllerEvent::StateChange {
                    completed_turns,
                    state,
                });
                Ok(Flow::Continue)
            }
            Command::Snapshot => {
                self.snapshot().await?;
                Ok(Flow::Continue)
            }
            Command::Detach => {
                let completed_turns = self
                    .control
                    .query_state()
                    .await
                    .map(|r| r.completed_turns)
                    .unwrap_or(0);
                self.emit(ControllerEvent::StateChange {
                    completed_turns,
                    state: ExecutionState::Quitting,
                });
                Ok(Flow::Detach)
            }
            Command::Quit => {
                if let Err(e) = self.snapshot().await {
                    warn!("Snapshot before quit failed: {}", e);
                }
                let completed_turns = self.control.quit().await?;
                self.emit(ControllerEvent::StateChange {
                    completed_turns,
                    state: ExecutionState::Quitting,
                });
                Ok(Flow::Quit)
            }
        }
    }

    async fn snapshot(&self) -> Result<u64> {
        let report = self.control.query_state().await?;
        let path = self.sink.write(report.completed_turns, &report.board)?;
        self.emit(ControllerEvent::SnapshotTaken {
            completed_turns: report.completed_turns,
            path,
        });
        Ok(report.completed_turns)
    }

    /// Run `board` for `turns` generations, taking commands from `keys`.
    ///
    /// Returns the final outcome, or `None` if the controller detached or
    /// the cluster was quit before the run reported back.
    pub async fn run(&self, board: Board, turns: u64, mut keys: Receiver<char>) -> Result<Option<RunOutcome>> {
        let control = self.control.clone();
        let mut run = tokio::spawn(async move { control.start_run(board, turns).await });

        let stop = ShutdownSignal::new();
        tokio::spawn(monitor::watch_alive_cells(
            self.control.clone(),
            self.poll_interval,
            turns,
            self.events.clone(),
            stop.clone(),
        ));

        let mut keys_open = true;
        let result = loop {
            tokio::select! {
                joined = &mut run => {
                    break joined.map_err(|e| LifeError::Internal {
                        message: format!("run task failed: {}", e),
                    });
                }
                key = keys.recv(), if keys_open => {
                    let Some(key) = key else {
                        keys_open = false;
                        continue;
                    };
                    let Some(command) = Command::from_key(key) else {
                        continue;
                    };
                    match self.handle(command).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Detach) => {
                            info!("Detached; broker keeps running");
                            run.abort();
                            stop.shutdown();
                            return Ok(None);
                        }
                        Ok(Flow::Quit) => {
                            stop.shutdown();
                            return match tokio::time::timeout(self.poll_interval, run).await {
                                Ok(Ok(Ok(outcome))) => {
                                    self.finish(&outcome);
                                    Ok(Some(outcome))
                                }
                                _ => Ok(None),
                            };
                        }
                        Err(e) => warn!("Command {:?} failed: {}", command, e),
                    }
                }
            }
        };
        stop.shutdown();

        let outcome = result??;
        if let Err(e) = self.sink.write(outcome.completed_turns, &outcome.board).map(|path| {
            self.emit(ControllerEvent::SnapshotTaken {
                completed_turns: outcome.completed_turns,
                path,
            })
        }) {
            warn!("Final snapshot failed: {}", e);
        }
        self.finish(&outcome);
        Ok(Some(outcome))
    }

    fn finish(&self, outcome: &RunOutcome) {
        self.emit(ControllerEvent::FinalTurnComplete {
            completed_turns: outcome.completed_turns,
            alive: outcome.board.alive_cells(),
        });
        self.emit(ControllerEvent::StateChange {
            completed_turns: outcome.completed_turns,
            state: ExecutionState::Quitting,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Cell;
    use crate::broker::{BrokerConfig, LocalWorkerPool};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    /// Records calls; pause/resume report the turn they were issued at
    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<&'static str>>,
    }

    #[tonic::async_trait]
    impl RunControl for RecordingControl {
        async fn start_run(&self, board: Board, turns: u64) -> Result<RunOutcome> {
            self.calls.lock().push("start_run");
            Ok(RunOutcome {
                board,
                completed_turns: turns,
                quit: false,
            })
        }

        async fn query_state(&self) -> Result<StateReport> {
            self.calls.lock().push("query_state");
            Ok(StateReport {
                board: Board::with_alive(4, 4, &[Cell { x: 1, y: 2 }])?,
                completed_turns: 7,
                alive_count: 1,
                phase: RunPhase::Running,
            })
        }

        async fn pause(&self) -> Result<u64> {
            self.calls.lock().push("pause");
            Ok(7)
        }

        async fn resume(&self) -> Result<u64> {
            self.calls.lock().push("resume");
            Ok(7)
        }

        async fn quit(&self) -> Result<u64> {
            self.calls.lock().push("quit");
            Ok(7)
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lifegrid-{}-{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Command::from_key('p'), Some(Command::TogglePause));
        assert_eq!(Command::from_key('s'), Some(Command::Snapshot));
        assert_eq!(Command::from_key('q'), Some(Command::Detach));
        assert_eq!(Command::from_key('k'), Some(Command::Quit));
        assert_eq!(Command::from_key('x'), None);
    }

    #[test]
    fn test_plaintext_sink_names_file_by_geometry_and_turn() {
        let dir = scratch_dir("sink");
        let sink = PlainTextSink::new(&dir);
        let board = Board::with_alive(5, 3, &[Cell { x: 4, y: 0 }]).unwrap();

        let path = sink.write(12, &board).unwrap().unwrap();
        assert_eq!(path, dir.join("5x3x12.cells"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(Board::from_plaintext(&text).unwrap(), board);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_toggle_pause_alternates() {
        let control = Arc::new(RecordingControl::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = Controller::new(control.clone(), Arc::new(DiscardSink), tx, Duration::from_secs(2));

        assert_eq!(controller.handle(Command::TogglePause).await.unwrap(), Flow::Continue);
        assert_eq!(controller.handle(Command::TogglePause).await.unwrap(), Flow::Continue);

        assert_eq!(*control.calls.lock(), vec!["pause", "resume"]);
        assert_eq!(
            rx.recv().await.unwrap(),
            ControllerEvent::StateChange { completed_turns: 7, state: ExecutionState::Paused }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ControllerEvent::StateChange { completed_turns: 7, state: ExecutionState::Executing }
        );
    }

    #[tokio::test]
    async fn test_quit_snapshots_first() {
        let control = Arc::new(RecordingControl::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = Controller::new(control.clone(), Arc::new(DiscardSink), tx, Duration::from_secs(2));

        assert_eq!(controller.handle(Command::Quit).await.unwrap(), Flow::Quit);
        assert_eq!(*control.calls.lock(), vec!["query_state", "quit"]);
        assert!(matches!(
            rx.recv().await.unwrap(),
            ControllerEvent::SnapshotTaken { completed_turns: 7, path: None }
        ));
    }

    #[tokio::test]
    async fn test_run_reports_final_alive_cells() {
        let broker = Broker::new(
            &BrokerConfig::default(),
            Arc::new(LocalWorkerPool::new(3)),
            ShutdownSignal::new(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = Controller::new(Arc::new(broker), Arc::new(DiscardSink), tx, Duration::from_secs(2));
        let (_keys_tx, keys) = mpsc::channel(4);

        // Vertical blinker turns horizontal after one generation
        let board = Board::with_alive(
            5,
            5,
            &[Cell { x: 2, y: 1 }, Cell { x: 2, y: 2 }, Cell { x: 2, y: 3 }],
        )
        .unwrap();
        let outcome = controller.run(board, 1, keys).await.unwrap().unwrap();
        assert_eq!(outcome.completed_turns, 1);

        let mut final_alive = None;
        while let Ok(event) = rx.try_recv() {
            if let ControllerEvent::FinalTurnComplete { alive, .. } = event {
                final_alive = Some(alive);
            }
        }
        assert_eq!(
            final_alive.unwrap(),
            vec![Cell { x: 1, y: 2 }, Cell { x: 2, y: 2 }, Cell { x: 3, y: 2 }]
        );
    }
}
