//! Broker run state
//!
//! The board, turn counter and control flags of the current run, behind a
//! single mutex. The lock is only held for flag flips and `Arc` swaps; the
//! run loop parks on `resumed` while paused, Pause waits on `parked` until
//! the generation in flight has landed, and the quit path waits on `stopped`
//! until the loop has left its generation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::board::Board;
use crate::error::{LifeError, Result};
use crate::protocol::RunPhase;

/// Consistent view of the run at one instant
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub board: Arc<Board>,
    /// Live cells on `board`, counted once when it was published
    pub alive_count: usize,
    pub completed_turns: u64,
    pub total_turns: u64,
    pub phase: RunPhase,
}

#[derive(Debug)]
struct Inner {
    board: Option<Arc<Board>>,
    alive_count: usize,
    completed_turns: u64,
    total_turns: u64,
    paused: bool,
    quitting: bool,
    /// Run loop is between `begin` and `finish`
    looping: bool,
    /// A generation is being computed and has not been published yet
    in_generation: bool,
    phase: RunPhase,
}

impl Inner {
    fn phase(&self) -> RunPhase {
        if self.quitting {
            RunPhase::Quit
        } else if self.looping && self.paused && !self.in_generation {
            RunPhase::Paused
        } else {
            self.phase
        }
    }
}

/// How a run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Completed,
    Quit,
    Failed,
}

/// Shared mutable state of the broker's run
pub struct RunState {
    inner: Mutex<Inner>,
    resumed: Notify,
    parked: Notify,
    stopped: Notify,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                board: None,
                alive_count: 0,
                completed_turns: 0,
                total_turns: 0,
                paused: false,
                quitting: false,
                looping: false,
                in_generation: false,
                phase: RunPhase::Idle,
            }),
            resumed: Notify::new(),
            parked: Notify::new(),
            stopped: Notify::new(),
        }
    }

    /// Install the initial board and enter Running
    pub fn begin(&self, board: Board, turns: u64) -> Result<()> {
        let alive = board.alive_count();
        let mut inner = self.inner.lock();
        if inner.quitting {
            return Err(LifeError::ShutdownInProgress);
        }
        if inner.looping {
            return Err(LifeError::RunInProgress);
        }
        inner.board = Some(Arc::new(board));
        inner.alive_count = alive;
        inner.completed_turns = 0;
        inner.total_turns = turns;
        inner.paused = false;
        inner.looping = true;
        inner.in_generation = false;
        inner.phase = RunPhase::Running;
        info!("Run started for {} turns", turns);
        Ok(())
    }

    /// Park while paused, then claim the next generation. Returns false if
    /// the loop should stop instead.
    ///
    /// The claim is checked and taken under one lock, so a Pause either lands
    /// before it and parks the loop, or after it and waits for `publish`.
    pub async fn enter_generation(&self) -> bool {
        loop {
            let notified = self.resumed.notified();
            tokio::pin!(notified);
            // Register before checking so a resume between the check and the
            // await is not lost
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock();
                if inner.quitting {
                    return false;
                }
                if !inner.paused {
                    inner.in_generation = true;
                    return true;
                }
            }
            debug!("Run loop parked while paused");
            notified.await;
        }
    }

    /// Current board for the next generation
    pub fn current_board(&self) -> Result<Arc<Board>> {
        self.inner.lock().board.clone().ok_or(LifeError::NoActiveRun)
    }

    /// Make `board` the result of `completed_turns` generations
    pub fn publish(&self, board: Board, completed_turns: u64) {
        // Counted outside the lock so queries never wait on a board scan
        let alive = board.alive_count();
        {
            let mut inner = self.inner.lock();
            inner.board = Some(Arc::new(board));
            inner.alive_count = alive;
            inner.completed_turns = completed_turns;
            inner.in_generation = false;
        }
        self.parked.notify_waiters();
    }

    /// Run loop has exited
    pub fn finish(&self, end: RunEnd) -> RunSnapshot {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.looping = false;
            inner.paused = false;
            inner.in_generation = false;
            inner.phase = match end {
                RunEnd::Completed => RunPhase::Completed,
                RunEnd::Quit => RunPhase::Quit,
                RunEnd::Failed => RunPhase::Failed,
            };
            Self::snapshot_of(&inner)
        };
        self.parked.notify_waiters();
        self.stopped.notify_waiters();
        info!(
            "Run ended as {} after {} turns",
            snapshot.phase, snapshot.completed_turns
        );
        snapshot
    }

    /// Consistent snapshot for status queries
    pub fn snapshot(&self) -> Result<RunSnapshot> {
        let inner = self.inner.lock();
        if inner.board.is_none() {
            return Err(LifeError::NoActiveRun);
        }
        Ok(Self::snapshot_of(&inner))
    }

    fn snapshot_of(inner: &Inner) -> RunSnapshot {
        RunSnapshot {
            board: inner.board.clone().unwrap_or_else(|| Arc::new(Board::new(0, 0))),
            alive_count: inner.alive_count,
            completed_turns: inner.completed_turns,
            total_turns: inner.total_turns,
            phase: inner.phase(),
        }
    }

    /// Lifecycle phase as seen by controllers
    pub fn phase(&self) -> RunPhase {
        self.inner.lock().phase()
    }

    /// Pause the active run and return the turn it froze at. Idempotent.
    ///
    /// A generation already in flight is allowed to land first, so the
    /// returned turn is the one queries keep reporting until Resume. The wait
    /// is bounded by `grace`; past it the pause still takes effect when the
    /// generation lands.
    pub async fn pause(&self, grace: Duration) -> Result<u64> {
        {
            let mut inner = self.inner.lock();
            Self::require_active(&inner)?;
            if !inner.paused {
                inner.paused = true;
                debug!("Pause requested at turn {}", inner.completed_turns);
            }
        }

        if !self.wait_parked(grace).await {
            warn!("Generation still in flight after {:?}; pause is pending", grace);
        }

        let inner = self.inner.lock();
        if inner.paused && !inner.in_generation {
            info!("Run paused at turn {}", inner.completed_turns);
        }
        Ok(inner.completed_turns)
    }

    /// Wait up to `grace` for no generation to be in flight
    async fn wait_parked(&self, grace: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.parked.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !self.inner.lock().in_generation {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(grace, wait).await.is_ok()
    }

    /// Resume the active run. Idempotent.
    pub fn resume(&self) -> Result<u64> {
        let turns = {
            let mut inner = self.inner.lock();
            Self::require_active(&inner)?;
            if inner.paused {
                inner.paused = false;
                info!("Run resumed at turn {}", inner.completed_turns);
            }
            inner.completed_turns
        };
        self.resumed.notify_waiters();
        Ok(turns)
    }

    fn require_active(inner: &Inner) -> Result<()> {
        if inner.quitting {
            return Err(LifeError::ShutdownInProgress);
        }
        if inner.board.is_none() {
            return Err(LifeError::NoActiveRun);
        }
        if !inner.looping {
            return Err(LifeError::RunNotActive {
                phase: inner.phase().to_string(),
            });
        }
        Ok(())
    }

    /// Enter the terminal Quit phase and wake a paused run loop
    pub fn request_quit(&self) -> Result<u64> {
        let turns = {
            let mut inner = self.inner.lock();
            if inner.quitting {
                return Err(LifeError::ShutdownInProgress);
            }
            if inner.board.is_none() {
                return Err(LifeError::NoActiveRun);
            }
            inner.quitting = true;
            inner.completed_turns
        };
        self.resumed.notify_waiters();
        Ok(turns)
    }

    pub fn is_quitting(&self) -> bool {
        self.inner.lock().quitting
    }

    /// Wait up to `grace` for the run loop to exit. Returns true if it did.
    pub async fn wait_stopped(&self, grace: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.stopped.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !self.inner.lock().looping {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(grace, wait).await.is_ok()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
