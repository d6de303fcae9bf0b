//! Deterministic band partitioning
//!
//! Splits the board's rows into one contiguous band per worker. The split
//! depends only on `(height, worker_count)`, so it is the same every
//! generation.

use tracing::debug;

use crate::board::Band;
use crate::error::{LifeError, Result};

/// Deterministic band partitioner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPartitioner {
    height: usize,
    worker_count: usize,
}

impl BandPartitioner {
    /// Requires at least one worker and at least one row per worker
    pub fn new(height: usize, worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(LifeError::InvalidGeometry {
                reason: "worker pool is empty".into(),
            });
        }
        if height < worker_count {
            return Err(LifeError::InvalidGeometry {
                reason: format!(
                    "board height {} is smaller than the worker count {}",
                    height, worker_count
                ),
            });
        }
        Ok(Self {
            height,
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// One band per worker, ascending by `start_y`.
    ///
    /// Each band is `height / worker_count` rows; the last band also takes
    /// the remainder.
    pub fn bands(&self) -> Vec<Band> {
        let chunk = self.height / self.worker_count;
        let bands: Vec<Band> = (0..self.worker_count)
            .map(|i| self.band_at(i, chunk))
            .collect();

        debug!(
            "Partitioned {} rows into {} bands of {} (+{} remainder)",
            self.height,
            self.worker_count,
            chunk,
            self.height % self.worker_count
        );

        bands
    }

    /// Band assigned to a specific worker
    pub fn band_for_worker(&self, worker: usize) -> Option<Band> {
        if worker >= self.worker_count {
            return None;
        }
        Some(self.band_at(worker, self.height / self.worker_count))
    }

    /// Worker whose band contains `row`
    pub fn band_owner(&self, row: usize) -> Option<usize> {
        if row >= self.height {
            return None;
        }
        let chunk = self.height / self.worker_count;
        Some((row / chunk).min(self.worker_count - 1))
    }

    fn band_at(&self, worker: usize, chunk: usize) -> Band {
        let start_y = worker * chunk;
        let end_y = if worker + 1 == self.worker_count {
            self.height
        } else {
            start_y + chunk
        };
        Band::new(start_y, end_y)
    }
}
