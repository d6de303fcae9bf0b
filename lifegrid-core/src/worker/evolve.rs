//! Single-generation band evolution
//!
//! Pure functions: given the full board and a row band, compute the band's
//! next generation. Rows outside the band are read for neighbour context.

use rayon::prelude::*;

use crate::board::{Band, Board, ALIVE, DEAD};
use crate::error::{LifeError, Result};

const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Standard B3/S23 rule
pub fn next_state(alive: bool, live_neighbours: usize) -> bool {
    matches!((alive, live_neighbours), (true, 2) | (true, 3) | (false, 3))
}

/// Number of the eight toroidally adjacent cells that are alive
pub fn live_neighbours(board: &Board, x: usize, y: usize) -> usize {
    NEIGHBOUR_OFFSETS
        .iter()
        .filter(|(dx, dy)| board.is_alive_wrapped(x as isize + dx, y as isize + dy))
        .count()
}

fn evolve_row(board: &Board, y: usize, out: &mut [u8]) {
    for (x, cell) in out.iter_mut().enumerate() {
        let alive = next_state(board.is_alive(x, y), live_neighbours(board, x, y));
        *cell = if alive { ALIVE } else { DEAD };
    }
}

/// Evolve rows `[band.start_y, band.end_y)` by one generation.
///
/// Returns a board `band.len()` rows high; row `i` is global row
/// `band.start_y + i`. With `parallel` set, rows are spread over the rayon
/// pool; the result does not depend on it.
pub fn evolve_band(board: &Board, band: Band, parallel: bool) -> Result<Board> {
    band.validate(board.height())?;

    let width = board.width();
    if width == 0 {
        return Err(LifeError::InvalidGeometry {
            reason: "board has zero width".into(),
        });
    }
    let mut cells = vec![DEAD; width * band.len()];

    if parallel {
        cells
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(i, row)| evolve_row(board, band.start_y + i, row));
    } else {
        for (i, row) in cells.chunks_mut(width).enumerate() {
            evolve_row(board, band.start_y + i, row);
        }
    }

    Ok(Board::from_raw(width, band.len(), cells))
}

/// Evolve the whole board by one generation
pub fn step(board: &Board) -> Board {
    let width = board.width();
    if width == 0 {
        return board.clone();
    }
    let mut cells = vec![DEAD; board.cells().len()];
    for (y, row) in cells.chunks_mut(width).enumerate() {
        evolve_row(board, y, row);
    }
    Board::from_raw(width, board.height(), cells)
}

/// Apply `turns` generations sequentially on a single thread
pub fn run_sequential(board: &Board, turns: u64) -> Board {
    (0..turns).fold(board.clone(), |b, _| step(&b))
}
