//! Unit tests for the life rule and band evolution
//!
//! Tests rule correctness, toroidal wrap and band/whole-board agreement.

use lifegrid_core::worker::evolve::{evolve_band, live_neighbours, run_sequential, step};
use lifegrid_core::{Band, Board, Cell};

fn cells(points: &[(usize, usize)]) -> Vec<Cell> {
    points.iter().map(|&(x, y)| Cell { x, y }).collect()
}

/// Board with the centre cell of a 5x5 set and `n` of its neighbours alive
fn centre_with_neighbours(centre_alive: bool, n: usize) -> Board {
    let around = [(1, 1), (2, 1), (3, 1), (1, 2), (3, 2), (1, 3), (2, 3), (3, 3)];
    let mut alive: Vec<(usize, usize)> = around[..n].to_vec();
    if centre_alive {
        alive.push((2, 2));
    }
    Board::with_alive(5, 5, &cells(&alive)).unwrap()
}

#[test]
fn test_live_cell_survival() {
    for n in 0..=8 {
        let board = centre_with_neighbours(true, n);
        assert_eq!(live_neighbours(&board, 2, 2), n);
        assert_eq!(
            step(&board).is_alive(2, 2),
            n == 2 || n == 3,
            "live cell with {} neighbours",
            n
        );
    }
}

#[test]
fn test_dead_cell_birth() {
    for n in 0..=8 {
        let board = centre_with_neighbours(false, n);
        assert_eq!(step(&board).is_alive(2, 2), n == 3, "dead cell with {} neighbours", n);
    }
}

#[test]
fn test_isolated_cell_dies() {
    let board = Board::with_alive(3, 3, &cells(&[(1, 1)])).unwrap();
    assert_eq!(step(&board).alive_count(), 0);
}

#[test]
fn test_blinker_oscillates() {
    let vertical = Board::with_alive(5, 5, &cells(&[(2, 1), (2, 2), (2, 3)])).unwrap();
    let horizontal = Board::with_alive(5, 5, &cells(&[(1, 2), (2, 2), (3, 2)])).unwrap();

    assert_eq!(step(&vertical), horizontal);
    assert_eq!(run_sequential(&vertical, 2), vertical);
}

#[test]
fn test_full_row_on_three_by_three_torus_fills_board() {
    // Every cell neighbours all eight others on a 3x3 torus
    let row = Board::with_alive(3, 3, &cells(&[(0, 1), (1, 1), (2, 1)])).unwrap();
    assert_eq!(step(&row).alive_count(), 9);
}

#[test]
fn test_glider_wraps_identically() {
    let glider = [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];
    let (w, h) = (8, 8);

    // Same glider, once in the interior and once straddling both edges
    let shift = |dx: usize, dy: usize| {
        let moved: Vec<(usize, usize)> = glider
            .iter()
            .map(|&(x, y)| ((x + dx) % w, (y + dy) % h))
            .collect();
        Board::with_alive(w, h, &cells(&moved)).unwrap()
    };
    let interior = shift(2, 2);
    let straddling = shift(6, 7);

    for turns in [1, 4, 9, 32] {
        let a = run_sequential(&interior, turns);
        let b = run_sequential(&straddling, turns);
        // Shift `a` by the same offset difference and compare
        let shifted: Vec<Cell> = a
            .alive_cells()
            .iter()
            .map(|c| Cell {
                x: (c.x + 4) % w,
                y: (c.y + 5) % h,
            })
            .collect();
        assert_eq!(Board::with_alive(w, h, &shifted).unwrap(), b, "after {} turns", turns);
    }
}

#[test]
fn test_glider_period_is_translation() {
    let board = Board::with_alive(6, 6, &cells(&[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)])).unwrap();
    let moved = Board::with_alive(6, 6, &cells(&[(2, 1), (3, 2), (1, 3), (2, 3), (3, 3)])).unwrap();
    assert_eq!(run_sequential(&board, 4), moved);
}

#[test]
fn test_bands_reassemble_to_full_step() {
    let board = Board::from_plaintext(
        "..O.....\nO.O.....\n.OO.....\n........\n....OOO.\n........\n.......O\nO.......\n",
    )
    .unwrap();
    let full = step(&board);

    for parallel in [false, true] {
        let bands = [Band::new(0, 3), Band::new(3, 5), Band::new(5, 8)]
            .iter()
            .map(|&band| evolve_band(&board, band, parallel).unwrap())
            .collect();
        assert_eq!(Board::stitch(8, 8, bands).unwrap(), full);
    }
}

#[test]
fn test_zero_turns_is_identity() {
    let board = Board::from_plaintext(".O.\nOO.\n..O\n").unwrap();
    assert_eq!(run_sequential(&board, 0), board);
}
