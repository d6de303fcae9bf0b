//! Board and band types
//!
//! A board is a row-major `height x width` grid of cell bytes. Cells are
//! either [`ALIVE`] or [`DEAD`]; neighbour lookups wrap toroidally.

use serde::{Deserialize, Serialize};

use crate::error::{LifeError, Result};

/// Byte value of a live cell
pub const ALIVE: u8 = 255;

/// Byte value of a dead cell
pub const DEAD: u8 = 0;

/// Rows of cell bytes, as carried on the wire
pub type Rows = Vec<Vec<u8>>;

/// Coordinates of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

/// Half-open row range `[start_y, end_y)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub start_y: usize,
    pub end_y: usize,
}

impl Band {
    pub fn new(start_y: usize, end_y: usize) -> Self {
        Self { start_y, end_y }
    }

    /// Number of rows in the band
    pub fn len(&self) -> usize {
        self.end_y.saturating_sub(self.start_y)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check `0 <= start_y < end_y <= height`
    pub fn validate(&self, height: usize) -> Result<()> {
        if self.start_y >= self.end_y || self.end_y > height {
            return Err(LifeError::BandOutOfBounds {
                start_y: self.start_y,
                end_y: self.end_y,
                height,
            });
        }
        Ok(())
    }
}

/// Full grid of cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

/// Cell count of a `width` x `height` board, refusing empty or overflowing geometry
fn area(width: usize, height: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(LifeError::InvalidGeometry {
            reason: format!("board must be non-empty, got {}x{}", width, height),
        });
    }
    width.checked_mul(height).ok_or_else(|| LifeError::InvalidGeometry {
        reason: format!("{}x{} board is too large", width, height),
    })
}

impl Board {
    /// All-dead board. Runs refuse a board with a zero dimension.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![DEAD; width * height],
        }
    }

    /// Build from a flat row-major cell vector
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Result<Self> {
        let expected = area(width, height)?;
        if cells.len() != expected {
            return Err(LifeError::InvalidGeometry {
                reason: format!(
                    "expected {} cells for {}x{}, got {}",
                    expected,
                    width,
                    height,
                    cells.len()
                ),
            });
        }
        if let Some(idx) = cells.iter().position(|&c| c != ALIVE && c != DEAD) {
            return Err(LifeError::InvalidCell {
                x: idx % width,
                y: idx / width,
                value: cells[idx],
            });
        }
        Ok(Self { width, height, cells })
    }

    /// Cells produced by evolution are already two-valued
    pub(crate) fn from_raw(width: usize, height: usize, cells: Vec<u8>) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self { width, height, cells }
    }

    /// Build from wire rows, rejecting rows that disagree with the declared geometry.
    ///
    /// Every row is checked before anything is allocated, so the declared
    /// size alone never drives an allocation.
    pub fn from_rows(width: usize, height: usize, rows: &[Vec<u8>]) -> Result<Self> {
        if rows.len() != height {
            return Err(LifeError::InvalidGeometry {
                reason: format!("declared height {} but got {} rows", height, rows.len()),
            });
        }
        if let Some((y, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(LifeError::InvalidGeometry {
                reason: format!(
                    "row {} has {} cells, declared width is {}",
                    y,
                    row.len(),
                    width
                ),
            });
        }
        let mut cells = Vec::with_capacity(area(width, height)?);
        for row in rows {
            cells.extend_from_slice(row);
        }
        Self::from_cells(width, height, cells)
    }

    /// Build a board with the given cells alive
    pub fn with_alive(width: usize, height: usize, alive: &[Cell]) -> Result<Self> {
        let mut board = Self::from_cells(width, height, vec![DEAD; area(width, height)?])?;
        for cell in alive {
            board.set(cell.x, cell.y, true)?;
        }
        Ok(board)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Flat row-major cells
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// One row of the board
    pub fn row(&self, y: usize) -> &[u8] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    /// Copy out as wire rows
    pub fn to_rows(&self) -> Rows {
        if self.width == 0 {
            return vec![Vec::new(); self.height];
        }
        self.cells.chunks(self.width).map(<[u8]>::to_vec).collect()
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x] == ALIVE
    }

    /// Toroidal lookup; coordinates wrap modulo width/height
    pub fn is_alive_wrapped(&self, x: isize, y: isize) -> bool {
        let x = x.rem_euclid(self.width as isize) as usize;
        let y = y.rem_euclid(self.height as isize) as usize;
        self.is_alive(x, y)
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(LifeError::InvalidGeometry {
                reason: format!("cell ({}, {}) outside {}x{}", x, y, self.width, self.height),
            });
        }
        self.cells[y * self.width + x] = if alive { ALIVE } else { DEAD };
        Ok(())
    }

    /// Full scan counting live cells
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    /// Coordinates of every live cell, row-major order
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == ALIVE)
            .map(|(idx, _)| Cell {
                x: idx % self.width,
                y: idx / self.width,
            })
            .collect()
    }

    /// Concatenate bands in order into a board of `height` rows.
    ///
    /// Every band must be `width` wide and the row counts must add up to
    /// `height`; otherwise the merge is refused.
    pub fn stitch(width: usize, height: usize, bands: Vec<Board>) -> Result<Self> {
        let mut cells = Vec::with_capacity(width * height);
        for band in bands {
            if band.width != width {
                return Err(LifeError::InvalidGeometry {
                    reason: format!("band width {} does not match board width {}", band.width, width),
                });
            }
            cells.extend(band.cells);
        }
        if cells.len() != width * height {
            return Err(LifeError::InvalidGeometry {
                reason: format!(
                    "bands cover {} rows, board has {}",
                    cells.len() / width.max(1),
                    height
                ),
            });
        }
        Ok(Self { width, height, cells })
    }

    /// Parse a plaintext (`.cells`) pattern.
    ///
    /// Lines starting with `!` are comments; `O` or `*` is alive, anything
    /// else dead. Short lines are padded with dead cells.
    pub fn from_plaintext(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.starts_with('!'))
            .collect();
        let height = lines.len();
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

        let mut board = Self::from_cells(width, height, vec![DEAD; width * height])?;
        for (y, line) in lines.iter().enumerate() {
            for (x, ch) in line.chars().enumerate() {
                if ch == 'O' || ch == '*' {
                    board.cells[y * width + x] = ALIVE;
                }
            }
        }
        Ok(board)
    }

    /// Render as a plaintext (`.cells`) pattern
    pub fn to_plaintext(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for y in 0..self.height {
            for &c in self.row(y) {
                out.push(if c == ALIVE { 'O' } else { '.' });
            }
            out.push('\n');
        }
        out
    }
}
