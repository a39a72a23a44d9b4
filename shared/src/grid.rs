//! Shared paint grid model
//!
//! The grid is a square of cells centered on the world origin. Each cell has a
//! required color number fixed at generation time and becomes painted exactly
//! once per grid generation. Server validation and client prediction both map
//! world positions through [`world_to_grid`], so the two always agree on which
//! cell a position belongs to.

use crate::error::{GridError, PaintFailure};
use crate::Position;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
    /// Required color number, 1-based index into the palette
    pub number: u8,
    /// Paint color once painted; `None` while unpainted
    pub color: Option<String>,
}

impl Cell {
    pub fn new(x: u32, y: u32, number: u8) -> Self {
        Self {
            x,
            y,
            number,
            color: None,
        }
    }

    pub fn is_painted(&self) -> bool {
        self.color.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total: u32,
    pub painted: u32,
    pub percent: u32,
}

impl Progress {
    /// Builds progress from a painted counter.
    ///
    /// The percentage is rounded, but only reports 100 once every cell is
    /// painted; a nearly complete large grid stays at 99.
    pub fn new(total: u32, painted: u32) -> Self {
        let percent = if total == 0 {
            0
        } else if painted >= total {
            100
        } else {
            let rounded = (100.0 * f64::from(painted) / f64::from(total)).round() as u32;
            rounded.min(99)
        };

        Self {
            total,
            painted,
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.percent == 100
    }
}

/// Square grid of cells, indexed `cells[x][y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    size: u32,
    cell_pixel_size: u32,
    palette: Vec<String>,
    cells: Vec<Vec<Cell>>,
}

impl Grid {
    /// Generates a fresh grid with uniformly random color numbers.
    pub fn generate(size: u32, cell_pixel_size: u32, palette: &[String]) -> Self {
        Self::generate_with(&mut rand::thread_rng(), size, cell_pixel_size, palette)
    }

    /// Reproducible variant of [`Grid::generate`].
    pub fn generate_seeded(size: u32, cell_pixel_size: u32, palette: &[String], seed: u64) -> Self {
        Self::generate_with(
            &mut StdRng::seed_from_u64(seed),
            size,
            cell_pixel_size,
            palette,
        )
    }

    pub fn generate_with<R: Rng + ?Sized>(
        rng: &mut R,
        size: u32,
        cell_pixel_size: u32,
        palette: &[String],
    ) -> Self {
        let num_colors = palette.len().clamp(1, u8::MAX as usize) as u8;
        let cells = (0..size)
            .map(|x| {
                (0..size)
                    .map(|y| Cell::new(x, y, rng.gen_range(1..=num_colors)))
                    .collect()
            })
            .collect();

        Self {
            size,
            cell_pixel_size,
            palette: palette.to_vec(),
            cells,
        }
    }

    /// Builds an unpainted grid from explicit color numbers, `numbers[x][y]`.
    pub fn from_numbers(
        numbers: &[Vec<u8>],
        cell_pixel_size: u32,
        palette: &[String],
    ) -> Result<Self, GridError> {
        let cells = numbers
            .iter()
            .enumerate()
            .map(|(x, column)| {
                column
                    .iter()
                    .enumerate()
                    .map(|(y, number)| Cell::new(x as u32, y as u32, *number))
                    .collect()
            })
            .collect();
        Self::from_cells(cells, cell_pixel_size, palette)
    }

    /// Rebuilds a grid from a snapshot payload, validating its shape.
    pub fn from_cells(
        cells: Vec<Vec<Cell>>,
        cell_pixel_size: u32,
        palette: &[String],
    ) -> Result<Self, GridError> {
        let size = cells.len();
        if size == 0 {
            return Err(GridError::Empty);
        }

        let max = palette.len().min(u8::MAX as usize) as u8;
        for (column_index, column) in cells.iter().enumerate() {
            if column.len() != size {
                return Err(GridError::NotSquare {
                    column: column_index,
                    len: column.len(),
                    size,
                });
            }
            for (row_index, cell) in column.iter().enumerate() {
                if cell.x as usize != column_index || cell.y as usize != row_index {
                    return Err(GridError::Misplaced {
                        column: column_index,
                        row: row_index,
                        x: cell.x,
                        y: cell.y,
                    });
                }
                if cell.number == 0 || cell.number > max {
                    return Err(GridError::NumberOutOfRange {
                        x: cell.x,
                        y: cell.y,
                        number: cell.number,
                        max,
                    });
                }
            }
        }

        Ok(Self {
            size: size as u32,
            cell_pixel_size,
            palette: palette.to_vec(),
            cells,
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn cell_pixel_size(&self) -> u32 {
        self.cell_pixel_size
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    pub fn cells(&self) -> &[Vec<Cell>] {
        &self.cells
    }

    pub fn total_cells(&self) -> u32 {
        self.size * self.size
    }

    pub fn cell(&self, x: u32, y: u32) -> Option<&Cell> {
        self.cells.get(x as usize)?.get(y as usize)
    }

    /// Palette color for a 1-based color number.
    pub fn color_for(&self, number: u8) -> Option<&str> {
        let index = usize::from(number).checked_sub(1)?;
        self.palette.get(index).map(String::as_str)
    }

    /// Cell containing a world position under this grid's geometry.
    pub fn locate(&self, position: Position) -> Option<(u32, u32)> {
        world_to_grid(position, self.size, self.cell_pixel_size)
    }

    /// Paints a cell if it is unpainted and `number` matches its required number.
    /// Returns the applied color.
    pub fn paint(&mut self, x: u32, y: u32, number: u8) -> Result<String, PaintFailure> {
        let color = self.color_for(number).map(str::to_string);
        let cell = self
            .cells
            .get_mut(x as usize)
            .and_then(|column| column.get_mut(y as usize))
            .ok_or(PaintFailure::OutsideGrid)?;

        if cell.is_painted() {
            return Err(PaintFailure::AlreadyPainted { x, y });
        }
        let color = match color {
            Some(color) if cell.number == number => color,
            _ => return Err(PaintFailure::WrongColor { x, y }),
        };

        cell.color = Some(color.clone());
        Ok(color)
    }

    /// Applies an authoritative paint without validation. Returns false if the
    /// cell does not exist.
    pub fn force_paint(&mut self, x: u32, y: u32, color: &str) -> bool {
        match self
            .cells
            .get_mut(x as usize)
            .and_then(|column| column.get_mut(y as usize))
        {
            Some(cell) => {
                cell.color = Some(color.to_string());
                true
            }
            None => false,
        }
    }

    /// Full scan of painted cells. The room keeps its own counter; this is for
    /// snapshot ingestion and verification.
    pub fn count_painted(&self) -> u32 {
        self.painted_cells().count() as u32
    }

    pub fn painted_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flatten().filter(|cell| cell.is_painted())
    }
}

/// Maps a world position to grid coordinates.
///
/// The grid is centered on the origin and each axis is split into half-open
/// cells `[k * c, (k + 1) * c)` measured from the grid's lower edge, so a
/// position exactly on an edge belongs to the cell that starts there: the
/// edge at `k * c` resolves to cell `k`, never `k - 1`. The floor is
/// corrected with exact integer multiples of the cell size, which keeps the
/// result free of division rounding at edges.
pub fn world_to_grid(position: Position, size: u32, cell_pixel_size: u32) -> Option<(u32, u32)> {
    Some((
        axis_to_index(position.x, size, cell_pixel_size)?,
        axis_to_index(position.y, size, cell_pixel_size)?,
    ))
}

fn axis_to_index(coord: f32, size: u32, cell_pixel_size: u32) -> Option<u32> {
    if !coord.is_finite() || size == 0 || cell_pixel_size == 0 {
        return None;
    }

    let cell = f64::from(cell_pixel_size);
    let offset = f64::from(coord) + f64::from(size) * cell / 2.0;

    let mut index = (offset / cell).floor();
    if index * cell > offset {
        index -= 1.0;
    } else if (index + 1.0) * cell <= offset {
        index += 1.0;
    }

    if index < 0.0 || index >= f64::from(size) {
        None
    } else {
        Some(index as u32)
    }
}

/// World position of a cell's center.
pub fn cell_center(x: u32, y: u32, size: u32, cell_pixel_size: u32) -> Position {
    let cell = f64::from(cell_pixel_size);
    let half = f64::from(size) * cell / 2.0;
    Position {
        x: ((f64::from(x) + 0.5) * cell - half) as f32,
        y: ((f64::from(y) + 0.5) * cell - half) as f32,
    }
}
