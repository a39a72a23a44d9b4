use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a paint request was refused by the room.
///
/// `AlreadyPainted` and `WrongColor` carry the resolved cell so every client
/// can resynchronize that cell; the other variants never touched shared state.
#[derive(Debug, Error, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PaintFailure {
    #[error("unknown player")]
    UnknownPlayer,
    #[error("not enough paint")]
    OutOfPaint,
    #[error("position is outside the grid")]
    OutsideGrid,
    #[error("cell ({x}, {y}) is already painted")]
    AlreadyPainted { x: u32, y: u32 },
    #[error("wrong color for cell ({x}, {y})")]
    WrongColor { x: u32, y: u32 },
}

impl PaintFailure {
    /// Cell the failure refers to, if the request resolved to one.
    pub fn cell(&self) -> Option<(u32, u32)> {
        match *self {
            PaintFailure::AlreadyPainted { x, y } | PaintFailure::WrongColor { x, y } => {
                Some((x, y))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseFailure {
    #[error("unknown player")]
    UnknownPlayer,
    #[error("upgrade is already at max level")]
    MaxLevel,
    #[error("not enough gold (need {cost}, have {gold})")]
    InsufficientGold { cost: u64, gold: u64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinRejection {
    #[error("name must not be empty")]
    EmptyName,
    #[error("Server full")]
    ServerFull,
}

/// Grid payloads that cannot form a valid grid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("grid must have at least one cell")]
    Empty,
    #[error("grid is not square: column {column} has {len} cells, expected {size}")]
    NotSquare { column: usize, len: usize, size: usize },
    #[error("cell ({x}, {y}) has color number {number} outside 1..={max}")]
    NumberOutOfRange { x: u32, y: u32, number: u8, max: u8 },
    #[error("cell stored at [{column}][{row}] claims coordinates ({x}, {y})")]
    Misplaced { column: usize, row: usize, x: u32, y: u32 },
}

/// Transport-level failures; these close the offending connection only.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}
