use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod codec;
pub mod config;
pub mod error;
pub mod grid;

pub use config::{EconomyRules, FailureBroadcast, GameConfig, UpgradeCurve, UpgradeKind, UpgradeLevels};
pub use error::{GridError, JoinRejection, PaintFailure, ProtocolError, PurchaseFailure};
pub use grid::{cell_center, world_to_grid, Cell, Grid, Progress};

/// Connection-scoped player identity, reassigned on every reconnect
pub type PlayerId = u32;
/// Opaque token that lets a reconnecting client reclaim its economy
pub type SessionToken = u64;
/// Grid coordinates `(x, y)` used to key per-cell caches
pub type CellKey = (u32, u32);

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // client -> server
    Join {
        name: String,
        resume_position: Option<Position>,
        resume_token: Option<SessionToken>,
    },
    Move {
        position: Position,
    },
    PaintRequest {
        position: Position,
        color_number: u8,
    },
    PurchaseUpgrade {
        upgrade: UpgradeKind,
    },
    Leave,
    /// Keeps an idle connection from timing out
    Heartbeat,

    // server -> client
    Welcome {
        player_id: PlayerId,
    },
    Snapshot(Snapshot),
    Joined {
        session_token: SessionToken,
    },
    JoinRejected {
        reason: String,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerMoved {
        player_id: PlayerId,
        position: Position,
    },
    PaintResult(PaintResult),
    PaintSupply {
        player_id: PlayerId,
        paint_supply: f32,
    },
    Gold {
        player_id: PlayerId,
        gold: u64,
    },
    UpgradeResult(UpgradeResult),
    PlayerUpgraded {
        player_id: PlayerId,
        upgrade: UpgradeKind,
        level: u8,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
    pub color: String,
    pub paint_supply: f32,
    pub gold: u64,
    pub upgrades: UpgradeLevels,
    pub cells_painted: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: String, position: Position, color: String, paint_supply: f32) -> Self {
        Self {
            id,
            name,
            position,
            color,
            paint_supply,
            gold: 0,
            upgrades: UpgradeLevels::default(),
            cells_painted: 0,
        }
    }
}

/// Complete authoritative state transfer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub players: Vec<Player>,
    /// Cells indexed `grid[x][y]`
    pub grid: Vec<Vec<Cell>>,
    pub grid_size: u32,
    pub cell_pixel_size: u32,
    pub colors: Vec<String>,
    pub color_number_map: BTreeMap<u8, String>,
    pub progress: Progress,
    pub economy: EconomyRules,
}

impl Snapshot {
    pub fn to_grid(&self) -> Result<Grid, GridError> {
        Grid::from_cells(self.grid.clone(), self.cell_pixel_size, &self.colors)
    }
}

/// Outcome of one paint request. `cell_x`/`cell_y` are -1 when the position
/// was outside the grid.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaintResult {
    pub player_id: PlayerId,
    pub username: String,
    pub cell_x: i32,
    pub cell_y: i32,
    pub color: String,
    pub color_number: u8,
    pub success: bool,
    pub failure: Option<PaintFailure>,
}

impl PaintResult {
    pub fn cell(&self) -> Option<(u32, u32)> {
        if self.cell_x < 0 || self.cell_y < 0 {
            None
        } else {
            Some((self.cell_x as u32, self.cell_y as u32))
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpgradeResult {
    pub success: bool,
    pub upgrade: UpgradeKind,
    pub new_level: u8,
    pub new_gold: u64,
    pub message: String,
}
