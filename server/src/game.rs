//! Authoritative room state: player registry, the live grid and the economy
//!
//! Every mutation goes through [`GameRoom`]. The room is owned by a single task
//! (see `network`), so each operation runs to completion before the next one
//! starts and check-then-mutate sequences like [`GameRoom::try_paint_cell`]
//! are linearizable without locks.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::config::next_grid_size;
use shared::{
    GameConfig, Grid, PaintFailure, Player, PlayerId, Position, Progress, PurchaseFailure,
    Snapshot, UpgradeKind,
};
use std::collections::{HashMap, HashSet};

const AVATAR_COLORS: [&str; 8] = [
    "blue", "red", "green", "purple", "orange", "cyan", "magenta", "yellow",
];

/// Avatar color picked from the player's connection id
pub fn avatar_color(player_id: PlayerId) -> String {
    AVATAR_COLORS[player_id as usize % AVATAR_COLORS.len()].to_string()
}

/// A successful paint, resolved to grid coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintedCell {
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub color_number: u8,
    /// Painter's supply after the cost was deducted
    pub paint_supply: f32,
    /// This paint finished the grid
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PurchaseReceipt {
    pub upgrade: UpgradeKind,
    pub new_level: u8,
    pub new_gold: u64,
    pub cost: u64,
}

/// Result of finishing a grid: gold paid to each player and the new size.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub gold: Vec<(PlayerId, u64)>,
    pub new_size: u32,
}

pub struct GameRoom {
    config: GameConfig,
    grid: Grid,
    players: HashMap<PlayerId, Player>,
    painted_cells: u32,
    recharged_since_tick: HashSet<PlayerId>,
    rng: StdRng,
}

impl GameRoom {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Room whose grid generations are reproducible.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, mut rng: StdRng) -> Self {
        let grid = Grid::generate_with(
            &mut rng,
            config.initial_grid_size,
            config.cell_pixel_size,
            &config.palette,
        );

        Self {
            config,
            grid,
            players: HashMap::new(),
            painted_cells: 0,
            recharged_since_tick: HashSet::new(),
            rng,
        }
    }

    /// Room starting from a prepared grid.
    pub fn with_grid(config: GameConfig, grid: Grid, seed: u64) -> Self {
        let painted_cells = grid.count_painted();
        Self {
            config,
            grid,
            players: HashMap::new(),
            painted_cells,
            recharged_since_tick: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_size(&self) -> u32 {
        self.grid.size()
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Registers a fresh player with full paint, no gold and no upgrades.
    /// The name must already be trimmed and validated.
    pub fn add_player(&mut self, player_id: PlayerId, name: String, start: Position) -> Player {
        let supply = self.config.max_paint_supply;
        let player = Player::new(player_id, name, start, avatar_color(player_id), supply);

        info!(
            "Added player {} '{}' at ({}, {})",
            player_id, player.name, start.x, start.y
        );
        self.players.insert(player_id, player.clone());
        player
    }

    /// Registers a player under a new connection id, carrying over the economy
    /// of a previous session.
    pub fn restore_player(
        &mut self,
        player_id: PlayerId,
        name: String,
        start: Position,
        previous: Player,
    ) -> Player {
        let player = Player {
            id: player_id,
            name,
            position: start,
            ..previous
        };

        info!(
            "Restored player {} '{}' (gold {}, {} upgrade levels)",
            player_id,
            player.name,
            player.gold,
            player.upgrades.total()
        );
        self.players.insert(player_id, player.clone());
        player
    }

    /// Removes a player; no-op if absent.
    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<Player> {
        self.recharged_since_tick.remove(&player_id);
        let removed = self.players.remove(&player_id);
        if removed.is_some() {
            info!("Removed player {}", player_id);
        }
        removed
    }

    /// Stores the player's new position. Returns the new paint supply when
    /// standing in the recharge zone changed it.
    pub fn update_position(&mut self, player_id: PlayerId, position: Position) -> Option<f32> {
        let grid_size = self.grid.size();
        let player = self.players.get_mut(&player_id)?;
        player.position = position;

        if !self.config.in_recharge_zone(position, grid_size) {
            return None;
        }
        self.recharged_since_tick.insert(player_id);
        recharge(&self.config, player)
    }

    /// Passive recharge for players dwelling in the zone who were not already
    /// recharged by a move since the previous tick.
    pub fn recharge_tick(&mut self) -> Vec<(PlayerId, f32)> {
        let grid_size = self.grid.size();
        let mut changed = Vec::new();

        for player in self.players.values_mut() {
            if self.recharged_since_tick.contains(&player.id) {
                continue;
            }
            if !self.config.in_recharge_zone(player.position, grid_size) {
                continue;
            }
            if let Some(supply) = recharge(&self.config, player) {
                changed.push((player.id, supply));
            }
        }

        self.recharged_since_tick.clear();
        changed
    }

    /// Validates and applies one paint request.
    pub fn try_paint_cell(
        &mut self,
        player_id: PlayerId,
        position: Position,
        color_number: u8,
    ) -> Result<PaintedCell, PaintFailure> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(PaintFailure::UnknownPlayer)?;

        if player.paint_supply < self.config.paint_cost {
            return Err(PaintFailure::OutOfPaint);
        }

        let (x, y) = self.grid.locate(position).ok_or(PaintFailure::OutsideGrid)?;
        let color = self.grid.paint(x, y, color_number)?;

        player.paint_supply = (player.paint_supply - self.config.paint_cost).max(0.0);
        player.cells_painted += 1;
        let paint_supply = player.paint_supply;
        self.painted_cells += 1;

        let completed = self.progress().is_complete();
        debug!(
            "Player {} painted ({}, {}) with {}; {}/{} cells",
            player_id,
            x,
            y,
            color,
            self.painted_cells,
            self.grid.total_cells()
        );

        Ok(PaintedCell {
            x,
            y,
            color,
            color_number,
            paint_supply,
            completed,
        })
    }

    /// Progress from the running counter, never from a grid scan.
    pub fn progress(&self) -> Progress {
        Progress::new(self.grid.total_cells(), self.painted_cells)
    }

    pub fn painted_cells(&self) -> u32 {
        self.painted_cells
    }

    /// Pays every connected player for the finished grid. The reward scales
    /// with the number of cells in the grid.
    pub fn award_completion_gold(&mut self) -> Vec<(PlayerId, u64)> {
        let reward = u64::from(self.grid.total_cells()) * self.config.gold_reward_base;

        let mut awarded: Vec<(PlayerId, u64)> = self
            .players
            .values_mut()
            .map(|player| {
                player.gold += reward;
                (player.id, player.gold)
            })
            .collect();
        awarded.sort_by_key(|(id, _)| *id);

        info!("Awarded {} gold to {} players", reward, awarded.len());
        awarded
    }

    /// Replaces the grid with a fresh, larger one. Players keep their
    /// positions and economy.
    pub fn grow_grid(&mut self) -> u32 {
        let new_size = next_grid_size(self.grid.size());
        self.grid = Grid::generate_with(
            &mut self.rng,
            new_size,
            self.config.cell_pixel_size,
            &self.config.palette,
        );
        self.painted_cells = 0;

        info!("Grid grew to {}x{}", new_size, new_size);
        new_size
    }

    /// Gold award followed by grid growth.
    pub fn complete_round(&mut self) -> RoundOutcome {
        let gold = self.award_completion_gold();
        let new_size = self.grow_grid();
        RoundOutcome { gold, new_size }
    }

    /// Buys exactly one level of an upgrade.
    pub fn purchase_upgrade(
        &mut self,
        player_id: PlayerId,
        upgrade: UpgradeKind,
    ) -> Result<PurchaseReceipt, PurchaseFailure> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(PurchaseFailure::UnknownPlayer)?;

        let curve = self.config.upgrades.curve(upgrade);
        let level = player.upgrades.get(upgrade);
        if level >= curve.max_level {
            return Err(PurchaseFailure::MaxLevel);
        }

        let cost = curve.cost_at(level);
        if player.gold < cost {
            return Err(PurchaseFailure::InsufficientGold {
                cost,
                gold: player.gold,
            });
        }

        player.gold -= cost;
        player.upgrades.set(upgrade, level + 1);

        info!(
            "Player {} bought {} level {} for {} gold",
            player_id,
            upgrade.label(),
            level + 1,
            cost
        );

        Ok(PurchaseReceipt {
            upgrade,
            new_level: level + 1,
            new_gold: player.gold,
            cost,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|p| p.id);

        Snapshot {
            players,
            grid: self.grid.cells().to_vec(),
            grid_size: self.grid.size(),
            cell_pixel_size: self.grid.cell_pixel_size(),
            colors: self.config.palette.clone(),
            color_number_map: self.config.color_number_map(),
            progress: self.progress(),
            economy: self.config.economy(),
        }
    }
}

/// One recharge step, clamped to the upgrade-adjusted maximum.
fn recharge(config: &GameConfig, player: &mut Player) -> Option<f32> {
    let max = config.max_supply_for(&player.upgrades);
    let next = (player.paint_supply + config.recharge_for(&player.upgrades)).min(max);

    if next > player.paint_supply {
        player.paint_supply = next;
        Some(next)
    } else {
        None
    }
}
