//! Static game configuration shared by server and client
//!
//! The room treats a [`GameConfig`] as read-only input. Upgrades are a closed
//! set of [`UpgradeKind`]s, each priced by a data-described [`UpgradeCurve`].

use crate::grid::world_to_grid;
use crate::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Grid sizes below this grow by one cell per round; larger grids grow by 5%.
pub const LINEAR_GROWTH_LIMIT: u32 = 10;
pub const GROWTH_FACTOR: f64 = 1.05;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpgradeKind {
    /// Raises the maximum paint supply
    PaintCapacity,
    /// Raises paint recovered per recharge step
    RechargeRate,
    /// Raises client movement speed
    MoveSpeed,
}

impl UpgradeKind {
    pub const ALL: [UpgradeKind; 3] = [
        UpgradeKind::PaintCapacity,
        UpgradeKind::RechargeRate,
        UpgradeKind::MoveSpeed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            UpgradeKind::PaintCapacity => "paint capacity",
            UpgradeKind::RechargeRate => "recharge rate",
            UpgradeKind::MoveSpeed => "move speed",
        }
    }
}

/// Level held in each upgrade.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeLevels {
    pub paint_capacity: u8,
    pub recharge_rate: u8,
    pub move_speed: u8,
}

impl UpgradeLevels {
    pub fn get(&self, kind: UpgradeKind) -> u8 {
        match kind {
            UpgradeKind::PaintCapacity => self.paint_capacity,
            UpgradeKind::RechargeRate => self.recharge_rate,
            UpgradeKind::MoveSpeed => self.move_speed,
        }
    }

    pub fn set(&mut self, kind: UpgradeKind, level: u8) {
        match kind {
            UpgradeKind::PaintCapacity => self.paint_capacity = level,
            UpgradeKind::RechargeRate => self.recharge_rate = level,
            UpgradeKind::MoveSpeed => self.move_speed = level,
        }
    }

    pub fn total(&self) -> u32 {
        UpgradeKind::ALL
            .iter()
            .map(|kind| u32::from(self.get(*kind)))
            .sum()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct UpgradeCurve {
    pub base_cost: u64,
    pub cost_multiplier: f64,
    pub max_level: u8,
    /// Effect added per level, in the upgrade's own unit
    pub effect_per_level: f32,
}

impl UpgradeCurve {
    /// Price of buying the level after `current_level`: `base * multiplier^level`, rounded.
    pub fn cost_at(&self, current_level: u8) -> u64 {
        let cost = self.base_cost as f64 * self.cost_multiplier.powi(i32::from(current_level));
        cost.round() as u64
    }

    pub fn effect(&self, level: u8) -> f32 {
        self.effect_per_level * f32::from(level.min(self.max_level))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpgradeTable {
    pub paint_capacity: UpgradeCurve,
    pub recharge_rate: UpgradeCurve,
    pub move_speed: UpgradeCurve,
}

impl UpgradeTable {
    pub fn curve(&self, kind: UpgradeKind) -> &UpgradeCurve {
        match kind {
            UpgradeKind::PaintCapacity => &self.paint_capacity,
            UpgradeKind::RechargeRate => &self.recharge_rate,
            UpgradeKind::MoveSpeed => &self.move_speed,
        }
    }
}

impl Default for UpgradeTable {
    fn default() -> Self {
        Self {
            paint_capacity: UpgradeCurve {
                base_cost: 20,
                cost_multiplier: 1.5,
                max_level: 10,
                effect_per_level: 25.0,
            },
            recharge_rate: UpgradeCurve {
                base_cost: 15,
                cost_multiplier: 1.4,
                max_level: 10,
                effect_per_level: 2.0,
            },
            move_speed: UpgradeCurve {
                base_cost: 10,
                cost_multiplier: 1.3,
                max_level: 5,
                effect_per_level: 0.1,
            },
        }
    }
}

/// The part of [`GameConfig`] clients need to predict the economy and find
/// the recharge zone. Shipped in every snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EconomyRules {
    pub paint_cost: f32,
    pub max_paint_supply: f32,
    pub recharge_rate: f32,
    pub recharge_zone_offset: f32,
    pub recharge_zone_radius: f32,
    pub upgrades: UpgradeTable,
}

/// Who receives a failed paint result that resolved to a real cell.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureBroadcast {
    /// Only the requesting connection
    Requester,
    /// Every connection, so all prediction caches resync on that cell
    #[default]
    Everyone,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub initial_grid_size: u32,
    pub cell_pixel_size: u32,
    pub palette: Vec<String>,
    pub paint_cost: f32,
    pub max_paint_supply: f32,
    pub recharge_rate: f32,
    /// Distance from the grid's lower edge to the recharge zone center
    pub recharge_zone_offset: f32,
    pub recharge_zone_radius: f32,
    pub recharge_interval_ms: u64,
    pub gold_reward_base: u64,
    pub upgrades: UpgradeTable,
    pub failure_broadcast: FailureBroadcast,
    pub max_name_length: usize,
    pub session_retention_secs: u64,
    /// Silence after which the server drops a connection
    pub client_timeout_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_grid_size: 5,
            cell_pixel_size: 40,
            palette: [
                "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0",
                "#f032e6",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            paint_cost: 5.0,
            max_paint_supply: 100.0,
            recharge_rate: 10.0,
            recharge_zone_offset: 120.0,
            recharge_zone_radius: 80.0,
            recharge_interval_ms: 500,
            gold_reward_base: 10,
            upgrades: UpgradeTable::default(),
            failure_broadcast: FailureBroadcast::default(),
            max_name_length: 20,
            session_retention_secs: 300,
            client_timeout_ms: 10_000,
        }
    }
}

impl GameConfig {
    pub fn economy(&self) -> EconomyRules {
        EconomyRules {
            paint_cost: self.paint_cost,
            max_paint_supply: self.max_paint_supply,
            recharge_rate: self.recharge_rate,
            recharge_zone_offset: self.recharge_zone_offset,
            recharge_zone_radius: self.recharge_zone_radius,
            upgrades: self.upgrades.clone(),
        }
    }

    /// Replaces the economy with the server's.
    pub fn adopt_economy(&mut self, rules: &EconomyRules) {
        self.paint_cost = rules.paint_cost;
        self.max_paint_supply = rules.max_paint_supply;
        self.recharge_rate = rules.recharge_rate;
        self.recharge_zone_offset = rules.recharge_zone_offset;
        self.recharge_zone_radius = rules.recharge_zone_radius;
        self.upgrades = rules.upgrades.clone();
    }

    pub fn num_colors(&self) -> u8 {
        self.palette.len().min(u8::MAX as usize) as u8
    }

    /// Number to color mapping over `1..=num_colors`.
    pub fn color_number_map(&self) -> BTreeMap<u8, String> {
        self.palette
            .iter()
            .take(u8::MAX as usize)
            .enumerate()
            .map(|(i, color)| (i as u8 + 1, color.clone()))
            .collect()
    }

    pub fn max_supply_for(&self, levels: &UpgradeLevels) -> f32 {
        self.max_paint_supply
            + self
                .upgrades
                .paint_capacity
                .effect(levels.get(UpgradeKind::PaintCapacity))
    }

    pub fn recharge_for(&self, levels: &UpgradeLevels) -> f32 {
        self.recharge_rate
            + self
                .upgrades
                .recharge_rate
                .effect(levels.get(UpgradeKind::RechargeRate))
    }

    pub fn speed_multiplier_for(&self, levels: &UpgradeLevels) -> f32 {
        1.0 + self
            .upgrades
            .move_speed
            .effect(levels.get(UpgradeKind::MoveSpeed))
    }

    /// Recharge zone center: below the grid, horizontally centered.
    pub fn recharge_zone_center(&self, grid_size: u32) -> Position {
        let half_extent = grid_size as f32 * self.cell_pixel_size as f32 / 2.0;
        Position::new(0.0, half_extent + self.recharge_zone_offset)
    }

    pub fn in_recharge_zone(&self, position: Position, grid_size: u32) -> bool {
        position.distance_to(self.recharge_zone_center(grid_size)) <= self.recharge_zone_radius
    }

    /// Default spawn point: just outside the grid's lower edge, between the
    /// grid and the recharge zone.
    pub fn spawn_position(&self, grid_size: u32) -> Position {
        let half_extent = grid_size as f32 * self.cell_pixel_size as f32 / 2.0;
        Position::new(0.0, half_extent + self.cell_pixel_size as f32 / 2.0)
    }

    pub fn locate(&self, position: Position, grid_size: u32) -> Option<(u32, u32)> {
        world_to_grid(position, grid_size, self.cell_pixel_size)
    }
}

/// Size of the next grid generation.
pub fn next_grid_size(current: u32) -> u32 {
    if current < LINEAR_GROWTH_LIMIT {
        current + 1
    } else {
        let scaled = (f64::from(current) * GROWTH_FACTOR).ceil() as u32;
        scaled.max(current + 1)
    }
}
