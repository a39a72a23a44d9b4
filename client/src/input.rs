//! Headless input: walks the grid in a serpentine and emits moves with change
//! detection

use crate::game::ClientGameState;
use crate::pending::PendingLedger;
use shared::{cell_center, Position};
use std::time::Instant;

/// Base movement speed in world units per second, before upgrades
pub const BASE_SPEED: f32 = 160.0;

/// Serpentine order over a `size`x`size` grid: column 0 top to bottom, column
/// 1 bottom to top, and so on.
pub fn serpentine(size: u32) -> Vec<(u32, u32)> {
    let mut path = Vec::with_capacity((size * size) as usize);
    for x in 0..size {
        if x % 2 == 0 {
            path.extend((0..size).map(|y| (x, y)));
        } else {
            path.extend((0..size).rev().map(|y| (x, y)));
        }
    }
    path
}

/// Steps from `from` toward `to` by at most `max_step`.
pub fn step_toward(from: Position, to: Position, max_step: f32) -> Position {
    let distance = from.distance_to(to);
    if distance <= max_step || distance == 0.0 {
        return to;
    }
    let t = max_step / distance;
    Position::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
}

/// Produces the local player's movement each tick
pub struct InputManager {
    path: Vec<(u32, u32)>,
    path_grid_size: u32,
    cursor: usize,
    last_sent: Option<Position>,
    last_update: Instant,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            path: Vec::new(),
            path_grid_size: 0,
            cursor: 0,
            last_sent: None,
            last_update: Instant::now(),
        }
    }

    /// Next target: the first unpainted cell along the path, or the recharge
    /// zone when out of paint.
    fn target<L: PendingLedger>(&mut self, game: &ClientGameState<L>) -> Option<Position> {
        let grid_size = game.grid_size();
        if grid_size == 0 {
            return None;
        }
        if grid_size != self.path_grid_size {
            self.path = serpentine(grid_size);
            self.path_grid_size = grid_size;
            self.cursor = 0;
        }

        let config = game.config();
        let supply = game.local_player().map(|p| p.paint_supply).unwrap_or(0.0);
        if supply < config.paint_cost {
            return Some(config.recharge_zone_center(grid_size));
        }

        while self.cursor < self.path.len() && game.is_painted(self.path[self.cursor]) {
            self.cursor += 1;
        }
        if self.cursor == self.path.len() {
            // Everything on our path is confirmed; restart to pick up cells
            // whose requests were dropped.
            self.cursor = 0;
            return None;
        }

        let (x, y) = self.path[self.cursor];
        Some(cell_center(x, y, grid_size, config.cell_pixel_size))
    }

    /// Advances the walk by the time since the previous call. Returns a new
    /// position only when it differs from the last one returned.
    pub fn update<L: PendingLedger>(
        &mut self,
        game: &ClientGameState<L>,
        now: Instant,
    ) -> Option<Position> {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        if game.input_suspended() {
            return None;
        }
        let current = game.position()?;
        let target = self.target(game)?;
        let speed = BASE_SPEED * game.speed_multiplier();
        let next = step_toward(current, target, speed * dt);

        if Some(next) == self.last_sent || next == current {
            return None;
        }
        self.last_sent = Some(next);
        Some(next)
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
