//! Client-side mirror of the room with optimistic paint deduplication
//!
//! The client never paints its grid ahead of the server. Prediction here means
//! not sending the same request twice: a cell is either confirmed painted,
//! pending, or eligible. Snapshots rebuild everything from scratch.

use crate::connection::ConnectionState;
use crate::pending::{LinearLedger, PendingLedger, PendingPaint};
use log::{debug, info, warn};
use shared::{
    CellKey, GameConfig, Grid, Packet, PaintFailure, PaintResult, Player, PlayerId, Position,
    Progress, SessionToken, Snapshot, UpgradeKind, UpgradeResult,
};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionSettings {
    /// Age after which an unanswered paint request is resent
    pub pending_timeout: Duration,
    /// Resends before a request is dropped
    pub max_retries: u32,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_millis(1500),
            max_retries: 3,
        }
    }
}

/// State changes for whatever presents the game.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SnapshotApplied {
        grid_size: u32,
    },
    GridResized {
        old_size: u32,
        new_size: u32,
    },
    CellPainted {
        x: u32,
        y: u32,
        color: String,
        player_id: PlayerId,
    },
    PaintRejected {
        key: Option<CellKey>,
        failure: Option<PaintFailure>,
    },
    SupplyChanged {
        player_id: PlayerId,
        paint_supply: f32,
    },
    GoldChanged {
        player_id: PlayerId,
        gold: u64,
    },
    UpgradeChanged {
        player_id: PlayerId,
        upgrade: UpgradeKind,
        level: u8,
    },
    PurchaseFinished(UpgradeResult),
    PlayerJoined(PlayerId),
    PlayerLeft(PlayerId),
    JoinRejected {
        reason: String,
    },
    /// The server ended the session with a reason
    ServerClosed {
        reason: String,
    },
    ConnectionChanged(ConnectionState),
    PaintingModeCancelled,
}

pub struct ClientGameState<L: PendingLedger = LinearLedger> {
    config: GameConfig,
    settings: PredictionSettings,

    local_id: Option<PlayerId>,
    name: String,
    last_position: Option<Position>,
    session_token: Option<SessionToken>,

    players: HashMap<PlayerId, Player>,
    grid: Option<Grid>,
    painted: HashSet<CellKey>,
    pending: L,

    joined: bool,
    input_suspended: bool,
    painting_mode: bool,
    events: Vec<ClientEvent>,
}

impl ClientGameState<LinearLedger> {
    pub fn new(name: &str, config: GameConfig, settings: PredictionSettings) -> Self {
        Self::with_ledger(name, config, settings, LinearLedger::new())
    }
}

impl<L: PendingLedger> ClientGameState<L> {
    pub fn with_ledger(
        name: &str,
        config: GameConfig,
        settings: PredictionSettings,
        ledger: L,
    ) -> Self {
        Self {
            config,
            settings,
            local_id: None,
            name: name.to_string(),
            last_position: None,
            session_token: None,
            players: HashMap::new(),
            grid: None,
            painted: HashSet::new(),
            pending: ledger,
            joined: false,
            input_suspended: true,
            painting_mode: false,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.local_id.and_then(|id| self.players.get(&id))
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn grid_size(&self) -> u32 {
        self.grid.as_ref().map(Grid::size).unwrap_or(0)
    }

    pub fn position(&self) -> Option<Position> {
        self.last_position
    }

    pub fn session_token(&self) -> Option<SessionToken> {
        self.session_token
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn input_suspended(&self) -> bool {
        self.input_suspended
    }

    pub fn is_painted(&self, key: CellKey) -> bool {
        self.painted.contains(&key)
    }

    pub fn is_pending(&self, key: CellKey) -> bool {
        self.pending.contains(key)
    }

    pub fn painted_count(&self) -> usize {
        self.painted.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn progress(&self) -> Progress {
        let total = self.grid.as_ref().map(Grid::total_cells).unwrap_or(0);
        Progress::new(total, self.painted.len() as u32)
    }

    pub fn painting_mode(&self) -> bool {
        self.painting_mode
    }

    pub fn set_painting_mode(&mut self, enabled: bool) {
        self.painting_mode = enabled;
    }

    /// Movement speed multiplier from the local player's upgrades.
    pub fn speed_multiplier(&self) -> f32 {
        self.local_player()
            .map(|p| self.config.speed_multiplier_for(&p.upgrades))
            .unwrap_or(1.0)
    }

    /// Takes the events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn push_event(&mut self, event: ClientEvent) {
        self.events.push(event);
    }

    /// Records a local move. Returns the packet to send, if any.
    pub fn set_position(&mut self, position: Position) -> Option<Packet> {
        if self.input_suspended {
            return None;
        }
        self.last_position = Some(position);
        if let Some(player) = self.local_id.and_then(|id| self.players.get_mut(&id)) {
            player.position = position;
        }
        Some(Packet::Move { position })
    }

    /// Attempts to paint the cell under the local player with that cell's own
    /// number.
    pub fn request_paint(&mut self, now: Instant) -> Option<Packet> {
        let position = self.last_position?;
        let number = {
            let grid = self.grid.as_ref()?;
            let (x, y) = grid.locate(position)?;
            grid.cell(x, y)?.number
        };
        self.request_paint_with(number, now)
    }

    /// Attempts to paint the cell under the local player. Cells outside the
    /// current grid, confirmed cells and pending cells are no-ops, and so is
    /// everything while the local supply is below the paint cost.
    pub fn request_paint_with(&mut self, color_number: u8, now: Instant) -> Option<Packet> {
        if self.input_suspended || !self.joined {
            return None;
        }
        if self.local_player()?.paint_supply < self.config.paint_cost {
            return None;
        }
        let position = self.last_position?;
        let grid = self.grid.as_ref()?;
        let key = grid.locate(position)?;

        if self.painted.contains(&key) || self.pending.contains(key) {
            return None;
        }
        if grid.cell(key.0, key.1).map_or(true, |c| c.is_painted()) {
            return None;
        }

        self.pending
            .insert(PendingPaint::new(key, color_number, position, now));
        debug!("Requesting paint at ({}, {}) with {}", key.0, key.1, color_number);
        Some(Packet::PaintRequest {
            position,
            color_number,
        })
    }

    /// Resends timed-out requests and drops those out of retries.
    pub fn sweep_pending(&mut self, now: Instant) -> Vec<Packet> {
        let expired = self
            .pending
            .take_expired(now, self.settings.pending_timeout);
        let mut resend = Vec::new();

        for mut request in expired {
            if request.retries >= self.settings.max_retries {
                debug!(
                    "Dropping paint request for ({}, {}) after {} retries",
                    request.key.0, request.key.1, request.retries
                );
                continue;
            }
            request.retries += 1;
            request.issued_at = now;
            resend.push(Packet::PaintRequest {
                position: request.position,
                color_number: request.color_number,
            });
            self.pending.insert(request);
        }
        resend
    }

    /// Applies one server packet. Returns a reply to send, if any.
    pub fn apply_packet(&mut self, packet: Packet) -> Option<Packet> {
        match packet {
            Packet::Welcome { player_id } => return Some(self.on_welcome(player_id)),
            Packet::Snapshot(snapshot) => self.apply_snapshot(&snapshot),
            Packet::Joined { session_token } => {
                self.session_token = Some(session_token);
            }
            Packet::JoinRejected { reason } => {
                warn!("Join rejected: {}", reason);
                self.events.push(ClientEvent::JoinRejected { reason });
            }
            Packet::PlayerJoined { player } => {
                if Some(player.id) != self.local_id {
                    self.events.push(ClientEvent::PlayerJoined(player.id));
                    self.players.insert(player.id, player);
                }
            }
            Packet::PlayerMoved {
                player_id,
                position,
            } => {
                // Our own position is ours to predict
                if Some(player_id) != self.local_id {
                    if let Some(player) = self.players.get_mut(&player_id) {
                        player.position = position;
                    }
                }
            }
            Packet::PaintResult(result) => self.apply_paint_result(&result),
            Packet::PaintSupply {
                player_id,
                paint_supply,
            } => self.apply_supply(player_id, paint_supply),
            Packet::Gold { player_id, gold } => self.apply_gold(player_id, gold),
            Packet::UpgradeResult(result) => self.apply_upgrade_result(result),
            Packet::PlayerUpgraded {
                player_id,
                upgrade,
                level,
            } => self.apply_upgrade_level(player_id, upgrade, level),
            Packet::PlayerLeft { player_id } => {
                if self.players.remove(&player_id).is_some() {
                    self.events.push(ClientEvent::PlayerLeft(player_id));
                }
            }
            Packet::Disconnected { reason } => {
                warn!("Server closed the connection: {}", reason);
                self.on_disconnect();
                self.events.push(ClientEvent::ServerClosed { reason });
            }
            other => {
                warn!("Unexpected packet from server: {:?}", other);
            }
        }
        None
    }

    /// Replaces all derived state with the snapshot's.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let grid = match snapshot.to_grid() {
            Ok(grid) => grid,
            Err(e) => {
                warn!("Ignoring malformed snapshot: {}", e);
                return;
            }
        };

        // Geometry and economy are the server's, whatever we started with
        self.config.adopt_economy(&snapshot.economy);
        self.config.cell_pixel_size = snapshot.cell_pixel_size;
        self.config.palette = snapshot.colors.clone();

        let old_size = self.grid_size();
        let new_size = grid.size();
        if self.grid.is_some() && old_size != new_size {
            info!("Grid resized from {} to {}", old_size, new_size);
            self.events
                .push(ClientEvent::GridResized { old_size, new_size });
            if self.painting_mode {
                self.painting_mode = false;
                self.events.push(ClientEvent::PaintingModeCancelled);
            }
        }

        self.painted = grid.painted_cells().map(|c| (c.x, c.y)).collect();
        self.pending.clear();
        self.grid = Some(grid);

        self.players = snapshot
            .players
            .iter()
            .map(|p| (p.id, p.clone()))
            .collect();

        if let Some(id) = self.local_id {
            if let Some(player) = self.players.get_mut(&id) {
                match self.last_position {
                    Some(position) if self.joined => player.position = position,
                    _ => self.last_position = Some(player.position),
                }
                self.joined = true;
                self.input_suspended = false;
            }
        }

        self.events
            .push(ClientEvent::SnapshotApplied { grid_size: new_size });
    }

    pub fn apply_paint_result(&mut self, result: &PaintResult) {
        let key = result.cell();
        let own = Some(result.player_id) == self.local_id;

        if own {
            if let Some(key) = key {
                self.pending.remove(key);
            }
        }

        if !result.success {
            if own {
                debug!("Paint rejected: {:?}", result.failure);
                self.events.push(ClientEvent::PaintRejected {
                    key,
                    failure: result.failure,
                });
            }
            return;
        }

        let Some((x, y)) = key else {
            return;
        };
        // A result for a cell our grid doesn't have belongs to another generation.
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if grid.cell(x, y).is_none() {
            return;
        }

        grid.force_paint(x, y, &result.color);
        if self.painted.insert((x, y)) {
            self.events.push(ClientEvent::CellPainted {
                x,
                y,
                color: result.color.clone(),
                player_id: result.player_id,
            });
        }
        if let Some(player) = self.players.get_mut(&result.player_id) {
            player.cells_painted += 1;
        }
    }

    fn apply_supply(&mut self, player_id: PlayerId, paint_supply: f32) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.paint_supply = paint_supply;
            self.events.push(ClientEvent::SupplyChanged {
                player_id,
                paint_supply,
            });
        }
    }

    fn apply_gold(&mut self, player_id: PlayerId, gold: u64) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.gold = gold;
            self.events.push(ClientEvent::GoldChanged { player_id, gold });
        }
    }

    fn apply_upgrade_level(&mut self, player_id: PlayerId, upgrade: UpgradeKind, level: u8) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.upgrades.set(upgrade, level);
            self.events.push(ClientEvent::UpgradeChanged {
                player_id,
                upgrade,
                level,
            });
        }
    }

    fn apply_upgrade_result(&mut self, result: UpgradeResult) {
        if result.success {
            info!("{}", result.message);
            if let Some(id) = self.local_id {
                self.apply_upgrade_level(id, result.upgrade, result.new_level);
                self.apply_gold(id, result.new_gold);
            }
        } else {
            info!("Upgrade failed: {}", result.message);
        }
        self.events.push(ClientEvent::PurchaseFinished(result));
    }

    /// Moves everything keyed by `old_id` to `new_id`.
    pub fn migrate(&mut self, old_id: PlayerId, new_id: PlayerId) -> bool {
        if old_id == new_id {
            return false;
        }
        if self.local_id == Some(old_id) {
            self.local_id = Some(new_id);
        }
        match self.players.remove(&old_id) {
            Some(mut player) => {
                player.id = new_id;
                self.players.insert(new_id, player);
                debug!("Migrated local state from {} to {}", old_id, new_id);
                true
            }
            None => false,
        }
    }

    /// Transport lost: stop producing input until the next snapshot.
    pub fn on_disconnect(&mut self) {
        self.input_suspended = true;
        self.joined = false;
        self.pending.clear();
    }

    /// The server assigned this connection its identity. Returns the Join to
    /// send, carrying the cached name, last position and resume token.
    pub fn on_welcome(&mut self, player_id: PlayerId) -> Packet {
        if let Some(old_id) = self.local_id {
            if old_id != player_id {
                info!("Connection identity changed from {} to {}", old_id, player_id);
                self.migrate(old_id, player_id);
            }
        }
        self.local_id = Some(player_id);
        self.pending.clear();
        self.painted.clear();
        self.joined = false;
        self.input_suspended = true;

        Packet::Join {
            name: self.name.clone(),
            resume_position: self.last_position,
            resume_token: self.session_token,
        }
    }

    /// Asks to buy one level of an upgrade.
    pub fn purchase(&self, upgrade: UpgradeKind) -> Option<Packet> {
        if self.joined {
            Some(Packet::PurchaseUpgrade { upgrade })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::DeadlineLedger;
    use shared::cell_center;

    /// Size-2 snapshot, cell (0,0) numbered 3, with the local player at the
    /// center of cell (0,0).
    fn snapshot_with(local: PlayerId, painted: &[(u32, u32)], size: u32) -> Snapshot {
        let config = GameConfig::default();
        let mut grid = if size == 2 {
            Grid::from_numbers(&[vec![3, 1], vec![2, 4]], 40, &config.palette).unwrap()
        } else {
            Grid::generate_seeded(size, 40, &config.palette, 5)
        };
        for (x, y) in painted {
            let number = grid.cell(*x, *y).unwrap().number;
            grid.paint(*x, *y, number).unwrap();
        }

        let player = Player::new(
            local,
            "ana".to_string(),
            cell_center(0, 0, size, 40),
            "blue".to_string(),
            100.0,
        );
        Snapshot {
            players: vec![player],
            grid: grid.cells().to_vec(),
            grid_size: size,
            cell_pixel_size: 40,
            colors: config.palette.clone(),
            color_number_map: config.color_number_map(),
            progress: Progress::new(size * size, painted.len() as u32),
            economy: config.economy(),
        }
    }

    fn joined_state(id: PlayerId) -> ClientGameState {
        let mut state = ClientGameState::new(
            "ana",
            GameConfig::default(),
            PredictionSettings {
                pending_timeout: Duration::from_millis(100),
                max_retries: 2,
            },
        );
        state.apply_packet(Packet::Welcome { player_id: id });
        state.apply_packet(Packet::Snapshot(snapshot_with(id, &[], 2)));
        state
    }

    fn success(player_id: PlayerId, x: i32, y: i32) -> PaintResult {
        PaintResult {
            player_id,
            username: "ana".to_string(),
            cell_x: x,
            cell_y: y,
            color: "#e6194b".to_string(),
            color_number: 3,
            success: true,
            failure: None,
        }
    }

    #[test]
    fn test_welcome_returns_join() {
        let mut state = ClientGameState::new("ana", GameConfig::default(), PredictionSettings::default());
        let join = state.apply_packet(Packet::Welcome { player_id: 4 });

        assert_eq!(
            join,
            Some(Packet::Join {
                name: "ana".to_string(),
                resume_position: None,
                resume_token: None
            })
        );
        assert!(state.input_suspended());
        assert_eq!(state.set_position(Position::new(1.0, 1.0)), None);
    }

    #[test]
    fn test_request_paint_auto_selects_number() {
        let mut state = joined_state(1);
        assert!(state.is_joined());

        let packet = state.request_paint(Instant::now());
        assert_eq!(
            packet,
            Some(Packet::PaintRequest {
                position: cell_center(0, 0, 2, 40),
                color_number: 3
            })
        );
        assert!(state.is_pending((0, 0)));

        // pending cells are not requested twice
        assert_eq!(state.request_paint(Instant::now()), None);
        assert_eq!(state.pending_count(), 1);
    }

    #[test]
    fn test_out_of_bounds_request_is_noop() {
        let mut state = joined_state(1);
        state.set_position(Position::new(500.0, 500.0));

        assert_eq!(state.request_paint(Instant::now()), None);
        assert_eq!(state.request_paint_with(2, Instant::now()), None);
        assert_eq!(state.pending_count(), 0);
    }

    #[test]
    fn test_own_success_marks_cell_painted() {
        let mut state = joined_state(1);
        state.request_paint(Instant::now());

        state.apply_paint_result(&success(1, 0, 0));

        assert!(!state.is_pending((0, 0)));
        assert!(state.is_painted((0, 0)));
        assert!(state.grid().unwrap().cell(0, 0).unwrap().is_painted());
        assert_eq!(state.progress().painted, 1);
        assert_eq!(state.request_paint(Instant::now()), None);
        assert!(state
            .drain_events()
            .contains(&ClientEvent::CellPainted {
                x: 0,
                y: 0,
                color: "#e6194b".to_string(),
                player_id: 1
            }));
    }

    #[test]
    fn test_snapshot_economy_overrides_local_config() {
        let mut state = ClientGameState::new("ana", GameConfig::default(), PredictionSettings::default());
        let mut snapshot = snapshot_with(1, &[], 2);
        snapshot.economy.paint_cost = 30.0;
        snapshot.economy.recharge_zone_offset = 200.0;
        snapshot.economy.upgrades.move_speed.effect_per_level = 0.5;
        snapshot.players[0].upgrades.move_speed = 2;
        snapshot.players[0].paint_supply = 20.0;

        state.apply_packet(Packet::Welcome { player_id: 1 });
        state.apply_packet(Packet::Snapshot(snapshot));

        assert_eq!(state.config().paint_cost, 30.0);
        assert_eq!(state.config().recharge_zone_center(2), Position::new(0.0, 240.0));
        assert!((state.speed_multiplier() - 2.0).abs() < 1e-6);

        // 20 < 30: nothing is sent until the supply comes back
        assert_eq!(state.request_paint(Instant::now()), None);
        assert_eq!(state.pending_count(), 0);
        state.apply_packet(Packet::PaintSupply {
            player_id: 1,
            paint_supply: 30.0,
        });
        assert!(state.request_paint(Instant::now()).is_some());
    }

    #[test]
    fn test_own_failure_leaves_cell_eligible() {
        let mut state = joined_state(1);
        state.request_paint(Instant::now());

        state.apply_paint_result(&PaintResult {
            success: false,
            failure: Some(PaintFailure::OutOfPaint),
            ..success(1, 0, 0)
        });

        assert!(!state.is_pending((0, 0)));
        assert!(!state.is_painted((0, 0)));
        assert!(state.request_paint(Instant::now()).is_some());
    }

    #[test]
    fn test_other_players_results() {
        let mut state = joined_state(1);
        state.request_paint(Instant::now());

        // another player's failure on our cell does not clear our request
        state.apply_paint_result(&PaintResult {
            success: false,
            failure: Some(PaintFailure::WrongColor { x: 0, y: 0 }),
            ..success(2, 0, 0)
        });
        assert!(state.is_pending((0, 0)));

        state.apply_paint_result(&success(2, 1, 1));
        assert!(state.is_painted((1, 1)));

        // stale result for a cell outside this grid generation
        state.apply_paint_result(&success(2, 7, 7));
        assert!(!state.is_painted((7, 7)));
    }

    #[test]
    fn test_sweep_retries_then_drops() {
        let mut state = joined_state(1);
        let start = Instant::now();
        state.request_paint(start);

        assert!(state.sweep_pending(start + Duration::from_millis(50)).is_empty());

        let resent = state.sweep_pending(start + Duration::from_millis(100));
        assert_eq!(resent.len(), 1);
        assert!(state.is_pending((0, 0)));

        let resent = state.sweep_pending(start + Duration::from_millis(200));
        assert_eq!(resent.len(), 1);

        // retries exhausted: dropped and eligible again
        assert!(state.sweep_pending(start + Duration::from_millis(300)).is_empty());
        assert!(!state.is_pending((0, 0)));
        assert!(state.request_paint(start + Duration::from_millis(300)).is_some());
    }

    #[test]
    fn test_snapshot_idempotent() {
        let mut state = joined_state(1);
        state.request_paint(Instant::now());
        let snapshot = snapshot_with(1, &[(1, 0), (1, 1)], 2);

        state.apply_snapshot(&snapshot);
        let painted_once: Vec<bool> = [(0, 0), (0, 1), (1, 0), (1, 1)]
            .iter()
            .map(|k| state.is_painted(*k))
            .collect();
        let players_once = state.player_count();

        state.apply_snapshot(&snapshot);
        let painted_twice: Vec<bool> = [(0, 0), (0, 1), (1, 0), (1, 1)]
            .iter()
            .map(|k| state.is_painted(*k))
            .collect();

        assert_eq!(painted_once, painted_twice);
        assert_eq!(painted_twice, vec![false, false, true, true]);
        assert_eq!(state.painted_count(), 2);
        assert_eq!(state.pending_count(), 0);
        assert_eq!(state.player_count(), players_once);
    }

    #[test]
    fn test_grid_resize_cancels_painting_mode() {
        let mut state = joined_state(1);
        state.set_painting_mode(true);
        state.drain_events();

        state.apply_snapshot(&snapshot_with(1, &[], 3));

        assert!(!state.painting_mode());
        assert_eq!(state.grid_size(), 3);
        let events = state.drain_events();
        assert!(events.contains(&ClientEvent::GridResized {
            old_size: 2,
            new_size: 3
        }));
        assert!(events.contains(&ClientEvent::PaintingModeCancelled));
    }

    #[test]
    fn test_same_size_snapshot_keeps_painting_mode() {
        let mut state = joined_state(1);
        state.set_painting_mode(true);
        state.apply_snapshot(&snapshot_with(1, &[(0, 1)], 2));
        assert!(state.painting_mode());
    }

    #[test]
    fn test_reconnect_migrates_identity() {
        let mut state = joined_state(1);
        state.apply_packet(Packet::Joined { session_token: 77 });
        let moved = Position::new(-10.0, 5.0);
        state.set_position(moved);
        state.request_paint(Instant::now());

        state.on_disconnect();
        assert!(state.input_suspended());
        assert_eq!(state.set_position(Position::new(0.0, 0.0)), None);
        assert_eq!(state.pending_count(), 0);

        let join = state.apply_packet(Packet::Welcome { player_id: 9 });
        assert_eq!(
            join,
            Some(Packet::Join {
                name: "ana".to_string(),
                resume_position: Some(moved),
                resume_token: Some(77)
            })
        );
        assert_eq!(state.local_id(), Some(9));
        assert!(state.player(1).is_none());
        assert_eq!(state.local_player().unwrap().id, 9);
        assert_eq!(state.painted_count(), 0);

        // the rejoin snapshot places us where we were
        let mut snapshot = snapshot_with(9, &[], 2);
        snapshot.players[0].position = moved;
        state.apply_snapshot(&snapshot);
        assert!(!state.input_suspended());
        assert_eq!(state.position(), Some(moved));
    }

    #[test]
    fn test_local_position_survives_snapshot() {
        let mut state = joined_state(1);
        let local = Position::new(3.0, 3.0);
        state.set_position(local);

        state.apply_snapshot(&snapshot_with(1, &[], 2));

        assert_eq!(state.local_player().unwrap().position, local);
        assert_eq!(state.position(), Some(local));
    }

    #[test]
    fn test_economy_updates_and_purchase() {
        let mut state = joined_state(1);
        state.apply_packet(Packet::Gold {
            player_id: 1,
            gold: 40,
        });
        state.apply_packet(Packet::PaintSupply {
            player_id: 1,
            paint_supply: 55.0,
        });
        state.apply_packet(Packet::UpgradeResult(UpgradeResult {
            success: true,
            upgrade: UpgradeKind::MoveSpeed,
            new_level: 1,
            new_gold: 30,
            message: "ok".to_string(),
        }));

        let player = state.local_player().unwrap();
        assert_eq!(player.gold, 30);
        assert_eq!(player.upgrades.move_speed, 1);
        assert!((player.paint_supply - 55.0).abs() < f32::EPSILON);
        assert!(state.speed_multiplier() > 1.0);
        assert_eq!(
            state.purchase(UpgradeKind::PaintCapacity),
            Some(Packet::PurchaseUpgrade {
                upgrade: UpgradeKind::PaintCapacity
            })
        );
    }

    #[test]
    fn test_other_players_tracked() {
        let mut state = joined_state(1);
        let other = Player::new(2, "bo".to_string(), Position::default(), "red".to_string(), 100.0);

        state.apply_packet(Packet::PlayerJoined { player: other });
        state.apply_packet(Packet::PlayerMoved {
            player_id: 2,
            position: Position::new(8.0, 8.0),
        });
        state.apply_packet(Packet::PlayerMoved {
            player_id: 1,
            position: Position::new(99.0, 99.0),
        });

        assert_eq!(state.player(2).unwrap().position, Position::new(8.0, 8.0));
        assert_ne!(state.local_player().unwrap().position, Position::new(99.0, 99.0));

        state.apply_packet(Packet::PlayerLeft { player_id: 2 });
        assert!(state.player(2).is_none());
    }

    #[test]
    fn test_deadline_ledger_engine() {
        let mut state = ClientGameState::with_ledger(
            "ana",
            GameConfig::default(),
            PredictionSettings::default(),
            DeadlineLedger::new(),
        );
        state.apply_packet(Packet::Welcome { player_id: 1 });
        state.apply_packet(Packet::Snapshot(snapshot_with(1, &[], 2)));

        assert!(state.request_paint(Instant::now()).is_some());
        assert!(state.request_paint(Instant::now()).is_none());
        state.apply_paint_result(&success(1, 0, 0));
        assert_eq!(state.pending_count(), 0);
    }
}
