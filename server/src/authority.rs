//! Server reconciliation logic: turns inbound packets into room mutations and
//! the outbound messages that keep every client consistent
//!
//! [`Authority`] is transport-free. It takes one packet at a time from the
//! room task and returns the [`GameMessage`]s to route, in the order they must
//! be delivered.

use crate::game::{GameRoom, PaintedCell};
use crate::session::SessionStore;
use log::{debug, info, warn};
use shared::{
    FailureBroadcast, JoinRejection, Packet, PaintFailure, PaintResult, Player, PlayerId, Position,
    SessionToken, UpgradeKind, UpgradeResult,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Messages from the room logic to the network layer
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        client_id: PlayerId,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PlayerId>,
    },
    /// Tell one connection why, then close it. Its player is already gone.
    Disconnect {
        client_id: PlayerId,
        reason: String,
    },
}

impl GameMessage {
    fn to(client_id: PlayerId, packet: Packet) -> Self {
        GameMessage::SendPacket { packet, client_id }
    }

    fn everyone(packet: Packet) -> Self {
        GameMessage::BroadcastPacket {
            packet,
            exclude: None,
        }
    }

    fn others(client_id: PlayerId, packet: Packet) -> Self {
        GameMessage::BroadcastPacket {
            packet,
            exclude: Some(client_id),
        }
    }
}

/// Trims a display name and caps it at `max_len` characters.
pub fn sanitize_name(raw: &str, max_len: usize) -> Result<String, JoinRejection> {
    let name: String = raw.trim().chars().take(max_len).collect();
    let name = name.trim_end().to_string();
    if name.is_empty() {
        Err(JoinRejection::EmptyName)
    } else {
        Ok(name)
    }
}

pub const SESSION_TAKEN_OVER: &str = "Session resumed on another connection";

pub struct Authority {
    room: GameRoom,
    sessions: SessionStore,
    // Tokens of joined players, both ways. A token names one live player.
    tokens: HashMap<PlayerId, SessionToken>,
    live: HashMap<SessionToken, PlayerId>,
}

impl Authority {
    pub fn new(room: GameRoom) -> Self {
        let retention = Duration::from_secs(room.config().session_retention_secs);
        Self {
            room,
            sessions: SessionStore::new(retention),
            tokens: HashMap::new(),
            live: HashMap::new(),
        }
    }

    fn forget_token(&mut self, client_id: PlayerId) -> Option<SessionToken> {
        let token = self.tokens.remove(&client_id)?;
        self.live.remove(&token);
        Some(token)
    }

    /// Joined players that still hold a session token.
    pub fn live_sessions(&self) -> usize {
        self.live.len()
    }

    pub fn room(&self) -> &GameRoom {
        &self.room
    }

    /// A new connection was accepted; tell it its identity.
    pub fn on_connect(&mut self, client_id: PlayerId) -> Vec<GameMessage> {
        vec![GameMessage::to(client_id, Packet::Welcome { player_id: client_id })]
    }

    /// A connection went away. Its player is parked for session resume.
    pub fn on_disconnect(&mut self, client_id: PlayerId, now: Instant) -> Vec<GameMessage> {
        let token = self.forget_token(client_id);
        match self.room.remove_player(client_id) {
            Some(player) => {
                if let Some(token) = token {
                    self.sessions.park(token, player, now);
                }
                vec![GameMessage::everyone(Packet::PlayerLeft {
                    player_id: client_id,
                })]
            }
            None => Vec::new(),
        }
    }

    pub fn handle_packet(
        &mut self,
        client_id: PlayerId,
        packet: Packet,
        now: Instant,
    ) -> Vec<GameMessage> {
        match packet {
            Packet::Join {
                name,
                resume_position,
                resume_token,
            } => self.handle_join(client_id, &name, resume_position, resume_token, now),

            Packet::Move { position } => self.handle_move(client_id, position),

            Packet::PaintRequest {
                position,
                color_number,
            } => self.handle_paint(client_id, position, color_number),

            Packet::PurchaseUpgrade { upgrade } => self.handle_purchase(client_id, upgrade),

            Packet::Heartbeat => Vec::new(),

            Packet::Leave => {
                self.forget_token(client_id);
                match self.room.remove_player(client_id) {
                    Some(_) => vec![GameMessage::everyone(Packet::PlayerLeft {
                        player_id: client_id,
                    })],
                    None => Vec::new(),
                }
            }

            other => {
                warn!(
                    "Unexpected packet type from client {}: {:?}",
                    client_id, other
                );
                Vec::new()
            }
        }
    }

    fn handle_join(
        &mut self,
        client_id: PlayerId,
        raw_name: &str,
        resume_position: Option<Position>,
        resume_token: Option<SessionToken>,
        now: Instant,
    ) -> Vec<GameMessage> {
        let name = match sanitize_name(raw_name, self.room.config().max_name_length) {
            Ok(name) => name,
            Err(rejection) => {
                return vec![GameMessage::to(
                    client_id,
                    Packet::JoinRejected {
                        reason: rejection.to_string(),
                    },
                )];
            }
        };

        if self.room.player(client_id).is_some() {
            debug!("Client {} joined twice; resending snapshot", client_id);
            return vec![GameMessage::to(
                client_id,
                Packet::Snapshot(self.room.snapshot()),
            )];
        }

        let start = resume_position
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .unwrap_or_else(|| self.room.config().spawn_position(self.room.grid_size()));

        let mut messages = Vec::new();
        let previous = match resume_token {
            Some(token) => match self.take_over(token, client_id) {
                Some((old_id, player)) => {
                    messages.push(GameMessage::Disconnect {
                        client_id: old_id,
                        reason: SESSION_TAKEN_OVER.to_string(),
                    });
                    messages.push(GameMessage::others(
                        client_id,
                        Packet::PlayerLeft { player_id: old_id },
                    ));
                    Some(player)
                }
                None => self.sessions.claim(token, now),
            },
            None => None,
        };
        let player = match previous {
            Some(previous) => self.room.restore_player(client_id, name, start, previous),
            None => self.room.add_player(client_id, name, start),
        };

        let token = loop {
            let token = self.sessions.mint_token();
            if !self.live.contains_key(&token) {
                break token;
            }
        };
        self.tokens.insert(client_id, token);
        self.live.insert(token, client_id);

        messages.extend([
            GameMessage::to(client_id, Packet::Snapshot(self.room.snapshot())),
            GameMessage::to(
                client_id,
                Packet::Joined {
                    session_token: token,
                },
            ),
            GameMessage::others(client_id, Packet::PlayerJoined { player }),
        ]);
        messages
    }

    /// Moves a still-connected player to `client_id` when its token is
    /// presented again. Happens when the client reconnects before the server
    /// has noticed the old socket is dead.
    fn take_over(&mut self, token: SessionToken, client_id: PlayerId) -> Option<(PlayerId, Player)> {
        let old_id = *self.live.get(&token)?;
        if old_id == client_id {
            return None;
        }
        self.forget_token(old_id);
        let player = self.room.remove_player(old_id)?;
        info!(
            "Player '{}' resumed on connection {}, closing {}",
            player.name, client_id, old_id
        );
        Some((old_id, player))
    }

    fn handle_move(&mut self, client_id: PlayerId, position: Position) -> Vec<GameMessage> {
        if self.room.player(client_id).is_none() {
            return Vec::new();
        }

        let mut messages = vec![GameMessage::others(
            client_id,
            Packet::PlayerMoved {
                player_id: client_id,
                position,
            },
        )];

        if let Some(paint_supply) = self.room.update_position(client_id, position) {
            messages.push(GameMessage::everyone(Packet::PaintSupply {
                player_id: client_id,
                paint_supply,
            }));
        }
        messages
    }

    fn handle_paint(
        &mut self,
        client_id: PlayerId,
        position: Position,
        color_number: u8,
    ) -> Vec<GameMessage> {
        let username = self
            .room
            .player(client_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        match self.room.try_paint_cell(client_id, position, color_number) {
            Ok(painted) => self.paint_succeeded(client_id, username, painted),
            Err(failure) => {
                debug!("Paint from client {} rejected: {}", client_id, failure);
                let result =
                    self.failed_result(client_id, username, position, color_number, failure);
                let packet = Packet::PaintResult(result);

                let broadcast = failure.cell().is_some()
                    && self.room.config().failure_broadcast == FailureBroadcast::Everyone;
                if broadcast {
                    vec![GameMessage::everyone(packet)]
                } else {
                    vec![GameMessage::to(client_id, packet)]
                }
            }
        }
    }

    fn paint_succeeded(
        &mut self,
        client_id: PlayerId,
        username: String,
        painted: PaintedCell,
    ) -> Vec<GameMessage> {
        let mut messages = vec![
            GameMessage::everyone(Packet::PaintResult(PaintResult {
                player_id: client_id,
                username,
                cell_x: painted.x as i32,
                cell_y: painted.y as i32,
                color: painted.color,
                color_number: painted.color_number,
                success: true,
                failure: None,
            })),
            GameMessage::everyone(Packet::PaintSupply {
                player_id: client_id,
                paint_supply: painted.paint_supply,
            }),
        ];

        if painted.completed {
            let outcome = self.room.complete_round();
            info!(
                "Grid complete; {} players rewarded, next grid {}x{}",
                outcome.gold.len(),
                outcome.new_size,
                outcome.new_size
            );
            for (player_id, gold) in outcome.gold {
                messages.push(GameMessage::everyone(Packet::Gold { player_id, gold }));
            }
            messages.push(GameMessage::everyone(Packet::Snapshot(self.room.snapshot())));
        }
        messages
    }

    fn failed_result(
        &self,
        client_id: PlayerId,
        username: String,
        position: Position,
        color_number: u8,
        failure: PaintFailure,
    ) -> PaintResult {
        // -1 only when the position is outside the grid
        let cell = failure.cell().or_else(|| self.room.grid().locate(position));
        let (cell_x, cell_y) = match cell {
            Some((x, y)) => (x as i32, y as i32),
            None => (-1, -1),
        };
        let color = self
            .room
            .grid()
            .color_for(color_number)
            .unwrap_or_default()
            .to_string();

        PaintResult {
            player_id: client_id,
            username,
            cell_x,
            cell_y,
            color,
            color_number,
            success: false,
            failure: Some(failure),
        }
    }

    fn handle_purchase(&mut self, client_id: PlayerId, upgrade: UpgradeKind) -> Vec<GameMessage> {
        match self.room.purchase_upgrade(client_id, upgrade) {
            Ok(receipt) => vec![
                GameMessage::to(
                    client_id,
                    Packet::UpgradeResult(UpgradeResult {
                        success: true,
                        upgrade,
                        new_level: receipt.new_level,
                        new_gold: receipt.new_gold,
                        message: format!(
                            "Bought {} level {} for {} gold",
                            upgrade.label(),
                            receipt.new_level,
                            receipt.cost
                        ),
                    }),
                ),
                GameMessage::everyone(Packet::Gold {
                    player_id: client_id,
                    gold: receipt.new_gold,
                }),
                GameMessage::everyone(Packet::PlayerUpgraded {
                    player_id: client_id,
                    upgrade,
                    level: receipt.new_level,
                }),
            ],
            Err(failure) => {
                let player = self.room.player(client_id);
                vec![GameMessage::to(
                    client_id,
                    Packet::UpgradeResult(UpgradeResult {
                        success: false,
                        upgrade,
                        new_level: player.map(|p| p.upgrades.get(upgrade)).unwrap_or(0),
                        new_gold: player.map(|p| p.gold).unwrap_or(0),
                        message: failure.to_string(),
                    }),
                )]
            }
        }
    }

    /// Periodic passive recharge for players standing in the zone.
    pub fn recharge_tick(&mut self) -> Vec<GameMessage> {
        self.room
            .recharge_tick()
            .into_iter()
            .map(|(player_id, paint_supply)| {
                GameMessage::everyone(Packet::PaintSupply {
                    player_id,
                    paint_supply,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{cell_center, GameConfig, Grid, Snapshot};

    fn test_config() -> GameConfig {
        GameConfig {
            initial_grid_size: 2,
            paint_cost: 5.0,
            gold_reward_base: 10,
            ..GameConfig::default()
        }
    }

    fn authority_with(config: GameConfig) -> Authority {
        let grid = Grid::from_numbers(&[vec![3, 1], vec![2, 4]], 40, &config.palette).unwrap();
        Authority::new(GameRoom::with_grid(config, grid, 11))
    }

    fn join(authority: &mut Authority, id: PlayerId, name: &str) -> Vec<GameMessage> {
        authority.handle_packet(
            id,
            Packet::Join {
                name: name.to_string(),
                resume_position: None,
                resume_token: None,
            },
            Instant::now(),
        )
    }

    fn paint(authority: &mut Authority, id: PlayerId, x: u32, y: u32, number: u8) -> Vec<GameMessage> {
        authority.handle_packet(
            id,
            Packet::PaintRequest {
                position: cell_center(x, y, authority.room().grid_size(), 40),
                color_number: number,
            },
            Instant::now(),
        )
    }

    fn session_token(messages: &[GameMessage]) -> SessionToken {
        messages
            .iter()
            .find_map(|m| match m {
                GameMessage::SendPacket {
                    packet: Packet::Joined { session_token },
                    ..
                } => Some(*session_token),
                _ => None,
            })
            .unwrap()
    }

    fn last_snapshot(messages: &[GameMessage]) -> Snapshot {
        messages
            .iter()
            .rev()
            .find_map(|m| match m {
                GameMessage::SendPacket {
                    packet: Packet::Snapshot(s),
                    ..
                }
                | GameMessage::BroadcastPacket {
                    packet: Packet::Snapshot(s),
                    ..
                } => Some(s.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  ana  ", 20), Ok("ana".to_string()));
        assert_eq!(sanitize_name("   ", 20), Err(JoinRejection::EmptyName));
        assert_eq!(
            sanitize_name("abcdefghijklmnopqrstuvwxyz", 20),
            Ok("abcdefghijklmnopqrst".to_string())
        );
        assert_eq!(sanitize_name("ñandú ñandú", 5), Ok("ñandú".to_string()));
    }

    #[test]
    fn test_connect_sends_welcome() {
        let mut authority = authority_with(test_config());
        assert_eq!(
            authority.on_connect(4),
            vec![GameMessage::to(4, Packet::Welcome { player_id: 4 })]
        );
    }

    #[test]
    fn test_join_snapshot_to_requester_notice_to_others() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");
        let messages = join(&mut authority, 2, "  bo ");

        assert_eq!(messages.len(), 3);
        match &messages[0] {
            GameMessage::SendPacket {
                packet: Packet::Snapshot(snapshot),
                client_id,
            } => {
                assert_eq!(*client_id, 2);
                assert_eq!(snapshot.players.len(), 2);
                assert_eq!(snapshot.grid_size, 2);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        match &messages[2] {
            GameMessage::BroadcastPacket {
                packet: Packet::PlayerJoined { player },
                exclude,
            } => {
                assert_eq!(*exclude, Some(2));
                assert_eq!(player.name, "bo");
            }
            other => panic!("expected join notice, got {:?}", other),
        }
    }

    #[test]
    fn test_join_with_empty_name_rejected() {
        let mut authority = authority_with(test_config());
        let messages = join(&mut authority, 1, "   ");

        assert_eq!(
            messages,
            vec![GameMessage::to(
                1,
                Packet::JoinRejected {
                    reason: "name must not be empty".to_string()
                }
            )]
        );
        assert_eq!(authority.room().player_count(), 0);
    }

    #[test]
    fn test_move_relayed_to_others() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");

        let position = Position::new(3.0, -7.0);
        let messages = authority.handle_packet(1, Packet::Move { position }, Instant::now());
        assert_eq!(
            messages,
            vec![GameMessage::others(
                1,
                Packet::PlayerMoved {
                    player_id: 1,
                    position
                }
            )]
        );

        let unknown = authority.handle_packet(9, Packet::Move { position }, Instant::now());
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_successful_paint_broadcasts_result_and_supply() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");

        let messages = paint(&mut authority, 1, 0, 0, 3);
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            GameMessage::BroadcastPacket {
                packet: Packet::PaintResult(result),
                exclude: None,
            } => {
                assert!(result.success);
                assert_eq!((result.cell_x, result.cell_y), (0, 0));
                assert_eq!(result.username, "ana");
            }
            other => panic!("expected paint result broadcast, got {:?}", other),
        }
        assert_eq!(
            messages[1],
            GameMessage::everyone(Packet::PaintSupply {
                player_id: 1,
                paint_supply: 95.0
            })
        );
        assert_eq!(authority.room().painted_cells(), 1);
    }

    #[test]
    fn test_failure_routing() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");

        // wrong color resolves to a cell: everyone hears about it
        let messages = paint(&mut authority, 1, 0, 0, 4);
        assert!(matches!(
            &messages[..],
            [GameMessage::BroadcastPacket { packet: Packet::PaintResult(r), exclude: None }]
                if !r.success && r.cell() == Some((0, 0))
        ));

        // outside the grid: requester only, with -1 coordinates
        let messages = authority.handle_packet(
            1,
            Packet::PaintRequest {
                position: Position::new(900.0, 900.0),
                color_number: 1,
            },
            Instant::now(),
        );
        assert!(matches!(
            &messages[..],
            [GameMessage::SendPacket { packet: Packet::PaintResult(r), client_id: 1 }]
                if r.cell_x == -1 && r.cell_y == -1 && r.failure == Some(PaintFailure::OutsideGrid)
        ));

        // unknown player: requester only, cell still resolved
        let messages = paint(&mut authority, 7, 0, 1, 1);
        assert!(matches!(
            &messages[..],
            [GameMessage::SendPacket { packet: Packet::PaintResult(r), client_id: 7 }]
                if r.failure == Some(PaintFailure::UnknownPlayer) && r.cell() == Some((0, 1))
        ));
    }

    #[test]
    fn test_failure_routing_requester_policy() {
        let config = GameConfig {
            failure_broadcast: FailureBroadcast::Requester,
            ..test_config()
        };
        let mut authority = authority_with(config);
        join(&mut authority, 1, "ana");
        paint(&mut authority, 1, 0, 0, 3);

        let messages = paint(&mut authority, 1, 0, 0, 3);
        assert!(matches!(
            &messages[..],
            [GameMessage::SendPacket { packet: Packet::PaintResult(r), client_id: 1 }]
                if r.failure == Some(PaintFailure::AlreadyPainted { x: 0, y: 0 })
        ));
    }

    #[test]
    fn test_grid_growth_sequence() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");
        join(&mut authority, 2, "bo");

        paint(&mut authority, 1, 0, 0, 3);
        paint(&mut authority, 2, 0, 1, 1);
        paint(&mut authority, 1, 1, 0, 2);
        let messages = paint(&mut authority, 2, 1, 1, 4);

        let gold: Vec<(PlayerId, u64)> = messages
            .iter()
            .filter_map(|m| match m {
                GameMessage::BroadcastPacket {
                    packet: Packet::Gold { player_id, gold },
                    ..
                } => Some((*player_id, *gold)),
                _ => None,
            })
            .collect();
        assert_eq!(gold, vec![(1, 40), (2, 40)]);

        let snapshot = last_snapshot(&messages);
        assert_eq!(snapshot.grid_size, 3);
        assert_eq!(snapshot.progress.painted, 0);
        assert!(snapshot.grid.iter().flatten().all(|c| !c.is_painted()));
        assert!(matches!(
            messages.last(),
            Some(GameMessage::BroadcastPacket {
                packet: Packet::Snapshot(_),
                exclude: None
            })
        ));
    }

    #[test]
    fn test_purchase_routes() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");

        let messages = authority.handle_packet(
            1,
            Packet::PurchaseUpgrade {
                upgrade: UpgradeKind::RechargeRate,
            },
            Instant::now(),
        );
        match &messages[..] {
            [GameMessage::SendPacket {
                packet: Packet::UpgradeResult(result),
                client_id: 1,
            }] => {
                assert!(!result.success);
                assert_eq!(result.new_level, 0);
                assert_eq!(result.message, "not enough gold (need 15, have 0)");
            }
            other => panic!("unexpected messages {:?}", other),
        }
    }

    #[test]
    fn test_reconnect_restores_economy() {
        let mut authority = authority_with(test_config());
        let first = join(&mut authority, 1, "ana");
        let token = session_token(&first);

        // finish a round so the player earns gold, then buy two levels
        paint(&mut authority, 1, 0, 0, 3);
        paint(&mut authority, 1, 0, 1, 1);
        paint(&mut authority, 1, 1, 0, 2);
        paint(&mut authority, 1, 1, 1, 4);
        for _ in 0..2 {
            authority.handle_packet(
                1,
                Packet::PurchaseUpgrade {
                    upgrade: UpgradeKind::MoveSpeed,
                },
                Instant::now(),
            );
        }
        let before = authority.room().player(1).unwrap().clone();
        assert_eq!(before.upgrades.move_speed, 2);
        assert_eq!(before.gold, 40 - 10 - 13);

        let now = Instant::now();
        let left = authority.on_disconnect(1, now);
        assert_eq!(left, vec![GameMessage::everyone(Packet::PlayerLeft { player_id: 1 })]);

        let messages = authority.handle_packet(
            5,
            Packet::Join {
                name: "ana".to_string(),
                resume_position: Some(Position::new(12.0, 34.0)),
                resume_token: Some(token),
            },
            now,
        );
        let snapshot = last_snapshot(&messages);
        let rejoined = snapshot.players.iter().find(|p| p.id == 5).unwrap();
        assert_eq!(rejoined.gold, before.gold);
        assert_eq!(rejoined.upgrades, before.upgrades);
        assert_eq!(rejoined.position, Position::new(12.0, 34.0));
        assert!(authority.room().player(1).is_none());
        assert_ne!(session_token(&messages), token);
    }

    #[test]
    fn test_rejoin_before_disconnect_moves_player() {
        let mut authority = authority_with(test_config());
        let token = session_token(&join(&mut authority, 1, "ana"));
        join(&mut authority, 2, "bo");
        for (x, y, number) in [(0, 0, 3), (0, 1, 1), (1, 0, 2), (1, 1, 4)] {
            paint(&mut authority, 1, x, y, number);
        }
        assert_eq!(authority.room().player(1).unwrap().gold, 40);

        // the old connection is still registered when the new one joins
        let messages = authority.handle_packet(
            5,
            Packet::Join {
                name: "ana".to_string(),
                resume_position: None,
                resume_token: Some(token),
            },
            Instant::now(),
        );

        assert_eq!(
            messages[..2],
            [
                GameMessage::Disconnect {
                    client_id: 1,
                    reason: SESSION_TAKEN_OVER.to_string(),
                },
                GameMessage::others(5, Packet::PlayerLeft { player_id: 1 }),
            ]
        );
        let snapshot = last_snapshot(&messages);
        assert_eq!(snapshot.players.len(), 2);
        assert!(snapshot.players.iter().all(|p| p.id != 1));
        assert_eq!(snapshot.players.iter().find(|p| p.id == 5).unwrap().gold, 40);
        assert_eq!(authority.room().player_count(), 2);
        assert_eq!(authority.live_sessions(), 2);

        // the late close of the old socket changes nothing
        assert!(authority.on_disconnect(1, Instant::now()).is_empty());
        assert!(authority.sessions.is_empty());
        assert_eq!(authority.room().player(5).unwrap().gold, 40);
    }

    #[test]
    fn test_taken_over_token_is_spent() {
        let mut authority = authority_with(test_config());
        let token = session_token(&join(&mut authority, 1, "ana"));
        let resume = |name: &str| Packet::Join {
            name: name.to_string(),
            resume_position: None,
            resume_token: Some(token),
        };

        let moved = authority.handle_packet(2, resume("ana"), Instant::now());
        let fresh_token = session_token(&moved);
        assert_ne!(fresh_token, token);

        let again = authority.handle_packet(3, resume("ana"), Instant::now());
        assert!(!again
            .iter()
            .any(|m| matches!(m, GameMessage::Disconnect { .. })));
        assert!(authority.room().player(2).is_some());
        assert!(authority.room().player(3).is_some());
    }

    #[test]
    fn test_heartbeat_is_silent() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");
        assert!(authority
            .handle_packet(1, Packet::Heartbeat, Instant::now())
            .is_empty());
    }

    #[test]
    fn test_stale_token_gives_fresh_player() {
        let mut authority = authority_with(test_config());
        let messages = authority.handle_packet(
            3,
            Packet::Join {
                name: "ana".to_string(),
                resume_position: None,
                resume_token: Some(12345),
            },
            Instant::now(),
        );
        let snapshot = last_snapshot(&messages);
        assert_eq!(snapshot.players[0].gold, 0);
    }

    #[test]
    fn test_leave_removes_without_parking() {
        let mut authority = authority_with(test_config());
        join(&mut authority, 1, "ana");

        let messages = authority.handle_packet(1, Packet::Leave, Instant::now());
        assert_eq!(messages, vec![GameMessage::everyone(Packet::PlayerLeft { player_id: 1 })]);
        assert!(authority.on_disconnect(1, Instant::now()).is_empty());
        assert!(authority.sessions.is_empty());
    }

    #[test]
    fn test_server_packets_from_client_ignored() {
        let mut authority = authority_with(test_config());
        let messages = authority.handle_packet(1, Packet::Welcome { player_id: 3 }, Instant::now());
        assert!(messages.is_empty());
    }
}
