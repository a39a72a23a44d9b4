//! Session resume tokens for reconnect migration
//!
//! When a connection drops, its player record is parked under the session
//! token handed out at join time. A rejoin that presents the token within the
//! retention window gets the parked economy transferred to its new connection
//! identity. Tokens are single-use.

use log::debug;
use shared::{Player, SessionToken};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ParkedSession {
    player: Player,
    parked_at: Instant,
}

pub struct SessionStore {
    parked: HashMap<SessionToken, ParkedSession>,
    retention: Duration,
}

impl SessionStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            parked: HashMap::new(),
            retention,
        }
    }

    /// Mints a token not currently parked.
    pub fn mint_token(&self) -> SessionToken {
        loop {
            let token = rand::random::<SessionToken>();
            if token != 0 && !self.parked.contains_key(&token) {
                return token;
            }
        }
    }

    pub fn park(&mut self, token: SessionToken, player: Player, now: Instant) {
        self.prune(now);
        debug!("Parked session for player {} '{}'", player.id, player.name);
        self.parked.insert(
            token,
            ParkedSession {
                player,
                parked_at: now,
            },
        );
    }

    /// Takes the parked player for `token` if it has not expired.
    pub fn claim(&mut self, token: SessionToken, now: Instant) -> Option<Player> {
        self.prune(now);
        self.parked.remove(&token).map(|session| session.player)
    }

    fn prune(&mut self, now: Instant) {
        let retention = self.retention;
        self.parked
            .retain(|_, session| now.saturating_duration_since(session.parked_at) <= retention);
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}
