//! Connection registry and outbound routing
//!
//! Every accepted socket gets a connection id, which is also the id of the
//! player created on it. Ids only ever grow, so a reconnecting client always
//! shows up under a new one. Outbound packets go through a per-connection
//! queue that the connection's writer task drains in order.
//!
//! A connection that sends nothing for longer than the timeout is swept by
//! [`ClientManager::check_timeouts`]; clients send heartbeats while idle.

use log::{info, warn};
use shared::{Packet, PlayerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Outbound queue drained by a connection's writer task
pub type PacketSender = mpsc::UnboundedSender<Packet>;

#[derive(Debug)]
struct Connection {
    addr: SocketAddr,
    opened_at: Instant,
    last_seen: Instant,
    // Dropping this closes the writer, and with it the socket
    outbound: PacketSender,
}

impl Connection {
    fn queue(&self, packet: Packet) -> bool {
        self.outbound.send(packet).is_ok()
    }

    fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Live connections keyed by id, with a reverse index for inbound frames
pub struct ClientManager {
    connections: HashMap<PlayerId, Connection>,
    by_addr: HashMap<SocketAddr, PlayerId>,
    next_id: PlayerId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: HashMap::new(),
            by_addr: HashMap::new(),
            next_id: 1,
            max_clients,
        }
    }

    /// Registers a connection and hands out its id, or `None` when the
    /// server is at capacity. A refused sender is dropped by the caller.
    pub fn add_client(&mut self, addr: SocketAddr, outbound: PacketSender) -> Option<PlayerId> {
        self.add_client_at(addr, outbound, Instant::now())
    }

    pub fn add_client_at(
        &mut self,
        addr: SocketAddr,
        outbound: PacketSender,
        now: Instant,
    ) -> Option<PlayerId> {
        if self.connections.len() >= self.max_clients {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.by_addr.insert(addr, id);
        self.connections.insert(
            id,
            Connection {
                addr,
                opened_at: now,
                last_seen: now,
                outbound,
            },
        );

        info!("Connection {} opened from {} ({}/{})", id, addr, self.len(), self.max_clients);
        Some(id)
    }

    /// Forgets a connection. Its outbound queue is dropped here.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        let Some(connection) = self.connections.remove(client_id) else {
            return false;
        };
        self.by_addr.remove(&connection.addr);
        info!(
            "Connection {} from {} closed after {:.1?}",
            client_id,
            connection.addr,
            connection.opened_at.elapsed()
        );
        true
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.by_addr.get(&addr).copied()
    }

    /// Records inbound traffic from a connection.
    pub fn touch(&mut self, client_id: PlayerId, now: Instant) {
        if let Some(connection) = self.connections.get_mut(&client_id) {
            connection.last_seen = now;
        }
    }

    /// Removes connections silent for longer than `timeout` and returns their
    /// ids so the room can drop their players.
    pub fn check_timeouts(&mut self, now: Instant, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_timed_out(now, timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            warn!("Connection {} timed out", client_id);
            self.remove_client(client_id);
        }
        timed_out
    }

    /// Queues a packet for one connection.
    pub fn send_to(&self, client_id: PlayerId, packet: Packet) -> bool {
        let Some(connection) = self.connections.get(&client_id) else {
            return false;
        };
        let queued = connection.queue(packet);
        if !queued {
            warn!("Outbound queue for connection {} is closed", client_id);
        }
        queued
    }

    /// Queues a packet for every registered connection except `exclude` and
    /// returns how many accepted it. Connections that are gone miss it; there
    /// is no outbox.
    pub fn broadcast(&self, packet: &Packet, exclude: Option<PlayerId>) -> usize {
        self.connections
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .filter(|(id, connection)| {
                let queued = connection.queue(packet.clone());
                if !queued {
                    warn!("Dropped broadcast for connection {}", id);
                }
                queued
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
