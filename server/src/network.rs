//! Server network layer handling TCP connections and the room event loop

use crate::authority::{Authority, GameMessage};
use crate::client_manager::{ClientManager, PacketSender};
use crate::game::GameRoom;
use log::{debug, error, info, warn};
use shared::codec::{read_packet, write_packet};
use shared::{GameConfig, JoinRejection, Packet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Messages sent from network tasks to the room loop
#[derive(Debug)]
pub enum ServerMessage {
    ClientConnected {
        addr: SocketAddr,
        sender: PacketSender,
    },
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ConnectionClosed {
        addr: SocketAddr,
    },
    Shutdown,
}

/// Authoritative paint server. One task owns the room; connection tasks only
/// move frames between sockets and channels.
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: ClientManager,
    authority: Authority,
    recharge_interval: Duration,
    client_timeout: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: GameConfig,
        max_clients: usize,
    ) -> Result<Self, ServerError> {
        Self::with_room(addr, GameRoom::new(config), max_clients).await
    }

    pub async fn with_room(
        addr: &str,
        room: GameRoom,
        max_clients: usize,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let recharge_interval = Duration::from_millis(room.config().recharge_interval_ms.max(1));
        let client_timeout = Duration::from_millis(room.config().client_timeout_ms.max(1));
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(max_clients),
            authority: Authority::new(room),
            recharge_interval,
            client_timeout,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender that can stop the room loop with [`ServerMessage::Shutdown`].
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that accepts connections and starts their I/O tasks
    fn spawn_acceptor(&self, listener: TcpListener) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        if !Self::start_connection(stream, addr, &server_tx) {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Registers the connection with the room loop, then spawns its reader
    /// and writer. Returns false once the room loop is gone.
    fn start_connection(
        stream: TcpStream,
        addr: SocketAddr,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
    ) -> bool {
        let (reader, writer) = stream.into_split();
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();

        if server_tx
            .send(ServerMessage::ClientConnected {
                addr,
                sender: packet_tx,
            })
            .is_err()
        {
            return false;
        }

        tokio::spawn(Self::write_loop(writer, packet_rx, addr));
        tokio::spawn(Self::read_loop(reader, addr, server_tx.clone()));
        true
    }

    /// Drains a connection's outbound queue in order. Closing the queue
    /// closes the socket.
    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut packet_rx: mpsc::UnboundedReceiver<Packet>,
        addr: SocketAddr,
    ) {
        while let Some(packet) = packet_rx.recv().await {
            if let Err(e) = write_packet(&mut writer, &packet).await {
                debug!("Failed to send packet to {}: {}", addr, e);
                break;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!("Error closing connection to {}: {}", addr, e);
        }
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        addr: SocketAddr,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if server_tx
                        .send(ServerMessage::PacketReceived { packet, addr })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Dropping connection {}: {}", addr, e);
                    break;
                }
            }
        }
        // The room loop may already be gone during shutdown.
        let _ = server_tx.send(ServerMessage::ConnectionClosed { addr });
    }

    fn dispatch(&mut self, messages: Vec<GameMessage>) {
        for message in messages {
            match message {
                GameMessage::SendPacket { packet, client_id } => {
                    self.clients.send_to(client_id, packet);
                }
                GameMessage::BroadcastPacket { packet, exclude } => {
                    self.clients.broadcast(&packet, exclude);
                }
                GameMessage::Disconnect { client_id, reason } => {
                    info!("Closing connection {}: {}", client_id, reason);
                    // The writer drains this frame before the socket closes.
                    self.clients
                        .send_to(client_id, Packet::Disconnected { reason });
                    self.clients.remove_client(&client_id);
                }
            }
        }
    }

    fn handle_connected(&mut self, addr: SocketAddr, sender: PacketSender) {
        match self.clients.add_client(addr, sender.clone()) {
            Some(client_id) => {
                let messages = self.authority.on_connect(client_id);
                self.dispatch(messages);
            }
            None => {
                warn!("Rejecting connection from {}: server full", addr);
                // Dropping the last sender closes the socket after this frame.
                let _ = sender.send(Packet::Disconnected {
                    reason: JoinRejection::ServerFull.to_string(),
                });
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match self.clients.find_client_by_addr(addr) {
            Some(client_id) => {
                let now = Instant::now();
                self.clients.touch(client_id, now);
                let messages = self.authority.handle_packet(client_id, packet, now);
                self.dispatch(messages);
            }
            None => debug!("Ignoring packet from unregistered connection {}", addr),
        }
    }

    fn handle_closed(&mut self, addr: SocketAddr) {
        if let Some(client_id) = self.clients.find_client_by_addr(addr) {
            self.clients.remove_client(&client_id);
            let messages = self.authority.on_disconnect(client_id, Instant::now());
            self.dispatch(messages);
        }
    }

    /// Drops connections that went silent. A half-open socket never reports
    /// EOF, so this is the only way its player leaves.
    fn handle_timeouts(&mut self) {
        let now = Instant::now();
        for client_id in self.clients.check_timeouts(now, self.client_timeout) {
            let messages = self.authority.on_disconnect(client_id, now);
            self.dispatch(messages);
        }
    }

    /// Main server loop: connection events and the passive recharge tick
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let listener = self
            .listener
            .take()
            .ok_or("server is already running")?;
        self.spawn_acceptor(listener);

        let mut recharge_timer = interval(self.recharge_interval);
        recharge_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately
        recharge_timer.tick().await;
        let mut ticks: u64 = 0;

        let sweep_every =
            (self.client_timeout / 2).clamp(Duration::from_millis(10), Duration::from_secs(1));
        let mut timeout_timer = interval(sweep_every);
        timeout_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::ClientConnected { addr, sender }) => {
                            self.handle_connected(addr, sender);
                        }
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        }
                        Some(ServerMessage::ConnectionClosed { addr }) => {
                            self.handle_closed(addr);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }

                _ = timeout_timer.tick() => {
                    self.handle_timeouts();
                }

                _ = recharge_timer.tick() => {
                    let messages = self.authority.recharge_tick();
                    self.dispatch(messages);

                    ticks += 1;
                    if ticks % 120 == 0 && !self.clients.is_empty() {
                        let progress = self.authority.room().progress();
                        debug!(
                            "{} clients, grid {}x{}, {}/{} painted",
                            self.clients.len(),
                            self.authority.room().grid_size(),
                            self.authority.room().grid_size(),
                            progress.painted,
                            progress.total
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Position;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    async fn start_server(max_clients: usize) -> SocketAddr {
        start_server_with(GameConfig::default(), max_clients).await
    }

    async fn start_server_with(config: GameConfig, max_clients: usize) -> SocketAddr {
        let mut server = Server::new("127.0.0.1:0", config, max_clients)
            .await
            .unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move { server.run().await });
        addr
    }

    async fn join(stream: &mut TcpStream, name: &str) {
        write_packet(
            stream,
            &Packet::Join {
                name: name.to_string(),
                resume_position: None,
                resume_token: None,
            },
        )
        .await
        .unwrap();
        assert!(matches!(recv(stream).await, Packet::Snapshot(_)));
        assert!(matches!(recv(stream).await, Packet::Joined { .. }));
    }

    async fn recv(stream: &mut TcpStream) -> Packet {
        timeout(Duration::from_secs(2), read_packet(stream))
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_server_message_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Leave,
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert_eq!(packet, Packet::Leave);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_welcome_then_join() {
        let addr = start_server(4).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let player_id = match recv(&mut stream).await {
            Packet::Welcome { player_id } => player_id,
            other => panic!("expected welcome, got {:?}", other),
        };

        write_packet(
            &mut stream,
            &Packet::Join {
                name: "ana".to_string(),
                resume_position: None,
                resume_token: None,
            },
        )
        .await
        .unwrap();

        match recv(&mut stream).await {
            Packet::Snapshot(snapshot) => {
                assert_eq!(snapshot.players.len(), 1);
                assert_eq!(snapshot.players[0].id, player_id);
                assert_eq!(snapshot.grid_size, GameConfig::default().initial_grid_size);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert!(matches!(recv(&mut stream).await, Packet::Joined { .. }));
    }

    #[tokio::test]
    async fn test_server_full_disconnects() {
        let addr = start_server(1).await;
        let mut first = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(recv(&mut first).await, Packet::Welcome { .. }));

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert_eq!(
            recv(&mut second).await,
            Packet::Disconnected {
                reason: "Server full".to_string()
            }
        );
        let closed = timeout(Duration::from_secs(2), read_packet(&mut second))
            .await
            .unwrap()
            .unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_player_left() {
        let addr = start_server(4).await;
        let mut streams = Vec::new();
        let mut ids = Vec::new();

        for name in ["ana", "bo"] {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            match recv(&mut stream).await {
                Packet::Welcome { player_id } => ids.push(player_id),
                other => panic!("expected welcome, got {:?}", other),
            }
            write_packet(
                &mut stream,
                &Packet::Join {
                    name: name.to_string(),
                    resume_position: Some(Position::new(0.0, 0.0)),
                    resume_token: None,
                },
            )
            .await
            .unwrap();
            assert!(matches!(recv(&mut stream).await, Packet::Snapshot(_)));
            assert!(matches!(recv(&mut stream).await, Packet::Joined { .. }));
            streams.push(stream);
        }

        let mut bo = streams.pop().unwrap();
        let mut ana = streams.pop().unwrap();
        assert!(matches!(recv(&mut ana).await, Packet::PlayerJoined { player } if player.id == ids[1]));

        bo.shutdown().await.unwrap();
        drop(bo);
        assert_eq!(recv(&mut ana).await, Packet::PlayerLeft { player_id: ids[1] });
    }

    #[tokio::test]
    async fn test_silent_connection_is_dropped() {
        let config = GameConfig {
            client_timeout_ms: 200,
            ..GameConfig::default()
        };
        let addr = start_server_with(config, 4).await;

        let mut watcher = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(recv(&mut watcher).await, Packet::Welcome { .. }));
        join(&mut watcher, "ana").await;

        // never closes, never speaks after joining
        let mut silent = TcpStream::connect(addr).await.unwrap();
        let silent_id = match recv(&mut silent).await {
            Packet::Welcome { player_id } => player_id,
            other => panic!("expected welcome, got {:?}", other),
        };
        join(&mut silent, "bo").await;

        // the watcher keeps itself alive while waiting for the silent player to go
        let (mut watch_rx, mut watch_tx) = watcher.into_split();
        let heartbeats = tokio::spawn(async move {
            loop {
                if write_packet(&mut watch_tx, &Packet::Heartbeat).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });
        let left = timeout(Duration::from_secs(3), async {
            loop {
                let packet = read_packet(&mut watch_rx).await.unwrap().unwrap();
                if packet == (Packet::PlayerLeft { player_id: silent_id }) {
                    break;
                }
            }
        })
        .await;
        heartbeats.abort();
        assert!(left.is_ok());

        let closed = timeout(Duration::from_secs(2), async {
            while read_packet(&mut silent).await.unwrap().is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let mut server = Server::new("127.0.0.1:0", GameConfig::default(), 2)
            .await
            .unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(async move { server.run().await.is_ok() });

        shutdown.send(ServerMessage::Shutdown).unwrap();
        assert!(timeout(Duration::from_secs(2), handle).await.unwrap().unwrap());
    }
}
