use crate::connection::{ConnectionState, ConnectionTracker, ReconnectPolicy};
use crate::game::{ClientEvent, ClientGameState, PredictionSettings};
use crate::input::InputManager;
use log::{debug, error, info, warn};
use shared::codec::{read_packet, write_packet};
use shared::{GameConfig, Packet, UpgradeKind};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Commands from outside the network loop (keyboard, tests)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Reconnect,
    Purchase(UpgradeKind),
    Quit,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server: String,
    pub name: String,
    pub fake_ping_ms: u64,
    pub tick: Duration,
    /// Longest idle gap before a heartbeat is sent
    pub heartbeat: Duration,
    pub prediction: PredictionSettings,
    pub reconnect: ReconnectPolicy,
    pub config: GameConfig,
}

impl ClientOptions {
    pub fn new(server: &str, name: &str) -> Self {
        Self {
            server: server.to_string(),
            name: name.to_string(),
            fake_ping_ms: 0,
            tick: Duration::from_millis(33),
            heartbeat: Duration::from_secs(1),
            prediction: PredictionSettings::default(),
            reconnect: ReconnectPolicy::default(),
            config: GameConfig::default(),
        }
    }
}

/// How one connected session ended
enum SessionEnd {
    Lost,
    Quit,
}

pub struct Client {
    options: ClientOptions,
    game_state: ClientGameState,
    input_manager: InputManager,
    connection: ConnectionTracker,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
}

impl Client {
    pub fn new(options: ClientOptions) -> (Self, mpsc::UnboundedSender<ClientCommand>) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let game_state =
            ClientGameState::new(&options.name, options.config.clone(), options.prediction);
        let connection = ConnectionTracker::new(options.reconnect);

        let client = Client {
            options,
            game_state,
            input_manager: InputManager::new(),
            connection,
            commands,
        };
        (client, command_tx)
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    async fn send_packet(&self, writer: &mut OwnedWriteHalf, packet: &Packet) -> Result<(), ClientError> {
        if self.options.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
        }
        write_packet(writer, packet).await?;
        Ok(())
    }

    fn set_connection_state(&mut self, state: ConnectionState) {
        self.game_state
            .push_event(ClientEvent::ConnectionChanged(state));
    }

    fn log_events(&mut self) {
        for event in self.game_state.drain_events() {
            match event {
                ClientEvent::GridResized { old_size, new_size } => {
                    info!("Grid grew from {0}x{0} to {1}x{1}", old_size, new_size)
                }
                ClientEvent::GoldChanged { player_id, gold }
                    if Some(player_id) == self.game_state.local_id() =>
                {
                    info!("Gold: {}", gold)
                }
                ClientEvent::JoinRejected { reason } => warn!("Join rejected: {}", reason),
                ClientEvent::ServerClosed { reason } => warn!("Server closed the session: {}", reason),
                ClientEvent::ConnectionChanged(state) => info!("Connection: {:?}", state),
                other => debug!("{:?}", other),
            }
        }
    }

    /// Runs one connected session until the transport drops or a quit command.
    async fn run_session(&mut self, stream: TcpStream) -> Result<SessionEnd, ClientError> {
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        // Frame reads are not cancel-safe, so they live in their own task.
        let (packet_tx, mut packet_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(Some(packet)) => {
                        if packet_tx.send(packet).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error reading from server: {}", e);
                        break;
                    }
                }
            }
        });

        let mut tick = interval(self.options.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut established = false;
        let mut last_sent = Instant::now();

        let end = loop {
            tokio::select! {
                packet = packet_rx.recv() => {
                    let Some(packet) = packet else {
                        break SessionEnd::Lost;
                    };
                    if self.options.fake_ping_ms > 0 {
                        sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
                    }
                    // The server closes right after this; don't wait for EOF
                    let closing = matches!(packet, Packet::Disconnected { .. });
                    if let Some(reply) = self.game_state.apply_packet(packet) {
                        if let Err(e) = self.send_packet(&mut writer, &reply).await {
                            error!("Error sending packet: {}", e);
                            break SessionEnd::Lost;
                        }
                    }
                    if closing {
                        self.log_events();
                        break SessionEnd::Lost;
                    }
                    if !established && self.game_state.is_joined() {
                        established = true;
                        self.connection.established();
                    }
                }

                _ = tick.tick() => {
                    let now = Instant::now();
                    let mut outgoing = Vec::new();

                    if let Some(position) = self.input_manager.update(&self.game_state, now) {
                        outgoing.extend(self.game_state.set_position(position));
                    }
                    outgoing.extend(self.game_state.request_paint(now));
                    outgoing.extend(self.game_state.sweep_pending(now));
                    if outgoing.is_empty() && now.duration_since(last_sent) >= self.options.heartbeat {
                        outgoing.push(Packet::Heartbeat);
                    }
                    if !outgoing.is_empty() {
                        last_sent = now;
                    }

                    let mut failed = false;
                    for packet in &outgoing {
                        if let Err(e) = self.send_packet(&mut writer, packet).await {
                            error!("Error sending packet: {}", e);
                            failed = true;
                            break;
                        }
                    }
                    if failed {
                        break SessionEnd::Lost;
                    }
                    self.log_events();
                }

                command = self.commands.recv() => {
                    match command {
                        Some(ClientCommand::Purchase(upgrade)) => {
                            if let Some(packet) = self.game_state.purchase(upgrade) {
                                if let Err(e) = self.send_packet(&mut writer, &packet).await {
                                    error!("Error sending packet: {}", e);
                                    break SessionEnd::Lost;
                                }
                            }
                        }
                        Some(ClientCommand::Reconnect) => {
                            debug!("Already connected; ignoring reconnect");
                        }
                        Some(ClientCommand::Quit) | None => {
                            // Best effort; the server treats EOF the same way.
                            let _ = self.send_packet(&mut writer, &Packet::Leave).await;
                            break SessionEnd::Quit;
                        }
                    }
                }
            }
        };

        reader_task.abort();
        if let Err(e) = writer.shutdown().await {
            debug!("Error closing connection: {}", e);
        }
        Ok(end)
    }

    /// Waits in the failed state for a manual reconnect. Returns false on quit.
    async fn wait_for_manual_reconnect(&mut self) -> bool {
        info!("Reconnect attempts exhausted; waiting for manual reconnect");
        loop {
            match self.commands.recv().await {
                Some(ClientCommand::Reconnect) => {
                    if self.connection.manual_reconnect() {
                        return true;
                    }
                }
                Some(ClientCommand::Purchase(_)) => {
                    debug!("Not connected; ignoring purchase");
                }
                Some(ClientCommand::Quit) | None => return false,
            }
        }
    }

    /// Connects and keeps reconnecting with backoff until told to quit.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        loop {
            info!("Connecting to {}...", self.options.server);
            match TcpStream::connect(&self.options.server).await {
                Ok(stream) => {
                    self.connection.connected();
                    self.set_connection_state(ConnectionState::Connected);

                    match self.run_session(stream).await {
                        Ok(SessionEnd::Quit) => {
                            self.log_events();
                            return Ok(());
                        }
                        Ok(SessionEnd::Lost) => warn!("Connection lost"),
                        Err(e) => warn!("Session error: {}", e),
                    }
                }
                Err(e) => warn!("Failed to connect: {}", e),
            }

            self.game_state.on_disconnect();
            let delay = self.connection.connection_lost();
            self.set_connection_state(self.connection.state());
            self.log_events();

            match delay {
                Some(delay) => {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        command = self.commands.recv() => {
                            if matches!(command, Some(ClientCommand::Quit) | None) {
                                return Ok(());
                            }
                        }
                    }
                }
                None => {
                    if !self.wait_for_manual_reconnect().await {
                        return Ok(());
                    }
                    self.set_connection_state(ConnectionState::Connecting);
                }
            }
        }
    }
}
