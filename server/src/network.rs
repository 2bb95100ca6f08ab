//! Server network layer: TCP connections, per-connection tasks and the
//! session actor loop

use crate::game::{GameSession, Outbound};
use crate::resolver::{Dice, RandomDice};
use crate::roster::PlayerId;
use log::{debug, error, info, warn};
use shared::{decode, read_frame, write_packet, ClientPacket, ServerPacket, DEFAULT_EXPECTED_PLAYERS};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Console command that stops the server
pub const QUIT_COMMAND: &str = ".quit";

/// How long shutdown waits for the writers to flush their queues
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Roster size that starts the game once everyone is ready
    pub expected_players: usize,
    /// Fixed seed for the random actions, mostly for reproducible sessions
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            expected_players: DEFAULT_EXPECTED_PLAYERS,
            seed: None,
        }
    }
}

impl ServerConfig {
    fn dice(&self) -> Box<dyn Dice> {
        match self.seed {
            Some(seed) => Box::new(RandomDice::seeded(seed)),
            None => Box::new(RandomDice::from_entropy()),
        }
    }
}

/// Messages sent from connection tasks to the session loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { id: PlayerId, packet: ClientPacket },
    Disconnected { id: PlayerId },
}

/// One open connection: its outbound queue and the tasks serving it
struct Connection {
    packet_tx: mpsc::UnboundedSender<ServerPacket>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Authoritative server. Owns the session exclusively; connection tasks only
/// talk to it through channels.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    session: GameSession,
    connections: HashMap<PlayerId, Connection>,
    next_id: u32,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(addr: &str, config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            "Server listening on {} for {} players",
            local_addr, config.expected_players
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let mut session = GameSession::new(config.expected_players, config.dice());
        session.open();

        Ok(Server {
            listener,
            local_addr,
            session,
            connections: HashMap::new(),
            next_id: 1,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Registers a freshly accepted stream and spawns its reader and writer
    fn accept_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let id = PlayerId(self.next_id);
        self.next_id += 1;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to disable Nagle for {}: {}", addr, e);
        }
        info!("Connection {} from {}", id, addr);

        let (reader, writer) = stream.into_split();
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            packet_tx,
            reader: spawn_connection_reader(id, reader, self.server_tx.clone()),
            writer: spawn_connection_writer(id, writer, packet_rx),
        };
        self.connections.insert(id, connection);
    }

    fn handle_message(&mut self, message: ServerMessage) {
        let effects = match message {
            // Frames already queued by a reader that was closed since
            ServerMessage::PacketReceived { id, .. } if !self.connections.contains_key(&id) => {
                debug!("Ignoring packet from closed connection {}", id);
                return;
            }
            ServerMessage::PacketReceived { id, packet } => {
                debug!("{} sent {:?}", id, packet);
                self.session.handle(id, packet)
            }
            ServerMessage::Disconnected { id } => {
                info!("Connection {} closed", id);
                self.connections.remove(&id);
                self.session.disconnect(id)
            }
        };
        self.dispatch(effects);
    }

    /// Returns false when the console asked to stop.
    fn handle_console(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.eq_ignore_ascii_case(QUIT_COMMAND) {
            return false;
        }
        let effects = self.session.server_chat(line);
        self.dispatch(effects);
        true
    }

    /// Queues session effects on the connection writers, in emission order
    fn dispatch(&mut self, effects: Vec<Outbound>) {
        for effect in effects {
            match effect {
                Outbound::Broadcast(packet) => {
                    for (id, connection) in &self.connections {
                        if connection.packet_tx.send(packet.clone()).is_err() {
                            debug!("Writer for {} already gone", id);
                        }
                    }
                }
                Outbound::Unicast(id, packet) => match self.connections.get(&id) {
                    Some(connection) => {
                        if connection.packet_tx.send(packet).is_err() {
                            debug!("Writer for {} already gone", id);
                        }
                    }
                    None => warn!("Dropping packet for unknown connection {}", id),
                },
                // Dropping the sender lets the writer flush its queue and close;
                // the reader stops at once so the socket is never heard again
                Outbound::Close(id) => {
                    if let Some(connection) = self.connections.remove(&id) {
                        connection.reader.abort();
                        info!("Connection {} closed by the server", id);
                    }
                }
            }
        }
    }

    /// Tells every connection goodbye and waits for the writers to flush
    async fn shutdown(&mut self) {
        info!("Server shutting down");

        let mut writers = Vec::with_capacity(self.connections.len());
        for (id, connection) in self.connections.drain() {
            let goodbye = ServerPacket::Disconnected {
                reason: "Server shutting down".to_string(),
            };
            if connection.packet_tx.send(goodbye).is_err() {
                debug!("Writer for {} already gone", id);
            }
            connection.reader.abort();
            writers.push(connection.writer);
        }

        let flushed = timeout(SHUTDOWN_GRACE, async {
            for writer in writers {
                if let Err(e) = writer.await {
                    debug!("Writer task failed: {}", e);
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!("Gave up flushing connections after {:?}", SHUTDOWN_GRACE);
        }
    }

    /// Runs the session until the console sends `.quit`.
    ///
    /// Console lines other than `.quit` are broadcast as server chat. When
    /// the console channel closes the server keeps running.
    pub async fn run(&mut self, mut console: mpsc::UnboundedReceiver<String>) -> io::Result<()> {
        let mut console_open = true;
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => break,
                    }
                },

                line = console.recv(), if console_open => {
                    match line {
                        Some(line) => {
                            if !self.handle_console(&line) {
                                break;
                            }
                        }
                        None => console_open = false,
                    }
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }
}

/// Spawns the task that decodes inbound frames for one connection
fn spawn_connection_reader(
    id: PlayerId,
    mut reader: OwnedReadHalf,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(bytes)) => match decode::<ClientPacket>(&bytes) {
                    Ok(packet) => {
                        if let Err(e) = server_tx.send(ServerMessage::PacketReceived { id, packet })
                        {
                            error!("Failed to send packet to main loop: {}", e);
                            return;
                        }
                    }
                    Err(e) => warn!("Dropping packet from {}: {}", id, e),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Connection {} failed: {}", id, e);
                    break;
                }
            }
        }

        if server_tx.send(ServerMessage::Disconnected { id }).is_err() {
            debug!("Main loop gone before {} disconnected", id);
        }
    })
}

/// Spawns the task that drains one connection's outbound queue
fn spawn_connection_writer(
    id: PlayerId,
    mut writer: OwnedWriteHalf,
    mut packet_rx: mpsc::UnboundedReceiver<ServerPacket>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(packet) = packet_rx.recv().await {
            if let Err(e) = write_packet(&mut writer, &packet).await {
                warn!("Failed to send to {}: {}", id, e);
                break;
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", id, e);
        }
    })
}
