use crate::game::ClientMirror;
use crate::input::{self, InputError, Intent};
use log::{debug, error, info, warn};
use shared::{decode, read_frame, write_packet, ClientPacket, ServerPacket};
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc;

/// How many ports above the requested local port are tried when it is taken
const LOCAL_PORT_PROBES: u16 = 16;

/// Binds the local end to `port`, moving up while the port is in use.
fn bind_local(server_addr: SocketAddr, port: u16) -> io::Result<TcpSocket> {
    let mut last_error = None;

    for offset in 0..=LOCAL_PORT_PROBES {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        let socket = if server_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        let local: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], candidate))
        } else {
            SocketAddr::from(([0u16; 8], candidate))
        };

        match socket.bind(local) {
            Ok(()) => return Ok(socket),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!("Local port {} in use", candidate);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrInUse)))
}

/// Opens the connection to the server, optionally from a fixed local port.
pub async fn connect(server: &str, local_port: Option<u16>) -> io::Result<TcpStream> {
    let server_addr = tokio::net::lookup_host(server)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "server address did not resolve"))?;

    let stream = match local_port {
        Some(port) => bind_local(server_addr, port)?.connect(server_addr).await?,
        None => TcpStream::connect(server_addr).await?,
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Spawns the task that decodes frames from the server. The channel closes
/// when the connection does.
fn spawn_packet_reader(mut reader: OwnedReadHalf) -> mpsc::UnboundedReceiver<ServerPacket> {
    let (packet_tx, packet_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(bytes)) => match decode::<ServerPacket>(&bytes) {
                    Ok(packet) => {
                        if packet_tx.send(packet).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping packet from server: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Connection to server failed: {}", e);
                    break;
                }
            }
        }
    });

    packet_rx
}

pub struct Client {
    writer: OwnedWriteHalf,
    packet_rx: mpsc::UnboundedReceiver<ServerPacket>,
    mirror: ClientMirror,
}

impl Client {
    /// Connects and introduces the player to the server.
    pub async fn new(
        server: &str,
        local_port: Option<u16>,
        name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", server);
        let stream = connect(server, local_port).await?;
        info!("Connected from {}", stream.local_addr()?);

        let (reader, writer) = stream.into_split();
        let mut client = Client {
            writer,
            packet_rx: spawn_packet_reader(reader),
            mirror: ClientMirror::new(name),
        };

        client.mirror.connected();
        let intro = ClientPacket::Intro {
            name: name.to_string(),
            ready: client.mirror.me().ready,
        };
        client.send_packet(&intro).await?;

        Ok(client)
    }

    pub fn mirror(&self) -> &ClientMirror {
        &self.mirror
    }

    async fn send_packet(&mut self, packet: &ClientPacket) -> Result<(), shared::ProtocolError> {
        write_packet(&mut self.writer, packet).await
    }

    fn show(lines: &[String]) {
        for line in lines {
            println!("{}", line);
        }
    }

    /// Returns false when the user asked to leave.
    async fn handle_line(&mut self, line: &str) -> Result<bool, shared::ProtocolError> {
        match input::route(line, &mut self.mirror) {
            Ok(Intent::Send(packet)) => self.send_packet(&packet).await?,
            Ok(Intent::Show(lines)) => Self::show(&lines),
            Ok(Intent::Quit) => return Ok(false),
            Ok(Intent::Nothing) => {}
            Err(e @ InputError::UnknownCommand(_)) => {
                println!("{}", e);
                Self::show(&input::instructions(&self.mirror));
            }
            Err(e) => println!("{}", e),
        }
        Ok(true)
    }

    /// Runs until the server closes the connection, the input channel
    /// closes or the user types `.quit`.
    pub async fn run(
        &mut self,
        mut lines: mpsc::UnboundedReceiver<String>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Self::show(&input::instructions(&self.mirror));

        loop {
            tokio::select! {
                packet = self.packet_rx.recv() => {
                    match packet {
                        Some(packet) => {
                            let output = self.mirror.apply(packet);
                            Self::show(&output);
                        }
                        None => {
                            println!("Connection to the server closed.");
                            break;
                        }
                    }
                },

                line = lines.recv() => {
                    match line {
                        Some(line) => {
                            if !self.handle_line(&line).await? {
                                break;
                            }
                        }
                        None => break,
                    }
                },
            }
        }

        if let Err(e) = self.writer.shutdown().await {
            debug!("Failed to close connection: {}", e);
        }
        Ok(())
    }
}
