//! Server network layer handling UDP communications and room timer coordination

use crate::session_manager::{Outgoing, SessionManager};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Largest datagram the server expects from a client
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Largest UDP payload that fits in a single IPv4 datagram
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// How often idle sessions are checked for timeouts
const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Number of timer wakeups between debug statistics lines
const STATS_EVERY: u64 = 600;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    CheckTimeouts,
    Shutdown,
}

/// Messages sent from main server loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        recipients: Vec<SocketAddr>,
    },
}

/// Serializes a packet, refusing anything too large for one datagram.
pub fn encode_datagram(packet: &Packet) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    let data = serialize(packet)?;
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(format!(
            "{} byte packet exceeds the {} byte datagram limit",
            data.len(),
            MAX_DATAGRAM_SIZE
        )
        .into());
    }
    Ok(data)
}

/// Main server coordinating networking, sessions and every room's timers
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: SessionManager,
    wakeups: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        client_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_sessions(addr, SessionManager::new(max_clients, client_timeout)).await
    }

    /// Binds the socket around an already configured session manager.
    pub async fn with_sessions(
        addr: &str,
        sessions: SessionManager,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            sessions,
            wakeups: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Returns a sender that can inject messages into the main loop,
    /// most usefully `ServerMessage::Shutdown`.
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[0..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, recipients } => {
                        let data = match encode_datagram(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Dropping packet for {} recipients: {}", recipients.len(), e);
                                continue;
                            }
                        };

                        for addr in recipients {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send {} byte packet to {}: {}", data.len(), addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that periodically asks the main loop to expire silent sessions
    fn spawn_timeout_checker(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TIMEOUT_CHECK_INTERVAL);

            loop {
                interval.tick().await;

                if let Err(e) = server_tx.send(ServerMessage::CheckTimeouts) {
                    debug!("Timeout checker stopping: {}", e);
                    break;
                }
            }
        });
    }

    /// Queues every outgoing packet for the sender task.
    fn dispatch(&self, outgoing: Vec<Outgoing>) {
        for Outgoing { packet, recipients } in outgoing {
            if recipients.is_empty() {
                continue;
            }

            if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, recipients }) {
                error!("Failed to queue packet for sending: {}", e);
            }
        }
    }

    fn log_stats(&mut self) {
        self.wakeups += 1;
        if self.wakeups % STATS_EVERY == 0 {
            debug!(
                "{} sessions, {} rooms ({} running)",
                self.sessions.clients().len(),
                self.sessions.rooms().len(),
                self.sessions.rooms().running_count()
            );
        }
    }

    /// Main server loop coordinating all operations
    ///
    /// Packets, timeout sweeps and room timers are all handled here one at a
    /// time, so no game or registry state is ever touched concurrently.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        loop {
            let deadline = self.sessions.next_deadline();

            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            let out = self.sessions.handle_packet(packet, addr, Instant::now());
                            self.dispatch(out);
                        },
                        Some(ServerMessage::CheckTimeouts) => {
                            let out = self.sessions.expire_timeouts();
                            self.dispatch(out);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle room timers
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let out = self.sessions.advance(Instant::now());
                    self.dispatch(out);
                    self.log_stats();
                },
            }
        }

        Ok(())
    }
}
