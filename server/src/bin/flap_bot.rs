//! Headless player for exercising a running server.
//!
//! Connects, creates a room (or joins the one given with `--room`), starts
//! the game when it owns the room and steers its bird toward the gap of the
//! next obstacle pair.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{error, info, warn};
use shared::{Bird, Obstacle, Packet, CANVAS_HEIGHT, GAP_FRACTION, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name sent on connect
    #[arg(short = 'u', long, default_value = "flap-bot")]
    username: String,

    /// Join this room instead of creating one
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Minimum time between two flaps
    #[arg(short = 'f', long, default_value = "250")]
    flap_interval_ms: u64,

    /// Restart the room after every game over (owner only)
    #[arg(long)]
    auto_restart: bool,
}

/// Decides whether the bird should flap to stay near the next gap.
fn should_flap(bird: &Bird, obstacles: &[Obstacle]) -> bool {
    let next_top = obstacles
        .iter()
        .filter(|o| o.is_top && o.right_edge() >= bird.x)
        .min_by(|a, b| a.right_edge().total_cmp(&b.right_edge()));

    let target = match next_top {
        Some(top) => top.y + top.height + GAP_FRACTION * CANVAS_HEIGHT / 2.0,
        None => CANVAS_HEIGHT / 2.0,
    };

    bird.dy >= 0.0 && bird.y + bird.height / 2.0 > target
}

struct Bot {
    socket: UdpSocket,
    server_addr: SocketAddr,
    args: Args,
    session_id: Option<u32>,
    room_id: Option<String>,
    owns_room: bool,
    playing: bool,
    score: u32,
    last_flap: Instant,
}

impl Bot {
    async fn new(args: Args) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = args.server.parse()?;

        Ok(Bot {
            socket,
            server_addr,
            args,
            session_id: None,
            room_id: None,
            owns_room: false,
            playing: false,
            score: 0,
            last_flap: Instant::now(),
        })
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Handles one server packet. Returns false once the bot should stop.
    async fn handle_packet(&mut self, packet: Packet) -> Result<bool, Box<dyn std::error::Error>> {
        match packet {
            Packet::Connected { session_id } => {
                info!("Connected as session {}", session_id);
                self.session_id = Some(session_id);
                match self.args.room.clone() {
                    Some(room_id) => self.send_packet(&Packet::JoinRoom { room_id }).await?,
                    None => self.send_packet(&Packet::CreateRoom).await?,
                }
            }

            Packet::SetCanvasSize {
                canvas_width,
                canvas_height,
            } => {
                info!("Canvas is {}x{}", canvas_width, canvas_height);
            }

            Packet::RoomCreated { room_id } => {
                info!("Created room {}", room_id);
                self.owns_room = true;
                self.room_id = Some(room_id.clone());
                self.send_packet(&Packet::StartGame { room_id }).await?;
            }

            Packet::JoinRoomSuccess { room_id } => {
                info!("Joined room {}, waiting for the owner to start", room_id);
                self.room_id = Some(room_id);
            }

            Packet::JoinRoomFailed { message } => {
                warn!("Could not join room: {}", message);
                return Ok(false);
            }

            Packet::RoomNotFound => {
                warn!("Room not found");
                return Ok(false);
            }

            Packet::StartGameFailed { message } => {
                warn!("Could not start game: {}", message);
            }

            Packet::PlayerJoined {
                session_id,
                username,
            } => {
                info!("{} joined as session {}", username, session_id);
            }

            Packet::PlayerDisconnected { session_id } => {
                info!("Session {} left the room", session_id);
            }

            Packet::OnlinePlayers { birds } => {
                info!("{} players in room", birds.len());
            }

            Packet::GameStarted { session_id } => {
                info!("Game started by session {}", session_id);
                self.playing = true;
                self.score = 0;
            }

            Packet::GameState { birds, obstacles } => {
                let Some(me) = birds.iter().find(|b| Some(b.id) == self.session_id) else {
                    return Ok(true);
                };
                self.score = me.score;

                let min_gap = Duration::from_millis(self.args.flap_interval_ms);
                if self.playing && self.last_flap.elapsed() >= min_gap && should_flap(me, &obstacles)
                {
                    self.last_flap = Instant::now();
                    self.send_packet(&Packet::Flap).await?;
                }
            }

            Packet::BirdCollision { session_id } => {
                if Some(session_id) == self.session_id {
                    info!("Crashed with a score of {}", self.score);
                    self.playing = false;
                } else {
                    info!("Session {} crashed", session_id);
                }
            }

            Packet::GameOver => {
                info!("Game over");
                self.playing = false;
                if self.args.auto_restart && self.owns_room {
                    if let Some(room_id) = self.room_id.clone() {
                        self.send_packet(&Packet::RestartGame { room_id }).await?;
                    }
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                return Ok(false);
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }

        Ok(true)
    }

    async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            username: self.args.username.clone(),
        })
        .await?;

        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let mut buffer = vec![0u8; 65536];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match deserialize::<Packet>(&buffer[0..len]) {
                            Ok(packet) => {
                                if !self.handle_packet(packet).await? {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to deserialize packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.session_id.is_some() {
                        self.send_packet(&Packet::Heartbeat).await?;
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Leaving");
                    break;
                },
            }
        }

        if self.session_id.is_some() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Connecting to: {}", args.server);

    let mut bot = Bot::new(args).await?;
    bot.run().await?;

    Ok(())
}
