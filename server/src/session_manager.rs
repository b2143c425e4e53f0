//! Event protocol termination: sessions, rooms and room-scoped broadcasts
//!
//! `SessionManager` turns each inbound packet into registry operations and
//! answers with the packets to send and who should receive them. It performs
//! no I/O itself, which keeps every protocol rule testable without sockets.
//! The network layer owns exactly one `SessionManager` and feeds it packets,
//! timer expirations and timeouts one at a time.

use crate::client_manager::ClientManager;
use crate::error::RoomError;
use crate::game::GameEvent;
use crate::room_manager::{LeaveOutcome, RoomManager};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Packet, CANVAS_HEIGHT, CANVAS_WIDTH, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Display names longer than this are cut down on connect.
pub const MAX_USERNAME_CHARS: usize = 32;

/// A packet together with the addresses it goes to.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub packet: Packet,
    pub recipients: Vec<SocketAddr>,
}

impl Outgoing {
    pub fn to(packet: Packet, addr: SocketAddr) -> Self {
        Self {
            packet,
            recipients: vec![addr],
        }
    }
}

pub struct SessionManager {
    clients: ClientManager,
    rooms: RoomManager,
    rng: StdRng,
}

impl SessionManager {
    pub fn new(max_clients: usize, client_timeout: Duration) -> Self {
        Self::with_rng(max_clients, client_timeout, StdRng::from_entropy())
    }

    /// Builds a manager with a caller-supplied generator for room ids and
    /// obstacle heights.
    pub fn with_rng(max_clients: usize, client_timeout: Duration, rng: StdRng) -> Self {
        Self {
            clients: ClientManager::new(max_clients, client_timeout),
            rooms: RoomManager::new(),
            rng,
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.rooms.next_deadline()
    }

    /// Processes one inbound packet from `addr`.
    pub fn handle_packet(&mut self, packet: Packet, addr: SocketAddr, now: Instant) -> Vec<Outgoing> {
        if let Packet::Connect {
            client_version,
            username,
        } = packet
        {
            return self.connect(addr, client_version, username);
        }

        let Some(session_id) = self.clients.find_client_by_addr(addr) else {
            warn!("Dropping packet from unknown address {}", addr);
            return Vec::new();
        };
        self.clients.touch(session_id);

        match packet {
            Packet::Heartbeat => Vec::new(),
            Packet::CreateRoom => self.create_room(session_id, addr),
            Packet::JoinRoom { room_id } => self.join_room(session_id, addr, room_id),
            Packet::StartGame { room_id } => self.start_game(session_id, addr, room_id, now, false),
            Packet::RestartGame { room_id } => self.start_game(session_id, addr, room_id, now, true),
            Packet::Flap => {
                if let Err(e) = self.flap(session_id) {
                    debug!("Ignoring flap from session {}: {}", session_id, e);
                }
                Vec::new()
            }
            Packet::Disconnect => self.disconnect(session_id),
            _ => {
                warn!("Unexpected packet type from session {} at {}", session_id, addr);
                Vec::new()
            }
        }
    }

    fn connect(&mut self, addr: SocketAddr, client_version: u32, username: String) -> Vec<Outgoing> {
        let username: String = username.chars().take(MAX_USERNAME_CHARS).collect();
        info!(
            "Client connecting from {} as {} (version: {})",
            addr, username, client_version
        );

        if client_version != PROTOCOL_VERSION {
            return vec![Outgoing::to(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            )];
        }

        // A reconnect from the same address replaces the old session
        let mut out = Vec::new();
        if let Some(existing_id) = self.clients.find_client_by_addr(addr) {
            info!("Replacing existing session {} from {}", existing_id, addr);
            out.extend(self.disconnect(existing_id));
        }

        match self.clients.add_client(addr, username) {
            Some(session_id) => {
                out.push(Outgoing::to(Packet::Connected { session_id }, addr));
                out.push(Outgoing::to(
                    Packet::SetCanvasSize {
                        canvas_width: CANVAS_WIDTH,
                        canvas_height: CANVAS_HEIGHT,
                    },
                    addr,
                ));
            }
            None => out.push(Outgoing::to(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            )),
        }
        out
    }

    fn create_room(&mut self, session_id: u32, addr: SocketAddr) -> Vec<Outgoing> {
        let mut out = self.leave_current_room(session_id);

        let room_id = self.rooms.create_room(&mut self.rng);
        let username = self.username(session_id);
        if let Err(e) = self.rooms.join_room(&room_id, session_id, &username) {
            warn!("Fresh room {} refused its creator: {}", room_id, e);
            out.push(Outgoing::to(Packet::RoomNotFound, addr));
            return out;
        }
        self.clients.set_room(session_id, Some(room_id.clone()));

        out.push(Outgoing::to(
            Packet::RoomCreated {
                room_id: room_id.clone(),
            },
            addr,
        ));
        out.push(self.to_room(
            &room_id,
            Packet::PlayerJoined {
                session_id,
                username,
            },
        ));
        out.push(self.online_players(&room_id));
        out
    }

    fn join_room(&mut self, session_id: u32, addr: SocketAddr, room_id: String) -> Vec<Outgoing> {
        if let Err(e) = self.rooms.check_joinable(&room_id) {
            return vec![Self::failure(e, addr, false)];
        }

        let mut out = Vec::new();
        if self.clients.room_of(session_id).as_deref() != Some(room_id.as_str()) {
            out.extend(self.leave_current_room(session_id));
        }

        let username = self.username(session_id);
        if let Err(e) = self.rooms.join_room(&room_id, session_id, &username) {
            out.push(Self::failure(e, addr, false));
            return out;
        }
        self.clients.set_room(session_id, Some(room_id.clone()));

        out.push(Outgoing::to(
            Packet::JoinRoomSuccess {
                room_id: room_id.clone(),
            },
            addr,
        ));
        out.push(self.to_room(
            &room_id,
            Packet::PlayerJoined {
                session_id,
                username,
            },
        ));
        out.push(self.online_players(&room_id));
        out
    }

    fn start_game(
        &mut self,
        session_id: u32,
        addr: SocketAddr,
        room_id: String,
        now: Instant,
        restart: bool,
    ) -> Vec<Outgoing> {
        let result = if restart {
            self.rooms.restart_game(&room_id, now)
        } else {
            self.rooms.start_game(&room_id, now)
        };

        if let Err(e) = result {
            let mut out = vec![Self::failure(e, addr, true)];
            if self.rooms.contains(&room_id) {
                out.push(self.online_players(&room_id));
            }
            return out;
        }

        info!("Session {} started room {}", session_id, room_id);
        vec![
            self.to_room(&room_id, Packet::GameStarted { session_id }),
            self.online_players(&room_id),
        ]
    }

    fn flap(&mut self, session_id: u32) -> Result<(), RoomError> {
        let room_id = self
            .clients
            .room_of(session_id)
            .ok_or(RoomError::NotInRoom(session_id))?;
        self.rooms.flap(&room_id, session_id)
    }

    /// Full cleanup for a session that went away, explicitly or by timeout.
    pub fn disconnect(&mut self, session_id: u32) -> Vec<Outgoing> {
        let out = self.leave_current_room(session_id);
        self.clients.remove_client(session_id);
        out
    }

    /// Disconnects every session that has been silent for too long.
    pub fn expire_timeouts(&mut self) -> Vec<Outgoing> {
        let mut out = Vec::new();
        for session_id in self.clients.check_timeouts() {
            info!("Session {} timed out", session_id);
            out.extend(self.disconnect(session_id));
        }
        out
    }

    /// Runs all due room timers and turns their events into broadcasts.
    pub fn advance(&mut self, now: Instant) -> Vec<Outgoing> {
        let updates = self.rooms.advance(now, &mut self.rng);

        let mut out = Vec::new();
        for (room_id, events) in updates {
            for event in events {
                let packet = match event {
                    GameEvent::BirdCollision { session_id } => Packet::BirdCollision { session_id },
                    GameEvent::GameOver => Packet::GameOver,
                    GameEvent::Ticked => self.game_state(&room_id),
                };
                out.push(self.to_room(&room_id, packet));
            }
        }
        out
    }

    fn leave_current_room(&mut self, session_id: u32) -> Vec<Outgoing> {
        let Some(room_id) = self.clients.room_of(session_id) else {
            return Vec::new();
        };
        self.clients.set_room(session_id, None);

        match self.rooms.leave_room(&room_id, session_id) {
            Ok(LeaveOutcome::RoomClosed) => Vec::new(),
            Ok(LeaveOutcome::PlayerLeft { remaining }) => {
                info!(
                    "Session {} left room {} ({} players remain)",
                    session_id, room_id, remaining
                );
                vec![
                    self.to_room(&room_id, Packet::PlayerDisconnected { session_id }),
                    self.online_players(&room_id),
                ]
            }
            Err(e) => {
                debug!("Session {} had no room to leave: {}", session_id, e);
                Vec::new()
            }
        }
    }

    fn game_state(&self, room_id: &str) -> Packet {
        match self.rooms.get(room_id) {
            Some(game) => Packet::GameState {
                birds: game.get_alive_birds(),
                obstacles: game.obstacles().to_vec(),
            },
            None => Packet::GameState {
                birds: Vec::new(),
                obstacles: Vec::new(),
            },
        }
    }

    fn online_players(&self, room_id: &str) -> Outgoing {
        self.to_room(
            room_id,
            Packet::OnlinePlayers {
                birds: self.rooms.all_birds(room_id),
            },
        )
    }

    fn to_room(&self, room_id: &str, packet: Packet) -> Outgoing {
        Outgoing {
            packet,
            recipients: self.clients.addrs_of(&self.rooms.members(room_id)),
        }
    }

    fn username(&self, session_id: u32) -> String {
        self.clients
            .username(session_id)
            .unwrap_or_default()
            .to_string()
    }

    /// Maps a refused room operation to the packet the requester sees.
    fn failure(error: RoomError, addr: SocketAddr, starting: bool) -> Outgoing {
        let packet = match error {
            RoomError::NotFound(_) => Packet::RoomNotFound,
            RoomError::AlreadyStarted(_) if starting => Packet::StartGameFailed {
                message: error.to_string(),
            },
            RoomError::AlreadyStarted(_) => Packet::JoinRoomFailed {
                message: error.to_string(),
            },
            // Only flaps raise this, and they are never answered
            RoomError::NotInRoom(_) => Packet::RoomNotFound,
        };
        Outgoing::to(packet, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Bird, Obstacle};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn manager() -> SessionManager {
        SessionManager::with_rng(8, Duration::from_secs(5), StdRng::seed_from_u64(1))
    }

    fn connect(sessions: &mut SessionManager, port: u16, name: &str) -> u32 {
        let out = sessions.handle_packet(
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                username: name.to_string(),
            },
            addr(port),
            Instant::now(),
        );
        match out.first().map(|o| &o.packet) {
            Some(Packet::Connected { session_id }) => *session_id,
            other => panic!("expected Connected, got {:?}", other),
        }
    }

    fn create_room(sessions: &mut SessionManager, port: u16) -> String {
        let out = sessions.handle_packet(Packet::CreateRoom, addr(port), Instant::now());
        out.iter()
            .find_map(|o| match &o.packet {
                Packet::RoomCreated { room_id } => Some(room_id.clone()),
                _ => None,
            })
            .expect("room created")
    }

    fn packets(out: &[Outgoing]) -> Vec<&Packet> {
        out.iter().map(|o| &o.packet).collect()
    }

    #[test]
    fn test_connect_sends_id_and_canvas() {
        let mut sessions = manager();
        let out = sessions.handle_packet(
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                username: "ada".into(),
            },
            addr(9000),
            Instant::now(),
        );

        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].packet, Packet::Connected { session_id: 1 }));
        match out[1].packet {
            Packet::SetCanvasSize {
                canvas_width,
                canvas_height,
            } => {
                assert_eq!(canvas_width, 560.0);
                assert_eq!(canvas_height, 400.0);
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out[1].recipients, vec![addr(9000)]);
    }

    #[test]
    fn test_connect_truncates_long_username() {
        let mut sessions = manager();
        let ada = connect(&mut sessions, 9000, &"a".repeat(2000));

        let name = sessions.clients().username(ada).unwrap_or_default();
        assert_eq!(name.chars().count(), MAX_USERNAME_CHARS);

        // Multi-byte names are cut on character boundaries
        let bob = connect(&mut sessions, 9001, &"é".repeat(40));
        assert_eq!(
            sessions.clients().username(bob),
            Some("é".repeat(MAX_USERNAME_CHARS).as_str())
        );
    }

    #[test]
    fn test_connect_version_mismatch() {
        let mut sessions = manager();
        let out = sessions.handle_packet(
            Packet::Connect {
                client_version: 99,
                username: "ada".into(),
            },
            addr(9000),
            Instant::now(),
        );
        assert!(matches!(out[0].packet, Packet::Disconnected { .. }));
        assert!(sessions.clients().is_empty());
    }

    #[test]
    fn test_server_full() {
        let mut sessions =
            SessionManager::with_rng(1, Duration::from_secs(5), StdRng::seed_from_u64(1));
        connect(&mut sessions, 9000, "ada");
        let out = sessions.handle_packet(
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                username: "bob".into(),
            },
            addr(9001),
            Instant::now(),
        );
        match &out[0].packet {
            Packet::Disconnected { reason } => assert_eq!(reason, "Server full"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_address_is_ignored() {
        let mut sessions = manager();
        let out = sessions.handle_packet(Packet::CreateRoom, addr(9000), Instant::now());
        assert!(out.is_empty());
        assert!(sessions.rooms().is_empty());
    }

    #[test]
    fn test_create_room_admits_creator() {
        let mut sessions = manager();
        let ada = connect(&mut sessions, 9000, "ada");

        let out = sessions.handle_packet(Packet::CreateRoom, addr(9000), Instant::now());
        let room_id = match &out[0].packet {
            Packet::RoomCreated { room_id } => room_id.clone(),
            other => panic!("unexpected {:?}", other),
        };

        match &out[1].packet {
            Packet::PlayerJoined {
                session_id,
                username,
            } => {
                assert_eq!(*session_id, ada);
                assert_eq!(username, "ada");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out[1].recipients, vec![addr(9000)]);
        assert!(matches!(&out[2].packet, Packet::OnlinePlayers { birds } if birds.len() == 1));

        assert_eq!(sessions.clients().room_of(ada), Some(room_id.clone()));
        assert_eq!(sessions.rooms().members(&room_id), vec![ada]);
    }

    #[test]
    fn test_join_room_notifies_everyone() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        let bob = connect(&mut sessions, 9001, "bob");
        let room_id = create_room(&mut sessions, 9000);

        let out = sessions.handle_packet(
            Packet::JoinRoom {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );

        assert!(matches!(&out[0].packet, Packet::JoinRoomSuccess { room_id: r } if *r == room_id));
        assert_eq!(out[0].recipients, vec![addr(9001)]);

        assert!(matches!(
            &out[1].packet,
            Packet::PlayerJoined { session_id, username } if *session_id == bob && username == "bob"
        ));
        let mut recipients = out[1].recipients.clone();
        recipients.sort();
        assert_eq!(recipients, vec![addr(9000), addr(9001)]);
        assert_eq!(sessions.rooms().members(&room_id).len(), 2);
    }

    #[test]
    fn test_join_missing_room() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        let out = sessions.handle_packet(
            Packet::JoinRoom {
                room_id: "room-nothere".into(),
            },
            addr(9000),
            Instant::now(),
        );
        assert_eq!(packets(&out).len(), 1);
        assert!(matches!(out[0].packet, Packet::RoomNotFound));
    }

    #[test]
    fn test_join_started_room_fails() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        let bob = connect(&mut sessions, 9001, "bob");
        let room_id = create_room(&mut sessions, 9000);
        sessions.handle_packet(
            Packet::StartGame {
                room_id: room_id.clone(),
            },
            addr(9000),
            Instant::now(),
        );

        let out = sessions.handle_packet(
            Packet::JoinRoom {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );

        match &out[0].packet {
            Packet::JoinRoomFailed { message } => assert_eq!(message, "Game already started"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out[0].recipients, vec![addr(9001)]);
        assert_eq!(sessions.clients().room_of(bob), None);
    }

    #[test]
    fn test_start_game_twice() {
        let mut sessions = manager();
        let ada = connect(&mut sessions, 9000, "ada");
        let room_id = create_room(&mut sessions, 9000);
        let start = Packet::StartGame {
            room_id: room_id.clone(),
        };

        let out = sessions.handle_packet(start.clone(), addr(9000), Instant::now());
        assert!(matches!(out[0].packet, Packet::GameStarted { session_id } if session_id == ada));
        assert!(sessions.next_deadline().is_some());

        let out = sessions.handle_packet(start, addr(9000), Instant::now());
        assert!(matches!(&out[0].packet, Packet::StartGameFailed { message } if message == "Game already started"));
        assert_eq!(sessions.rooms().running_count(), 1);
    }

    #[test]
    fn test_start_missing_room() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        let out = sessions.handle_packet(
            Packet::StartGame {
                room_id: "room-nothere".into(),
            },
            addr(9000),
            Instant::now(),
        );
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].packet, Packet::RoomNotFound));
    }

    #[test]
    fn test_flap_reaches_own_bird() {
        let mut sessions = manager();
        let ada = connect(&mut sessions, 9000, "ada");
        let room_id = create_room(&mut sessions, 9000);

        let out = sessions.handle_packet(Packet::Flap, addr(9000), Instant::now());
        assert!(out.is_empty());

        let dy = sessions
            .rooms()
            .get(&room_id)
            .and_then(|g| g.bird(ada))
            .map(|b| b.dy);
        assert_eq!(dy, Some(shared::FLAP_VELOCITY));
    }

    #[test]
    fn test_flap_without_room_is_ignored() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        assert!(sessions
            .handle_packet(Packet::Flap, addr(9000), Instant::now())
            .is_empty());
    }

    #[test]
    fn test_disconnect_notifies_remaining_members() {
        let mut sessions = manager();
        let ada = connect(&mut sessions, 9000, "ada");
        connect(&mut sessions, 9001, "bob");
        let room_id = create_room(&mut sessions, 9000);
        sessions.handle_packet(
            Packet::JoinRoom {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );

        let out = sessions.handle_packet(Packet::Disconnect, addr(9000), Instant::now());

        assert!(matches!(out[0].packet, Packet::PlayerDisconnected { session_id } if session_id == ada));
        assert_eq!(out[0].recipients, vec![addr(9001)]);
        assert!(matches!(&out[1].packet, Packet::OnlinePlayers { birds } if birds.len() == 1));
        assert!(sessions.rooms().contains(&room_id));
        assert_eq!(sessions.clients().len(), 1);
    }

    #[test]
    fn test_last_disconnect_deletes_running_room() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        connect(&mut sessions, 9001, "bob");
        let room_id = create_room(&mut sessions, 9000);
        sessions.handle_packet(
            Packet::JoinRoom {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );
        sessions.handle_packet(
            Packet::StartGame {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );

        sessions.handle_packet(Packet::Disconnect, addr(9000), Instant::now());
        let out = sessions.handle_packet(Packet::Disconnect, addr(9001), Instant::now());

        assert!(out.is_empty());
        assert!(!sessions.rooms().contains(&room_id));
        assert_eq!(sessions.next_deadline(), None);
        assert!(sessions.clients().is_empty());
    }

    #[test]
    fn test_creating_new_room_leaves_old_one() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        let first = create_room(&mut sessions, 9000);
        let second = create_room(&mut sessions, 9000);

        assert_ne!(first, second);
        assert!(!sessions.rooms().contains(&first));
        assert!(sessions.rooms().contains(&second));
    }

    #[test]
    fn test_reconnect_replaces_session() {
        let mut sessions = manager();
        connect(&mut sessions, 9000, "ada");
        let room_id = create_room(&mut sessions, 9000);

        let again = connect(&mut sessions, 9000, "ada");
        assert_eq!(again, 2);
        assert_eq!(sessions.clients().len(), 1);
        assert!(!sessions.rooms().contains(&room_id));
    }

    #[test]
    fn test_tick_broadcasts_alive_birds_only() {
        let mut sessions = manager();
        let ada = connect(&mut sessions, 9000, "ada");
        let bob = connect(&mut sessions, 9001, "bob");
        let room_id = create_room(&mut sessions, 9000);
        sessions.handle_packet(
            Packet::JoinRoom {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );
        sessions.handle_packet(
            Packet::StartGame {
                room_id: room_id.clone(),
            },
            addr(9000),
            Instant::now(),
        );

        let deadline = sessions.next_deadline().expect("running room");
        let out = sessions.advance(deadline);
        match &out[0].packet {
            Packet::GameState { birds, obstacles } => {
                assert_eq!(birds.len(), 2);
                assert!(obstacles.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out[0].recipients.len(), 2);

        // Park an obstacle on ada's bird only, bob flies clear above it
        let game = sessions.rooms.get_mut(&room_id).expect("room");
        let ada_bird: Bird = game.bird(ada).cloned().expect("ada's bird");
        if let Some(bob_bird) = game.bird_mut(bob) {
            bob_bird.y = 0.0;
        }
        game.insert_obstacle(Obstacle::new(
            1,
            ada_bird.x,
            ada_bird.y,
            ada_bird.width,
            ada_bird.height,
            false,
        ));

        let deadline = sessions.next_deadline().expect("running room");
        let out = sessions.advance(deadline);
        let kinds = packets(&out);
        assert!(matches!(kinds[0], Packet::BirdCollision { .. }));
        assert_eq!(kinds.len(), 2);
        match kinds[1] {
            Packet::GameState { birds, .. } => {
                let ids: Vec<u32> = birds.iter().map(|b| b.id).collect();
                assert_eq!(ids, vec![bob]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_timeouts_run_disconnect_cleanup() {
        let mut sessions =
            SessionManager::with_rng(8, Duration::from_millis(0), StdRng::seed_from_u64(1));
        connect(&mut sessions, 9000, "ada");
        let room_id = create_room(&mut sessions, 9000);
        std::thread::sleep(Duration::from_millis(5));

        sessions.expire_timeouts();

        assert!(sessions.clients().is_empty());
        assert!(!sessions.rooms().contains(&room_id));
    }

    #[test]
    fn test_restart_game_only_after_game_over() {
        let mut sessions = manager();
        let ada = connect(&mut sessions, 9000, "ada");
        let bob = connect(&mut sessions, 9001, "bob");
        let room_id = create_room(&mut sessions, 9000);
        sessions.handle_packet(
            Packet::JoinRoom {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );
        sessions.handle_packet(
            Packet::StartGame {
                room_id: room_id.clone(),
            },
            addr(9000),
            Instant::now(),
        );

        let out = sessions.handle_packet(
            Packet::RestartGame {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );
        match &out[0].packet {
            Packet::StartGameFailed { message } => assert_eq!(message, "Game already started"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out[0].recipients, vec![addr(9001)]);

        // Idle birds sink into the first bottom pipe
        let mut game_overs = 0;
        let mut steps = 0;
        while let Some(deadline) = sessions.next_deadline() {
            let out = sessions.advance(deadline);
            game_overs += out
                .iter()
                .filter(|o| matches!(o.packet, Packet::GameOver))
                .count();
            steps += 1;
            assert!(steps < 10_000, "game never ended");
        }
        assert_eq!(game_overs, 1);

        if let Some(bird) = sessions
            .rooms
            .get_mut(&room_id)
            .and_then(|game| game.bird_mut(ada))
        {
            bird.score = 3;
            bird.dodged.insert(1);
        }

        let out = sessions.handle_packet(
            Packet::RestartGame {
                room_id: room_id.clone(),
            },
            addr(9001),
            Instant::now(),
        );
        assert!(matches!(out[0].packet, Packet::GameStarted { session_id } if session_id == bob));
        let mut recipients = out[0].recipients.clone();
        recipients.sort();
        assert_eq!(recipients, vec![addr(9000), addr(9001)]);

        let game = sessions.rooms().get(&room_id).expect("room still open");
        assert!(game.is_running());
        assert!(game.obstacles().is_empty());
        assert_eq!(game.player_count(), 2);
        for bird in game.get_all_birds() {
            assert!(bird.alive);
            assert_eq!(bird.score, 0);
            assert!(bird.dodged.is_empty());
        }
    }
}
