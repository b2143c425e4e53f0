//! Session tracking for connected players
//!
//! This module handles the server-side bookkeeping of connected sessions:
//! - Session lifecycle (connect, disconnect, timeout)
//! - The display name each session supplied when it connected
//! - Which room, if any, a session currently belongs to
//! - Address lookup for routing room broadcasts
//!
//! A session belongs to at most one room at a time. The room registry itself
//! lives in `room_manager`; this module only remembers the membership so an
//! incoming `Flap` or a disconnect can be routed without scanning every room.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected player session
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique session identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Display name supplied on connect, never validated
    pub username: String,
    /// Room the session currently plays in
    pub room_id: Option<String>,
    /// Last time we received any packet from this session
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, username: String) -> Self {
        Self {
            id,
            addr,
            username,
            room_id: None,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing has arrived from this session within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected sessions
///
/// Enforces the session capacity limit and hands out sequential session ids
/// starting from 1.
pub struct ClientManager {
    /// Connected sessions indexed by their id
    clients: HashMap<u32, Client>,
    /// Next available session id
    next_client_id: u32,
    /// Maximum number of concurrent sessions allowed
    max_clients: usize,
    /// Silence after which a session counts as disconnected
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Registers a new session.
    ///
    /// Returns `None` if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, username: String) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Session {} ({}) connected from {}", client_id, username, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, username));

        Some(client_id)
    }

    /// Removes a session and hands it back so its room can be cleaned up.
    pub fn remove_client(&mut self, client_id: u32) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Session {} disconnected", client.id);
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Marks the session as alive. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn room_of(&self, client_id: u32) -> Option<String> {
        self.clients.get(&client_id)?.room_id.clone()
    }

    pub fn set_room(&mut self, client_id: u32, room_id: Option<String>) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.room_id = room_id;
        }
    }

    pub fn username(&self, client_id: u32) -> Option<&str> {
        self.clients.get(&client_id).map(|c| c.username.as_str())
    }

    /// Resolves session ids to addresses, skipping ids that are gone.
    pub fn addrs_of(&self, client_ids: &[u32]) -> Vec<SocketAddr> {
        client_ids
            .iter()
            .filter_map(|id| self.clients.get(id))
            .map(|client| client.addr)
            .collect()
    }

    /// Lists sessions that have been silent for longer than the timeout.
    ///
    /// The sessions are not removed here; the server loop runs the full
    /// disconnect cleanup for each id.
    pub fn check_timeouts(&self) -> Vec<u32> {
        self.clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(self.timeout))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
