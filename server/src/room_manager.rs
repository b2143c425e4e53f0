//! Registry of live rooms, one `Game` per room
//!
//! Rooms are created on request, admit players while their game is idle and
//! are dropped as soon as the last player leaves. The registry enforces the
//! lifecycle preconditions and leaves all messaging to the caller.

use crate::error::RoomError;
use crate::game::{Game, GameEvent};
use log::info;
use rand::Rng;
use shared::Bird;
use std::collections::HashMap;
use tokio::time::Instant;

const ROOM_ID_PREFIX: &str = "room-";
const ROOM_ID_LEN: usize = 7;
const ROOM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// What happened to a room when a player left it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The room still has players
    PlayerLeft { remaining: usize },
    /// The last player left; the game was stopped and the room deleted
    RoomClosed,
}

#[derive(Default)]
pub struct RoomManager {
    games: HashMap<String, Game>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an idle room under a fresh id and returns the id.
    pub fn create_room<R: Rng>(&mut self, rng: &mut R) -> String {
        let room_id = loop {
            let candidate = generate_room_id(rng);
            if !self.games.contains_key(&candidate) {
                break candidate;
            }
        };

        info!("Room {} created", room_id);
        self.games.insert(room_id.clone(), Game::new(room_id.clone()));
        room_id
    }

    /// Checks that a room exists and is still accepting players.
    pub fn check_joinable(&self, room_id: &str) -> Result<(), RoomError> {
        let game = self.game(room_id)?;
        if game.is_running() {
            return Err(RoomError::AlreadyStarted(room_id.to_string()));
        }
        Ok(())
    }

    pub fn join_room(
        &mut self,
        room_id: &str,
        session_id: u32,
        username: &str,
    ) -> Result<(), RoomError> {
        self.check_joinable(room_id)?;
        let game = self.game_mut(room_id)?;
        game.add_bird(session_id, username);
        info!(
            "Session {} joined room {} ({} players)",
            session_id,
            room_id,
            game.player_count()
        );
        Ok(())
    }

    pub fn start_game(&mut self, room_id: &str, now: Instant) -> Result<(), RoomError> {
        let game = self.game_mut(room_id)?;
        if !game.start(now) {
            return Err(RoomError::AlreadyStarted(room_id.to_string()));
        }
        Ok(())
    }

    /// Starts a new run with every bird back at the spawn point.
    ///
    /// Refused while a run is in progress.
    pub fn restart_game(&mut self, room_id: &str, now: Instant) -> Result<(), RoomError> {
        let game = self.game_mut(room_id)?;
        if game.is_running() {
            return Err(RoomError::AlreadyStarted(room_id.to_string()));
        }
        game.restart(now);
        Ok(())
    }

    pub fn flap(&mut self, room_id: &str, session_id: u32) -> Result<(), RoomError> {
        self.game_mut(room_id)?.flap_bird(session_id);
        Ok(())
    }

    /// Removes a session's bird, deleting the room once it is empty.
    pub fn leave_room(&mut self, room_id: &str, session_id: u32) -> Result<LeaveOutcome, RoomError> {
        let game = self.game_mut(room_id)?;
        game.remove_bird(session_id);

        let remaining = game.player_count();
        if remaining > 0 {
            return Ok(LeaveOutcome::PlayerLeft { remaining });
        }

        game.stop();
        self.games.remove(room_id);
        info!("Room {} deleted, no players left", room_id);
        Ok(LeaveOutcome::RoomClosed)
    }

    pub fn members(&self, room_id: &str) -> Vec<u32> {
        self.games
            .get(room_id)
            .map(Game::player_ids)
            .unwrap_or_default()
    }

    pub fn all_birds(&self, room_id: &str) -> Vec<Bird> {
        self.games
            .get(room_id)
            .map(Game::get_all_birds)
            .unwrap_or_default()
    }

    pub fn get(&self, room_id: &str) -> Option<&Game> {
        self.games.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Game> {
        self.games.get_mut(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.games.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.games.values().filter(|g| g.is_running()).count()
    }

    /// Earliest timer deadline across all rooms, `None` if nothing is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.games.values().filter_map(Game::next_deadline).min()
    }

    /// Runs every room's due timers and collects the resulting events per room.
    pub fn advance<R: Rng>(&mut self, now: Instant, rng: &mut R) -> Vec<(String, Vec<GameEvent>)> {
        self.games
            .values_mut()
            .filter_map(|game| {
                let events = game.advance(now, rng);
                (!events.is_empty()).then(|| (game.room_id().to_string(), events))
            })
            .collect()
    }

    fn game(&self, room_id: &str) -> Result<&Game, RoomError> {
        self.games
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))
    }

    fn game_mut(&mut self, room_id: &str) -> Result<&mut Game, RoomError> {
        self.games
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))
    }
}

/// `room-` followed by seven random base-36 characters.
pub fn generate_room_id<R: Rng>(rng: &mut R) -> String {
    let suffix: String = (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", ROOM_ID_PREFIX, suffix)
}
