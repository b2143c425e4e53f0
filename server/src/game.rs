//! Authoritative per-room simulation
//!
//! A `Game` owns the birds of one room, the obstacles scrolling through it and
//! the two repeating timers that drive it: the physics tick and the obstacle
//! spawner. It never touches the network; `advance` reports what happened as
//! `GameEvent`s and the server turns those into packets.

use crate::scheduler::{tick_period, RepeatingTimer};
use log::{debug, info};
use rand::Rng;
use shared::{
    check_collision, Bird, Obstacle, MAX_TOP_FRACTION, MIN_TOP_FRACTION, SPAWN_INTERVAL_MS,
    TICK_RATE,
};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// Something the room's members need to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A bird hit an obstacle and is out of this run
    BirdCollision { session_id: u32 },
    /// No bird is alive any more; the game has stopped
    GameOver,
    /// A physics tick completed and a fresh snapshot should be broadcast
    Ticked,
}

#[derive(Debug)]
pub struct Game {
    room_id: String,
    birds: HashMap<u32, Bird>,
    obstacles: Vec<Obstacle>,
    started: bool,
    next_group_id: u32,
    tick: u64,
    tick_timer: RepeatingTimer,
    spawn_timer: RepeatingTimer,
}

impl Game {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            birds: HashMap::new(),
            obstacles: Vec::new(),
            started: false,
            next_group_id: 0,
            tick: 0,
            tick_timer: RepeatingTimer::new(tick_period(TICK_RATE)),
            spawn_timer: RepeatingTimer::new(Duration::from_millis(SPAWN_INTERVAL_MS)),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Puts a fresh bird at the spawn point. An existing bird with the same id
    /// is replaced.
    pub fn add_bird(&mut self, id: u32, username: &str) {
        let bird = Bird::new(id, username);
        debug!(
            "Room {}: added bird {} ({}) at ({}, {})",
            self.room_id, id, username, bird.x, bird.y
        );
        self.birds.insert(id, bird);
    }

    /// Removes a bird. Returns false if the id was not in the roster.
    pub fn remove_bird(&mut self, id: u32) -> bool {
        self.birds.remove(&id).is_some()
    }

    pub fn flap_bird(&mut self, id: u32) {
        if let Some(bird) = self.birds.get_mut(&id) {
            bird.flap();
        }
    }

    pub fn has_bird(&self, id: u32) -> bool {
        self.birds.contains_key(&id)
    }

    pub fn player_count(&self) -> usize {
        self.birds.len()
    }

    pub fn is_running(&self) -> bool {
        self.started
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn player_ids(&self) -> Vec<u32> {
        self.birds.keys().copied().collect()
    }

    pub fn get_all_birds(&self) -> Vec<Bird> {
        self.birds.values().cloned().collect()
    }

    pub fn get_alive_birds(&self) -> Vec<Bird> {
        self.birds.values().filter(|b| b.alive).cloned().collect()
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn bird(&self, id: u32) -> Option<&Bird> {
        self.birds.get(&id)
    }

    /// Moves the game from idle to running and arms both timers.
    ///
    /// Returns false without touching anything if the game is already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.started {
            return false;
        }

        self.obstacles.clear();
        self.started = true;
        self.tick_timer.arm(now);
        self.spawn_timer.arm(now);
        info!(
            "Room {}: game started with {} players",
            self.room_id,
            self.birds.len()
        );
        true
    }

    /// Disarms both timers. Returns false if the game was already idle.
    pub fn stop(&mut self) -> bool {
        if !self.started {
            return false;
        }

        self.started = false;
        self.tick_timer.cancel();
        self.spawn_timer.cancel();
        info!("Room {}: game stopped after {} ticks", self.room_id, self.tick);
        true
    }

    /// Stops, resets every bird in place, clears the course and starts again.
    pub fn restart(&mut self, now: Instant) -> bool {
        self.stop();

        for bird in self.birds.values_mut() {
            bird.reset_state();
        }
        self.obstacles.clear();
        self.next_group_id = 0;
        self.tick = 0;

        self.start(now)
    }

    /// Earliest instant at which `advance` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.tick_timer.next_due(), self.spawn_timer.next_due()) {
            (Some(tick), Some(spawn)) => Some(tick.min(spawn)),
            (tick, spawn) => tick.or(spawn),
        }
    }

    /// Runs whatever timers are due at `now`. The spawner goes first when both
    /// are due so a new pair takes part in the same tick.
    pub fn advance<R: Rng>(&mut self, now: Instant, rng: &mut R) -> Vec<GameEvent> {
        let mut events = Vec::new();

        if self.spawn_timer.fire_if_due(now) {
            self.spawn_obstacles(rng);
        }

        if self.tick_timer.fire_if_due(now) {
            self.update(&mut events);
            events.push(GameEvent::Ticked);
        }

        events
    }

    /// Adds one top/bottom pair at the right edge with a random opening.
    pub fn spawn_obstacles<R: Rng>(&mut self, rng: &mut R) {
        let top_fraction = rng.gen_range(MIN_TOP_FRACTION..MAX_TOP_FRACTION);
        self.next_group_id += 1;
        self.obstacles
            .extend(Obstacle::pair(self.next_group_id, top_fraction));
    }

    /// One physics tick: collisions, scoring, bird and obstacle motion, then the
    /// game-over check.
    pub fn update(&mut self, events: &mut Vec<GameEvent>) {
        self.tick += 1;

        self.detect_collisions(events);
        self.update_scores();

        for bird in self.birds.values_mut().filter(|b| b.alive) {
            bird.update();
        }

        for obstacle in &mut self.obstacles {
            obstacle.update();
        }
        self.obstacles.retain(|o| !o.to_delete);

        // Only fires if the collision phase has not already ended the run
        if self.started && !self.any_alive() {
            self.finish(events);
        }
    }

    fn detect_collisions(&mut self, events: &mut Vec<GameEvent>) {
        let bird_ids: Vec<u32> = self.birds.keys().copied().collect();

        for session_id in bird_ids {
            let Some(bird) = self.birds.get_mut(&session_id) else {
                continue;
            };
            if !bird.alive || !self.obstacles.iter().any(|o| check_collision(bird, o)) {
                continue;
            }

            bird.alive = false;
            debug!("Room {}: bird {} collided", self.room_id, session_id);
            events.push(GameEvent::BirdCollision { session_id });

            if self.started && !self.any_alive() {
                self.finish(events);
            }
        }
    }

    fn update_scores(&mut self) {
        for bird in self.birds.values_mut().filter(|b| b.alive) {
            for obstacle in &self.obstacles {
                if obstacle.is_passed_by(bird) {
                    bird.credit_dodge(obstacle.group_id);
                }
            }
        }
    }

    fn finish(&mut self, events: &mut Vec<GameEvent>) {
        self.stop();
        info!("Room {}: game over", self.room_id);
        events.push(GameEvent::GameOver);
    }

    fn any_alive(&self) -> bool {
        self.birds.values().any(|b| b.alive)
    }
}

#[cfg(test)]
impl Game {
    pub(crate) fn insert_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    pub(crate) fn bird_mut(&mut self, id: u32) -> Option<&mut Bird> {
        self.birds.get_mut(&id)
    }
}
