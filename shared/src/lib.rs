use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const PROTOCOL_VERSION: u32 = 1;

pub const CANVAS_WIDTH: f32 = 560.0;
pub const CANVAS_HEIGHT: f32 = 400.0;
pub const TICK_RATE: u32 = 60;
pub const SPAWN_INTERVAL_MS: u64 = 2000;

pub const GRAVITY: f32 = 0.5;
pub const FLAP_VELOCITY: f32 = -5.0;
pub const INITIAL_FALL_SPEED: f32 = 2.0;
pub const BIRD_WIDTH: f32 = 34.0;
pub const BIRD_HEIGHT: f32 = 24.0;

pub const OBSTACLE_SPEED: f32 = 2.0;
pub const OBSTACLE_WIDTH: f32 = 50.0;
pub const GAP_FRACTION: f32 = 0.3;
pub const MIN_TOP_FRACTION: f32 = 0.1;
pub const MAX_TOP_FRACTION: f32 = 0.6;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        username: String,
    },
    Heartbeat,
    CreateRoom,
    JoinRoom {
        room_id: String,
    },
    StartGame {
        room_id: String,
    },
    RestartGame {
        room_id: String,
    },
    Flap,
    Disconnect,

    Connected {
        session_id: u32,
    },
    SetCanvasSize {
        canvas_width: f32,
        canvas_height: f32,
    },
    RoomCreated {
        room_id: String,
    },
    JoinRoomSuccess {
        room_id: String,
    },
    JoinRoomFailed {
        message: String,
    },
    RoomNotFound,
    StartGameFailed {
        message: String,
    },
    PlayerJoined {
        session_id: u32,
        username: String,
    },
    PlayerDisconnected {
        session_id: u32,
    },
    BirdCollision {
        session_id: u32,
    },
    GameStarted {
        session_id: u32,
    },
    GameOver,
    GameState {
        birds: Vec<Bird>,
        obstacles: Vec<Obstacle>,
    },
    OnlinePlayers {
        birds: Vec<Bird>,
    },
    Disconnected {
        reason: String,
    },
}

/// A player's flapping character.
///
/// `dodged` holds the obstacle groups already credited to `score`; it is
/// server bookkeeping and is not sent over the wire.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Bird {
    pub id: u32,
    pub username: String,
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub gravity: f32,
    pub width: f32,
    pub height: f32,
    pub score: u32,
    pub alive: bool,
    #[serde(skip)]
    pub dodged: HashSet<u32>,
}

impl Bird {
    pub fn new(id: u32, username: impl Into<String>) -> Self {
        let (x, y) = Self::spawn_position();
        Self {
            id,
            username: username.into(),
            x,
            y,
            dx: 0.0,
            dy: INITIAL_FALL_SPEED,
            gravity: GRAVITY,
            width: BIRD_WIDTH,
            height: BIRD_HEIGHT,
            score: 0,
            alive: true,
            dodged: HashSet::new(),
        }
    }

    fn spawn_position() -> (f32, f32) {
        (
            CANVAS_WIDTH / 2.0 - BIRD_WIDTH / 2.0,
            CANVAS_HEIGHT / 2.0 - BIRD_HEIGHT / 2.0,
        )
    }

    /// Replaces the current vertical velocity with the flap impulse.
    pub fn flap(&mut self) {
        self.dy = FLAP_VELOCITY;
    }

    /// Advances the bird by one tick. Dead birds do not move.
    pub fn update(&mut self) {
        if !self.alive {
            return;
        }

        if self.y < 0.0 {
            self.y = 0.0;
        }

        self.dy += self.gravity;
        self.y += self.dy;

        // Lands on the floor instead of falling through it
        if self.y + self.height > CANVAS_HEIGHT {
            self.y = CANVAS_HEIGHT - self.height;
            self.dy = 0.0;
        }

        if self.y < 0.0 {
            self.y = 0.0;
        }
    }

    /// Puts the bird back at its spawn point for a new run, keeping its identity.
    pub fn reset_state(&mut self) {
        let (x, y) = Self::spawn_position();
        self.x = x;
        self.y = y;
        self.dx = 0.0;
        self.dy = INITIAL_FALL_SPEED;
        self.gravity = GRAVITY;
        self.score = 0;
        self.alive = true;
        self.dodged.clear();
    }

    /// Credits one point for an obstacle group, at most once per group.
    ///
    /// Returns true when the credit was new.
    pub fn credit_dodge(&mut self, group_id: u32) -> bool {
        if !self.alive || !self.dodged.insert(group_id) {
            return false;
        }
        self.score += 1;
        true
    }

    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

/// One half of a scrolling pipe pair. Both halves of a pair share `group_id`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Obstacle {
    pub group_id: u32,
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub width: f32,
    pub height: f32,
    pub is_top: bool,
    pub to_delete: bool,
}

impl Obstacle {
    pub fn new(group_id: u32, x: f32, y: f32, width: f32, height: f32, is_top: bool) -> Self {
        Self {
            group_id,
            x,
            y,
            dx: OBSTACLE_SPEED,
            width,
            height,
            is_top,
            to_delete: false,
        }
    }

    /// Builds the top and bottom halves of a pair at the right edge of the canvas.
    ///
    /// `top_fraction` is the share of the canvas height taken by the top pipe;
    /// the bottom pipe starts `GAP_FRACTION` of the height below it.
    pub fn pair(group_id: u32, top_fraction: f32) -> [Obstacle; 2] {
        let top_height = top_fraction * CANVAS_HEIGHT;
        let bottom_y = top_height + GAP_FRACTION * CANVAS_HEIGHT;
        let bottom_height = (1.0 - top_fraction - GAP_FRACTION) * CANVAS_HEIGHT;

        [
            Obstacle::new(group_id, CANVAS_WIDTH, 0.0, OBSTACLE_WIDTH, top_height, true),
            Obstacle::new(
                group_id,
                CANVAS_WIDTH,
                bottom_y,
                OBSTACLE_WIDTH,
                bottom_height,
                false,
            ),
        ]
    }

    /// Drifts left by `dx`; flags the obstacle once it is fully off-screen.
    pub fn update(&mut self) {
        self.x -= self.dx;

        if self.right_edge() <= 0.0 {
            self.to_delete = true;
        }
    }

    pub fn right_edge(&self) -> f32 {
        self.x + self.width
    }

    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// True once the obstacle's right edge is strictly left of the bird.
    pub fn is_passed_by(&self, bird: &Bird) -> bool {
        self.right_edge() < bird.x
    }
}

/// Axis-aligned overlap test. Touching edges do not collide.
pub fn check_collision(bird: &Bird, obstacle: &Obstacle) -> bool {
    let (x1, y1, x2, y2) = bird.get_bounds();
    let (x3, y3, x4, y4) = obstacle.get_bounds();

    x2 > x3 && x1 < x4 && y2 > y3 && y1 < y4
}
