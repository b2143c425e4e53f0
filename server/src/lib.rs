//! # Flappy Rooms Server Library
//!
//! This library provides the authoritative server for a multiplayer
//! obstacle-avoidance game. Players connect over UDP, gather in rooms, and
//! every room runs its own simulation: birds fall under gravity, flap on
//! request, and try to slip through pairs of scrolling obstacles. The server
//! decides every collision and every point; clients only draw what they are
//! told.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Each room owns a `Game` that advances at 60 ticks per second while
//! running and spawns a new obstacle pair every two seconds. Collisions,
//! scoring and the end of a run are all decided here.
//!
//! ### Session Management
//! Handles the complete lifecycle of a session:
//! - Connection with a protocol version check and a display name
//! - Heartbeats and silence timeouts
//! - Disconnection, which also removes the session from its room
//!
//! ### Room Lifecycle
//! Rooms are created on request under a random `room-xxxxxxx` id, accept
//! players until their game starts, and are deleted as soon as the last
//! player leaves.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns every session, room and game. Inbound packets, timeout
//! sweeps and room timer expirations are processed one at a time, so each
//! handler runs to completion before the next begins and no game state is
//! ever locked or shared.
//!
//! ### Deadline Driven Timers
//! Room timers are plain deadlines (`scheduler::RepeatingTimer`). The loop
//! sleeps until the earliest pending deadline across all rooms. A room that
//! falls behind skips the missed periods instead of replaying them.
//!
//! ### Room Scoped Broadcasts
//! Every server event goes only to the members of the room it concerns.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Session ids, addresses, display names, room membership and timeouts.
//!
//! ### Game Module (`game`)
//! The per-room simulation: bird roster, obstacles, tick and spawner timers,
//! collision detection, dodge scoring and game over.
//!
//! ### Room Manager Module (`room_manager`)
//! The registry mapping room ids to games, with join rules and cleanup of
//! empty rooms.
//!
//! ### Session Manager Module (`session_manager`)
//! Protocol termination. Turns one inbound packet into registry operations
//! and the list of packets to send back, without doing any I/O.
//!
//! ### Network Module (`network`)
//! UDP socket, receiver and sender tasks, and the main loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // At most 64 sessions, dropped after 5 seconds of silence
//!     let mut server = Server::new("127.0.0.1:8080", 64, Duration::from_secs(5)).await?;
//!
//!     // Runs until a Shutdown message arrives on server.handle()
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod error;
pub mod game;
pub mod network;
pub mod room_manager;
pub mod scheduler;
pub mod session_manager;
