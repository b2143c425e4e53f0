//! Error types for room and session operations.
//!
//! None of these are fatal. The network layer reports `NotFound` and
//! `AlreadyStarted` back to the requesting session and only logs `NotInRoom`.

/// Why a room operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The referenced room does not exist (or no longer exists)
    #[error("Room {0} not found")]
    NotFound(String),

    /// The room's game is running, so it cannot be joined or started again
    #[error("Game already started")]
    AlreadyStarted(String),

    /// The session is not a member of any room
    #[error("Session {0} is not in a room")]
    NotInRoom(u32),
}
