//! Error types for the room layer.

use lobbyrelay_protocol::{PlayerId, ProtocolError, RoomId};

/// Errors returned by [`Room`](crate::Room) and
/// [`RoomState`](crate::RoomState) operations.
///
/// These are domain failures: they are sent back to the client and never
/// close its connection.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No player is registered under this identifier.
    #[error("player {0} not registered")]
    PlayerNotFound(PlayerId),

    /// The room does not exist (never created, or pruned).
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The room is at capacity, no more player slots available.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The player is already a member of this room.
    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    /// The player is not a member of this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// A required argument was missing.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A relay datagram could not be encoded.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}
