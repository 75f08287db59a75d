//! Unified error type for lobbyrelay.

use lobbyrelay_protocol::ProtocolError;
use lobbyrelay_room::RoomError;
use lobbyrelay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The dispatcher and the server loop deal with this single type instead
/// of importing errors from each sub-crate. The `#[from]` attribute on
/// each variant generates the `From` impls, so `?` converts sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed line or payload).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry error (unknown player or room, full room, membership).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The action is reserved but has no behavior yet.
    #[error("action {0} is not implemented")]
    NotImplemented(String),
}

impl LobbyError {
    /// Returns `true` if the error should end the connection it came from.
    ///
    /// Only transport failures do; everything else is answered with a
    /// failure reply and the connection keeps going.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
