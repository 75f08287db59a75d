//! Wire protocol for lobbyrelay.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`Envelope`], [`Action`], the payload structs,
//!   [`RelayDatagram`], [`Reply`]): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those structures
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (lines and datagrams) and the
//! room registry. It knows nothing about sockets or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope / payload) → Registry (rooms)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Action, Channel, Envelope, JoinPayload, PlayerId, RegisterPayload,
    RelayDatagram, Reply, ReplyStatus, RoomId, SendPayload, SendToPayload,
    StatusReply,
};
