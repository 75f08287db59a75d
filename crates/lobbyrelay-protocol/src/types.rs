//! Core protocol types for lobbyrelay's two wire formats.
//!
//! The control channel carries one [`Envelope`] per line. Its `payload` is
//! a JSON document *inside a string*, so the envelope can be decoded
//! before we know which payload shape the action expects.
//!
//! The relay carries opaque datagrams inbound and [`RelayDatagram`]s
//! outbound.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a registered player.
///
/// Newtype over a v4 UUID so a `RoomId` can never be passed where a
/// `PlayerId` is expected. `#[serde(transparent)]` keeps the wire form a
/// plain UUID string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Mints a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints the bare UUID: this is the form clients see in
/// `registered player <id>` and as the key of relay datagrams.
impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A unique identifier for a room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Mints a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Channel: which transport a message arrived on
// ---------------------------------------------------------------------------

/// The transport a message travelled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// The connection-oriented, line-framed control channel.
    Control,
    /// The connectionless, best-effort relay.
    Relay,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Relay => write!(f, "relay"),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope: the control-channel wire format
// ---------------------------------------------------------------------------

/// One control-channel message:
/// `{"action": "...", "ident": "...", "payload": "<json text>"}`.
///
/// `ident` is an opaque client tag. The server only logs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Envelope {
    /// Returns the parsed action.
    pub fn action(&self) -> Action {
        Action::parse(&self.action)
    }

    /// Decodes the inner payload into the shape the action expects.
    ///
    /// # Errors
    /// - [`ProtocolError::MissingPayload`] if the payload is absent or blank
    /// - [`ProtocolError::Decode`] if it doesn't match `T`
    pub fn decode_payload<C: Codec, T: DeserializeOwned>(
        &self,
        codec: &C,
    ) -> Result<T, ProtocolError> {
        match self.payload.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => codec.decode(text.as_bytes()),
            _ => Err(ProtocolError::MissingPayload(self.action.clone())),
        }
    }
}

/// The actions understood on the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Register,
    Join,
    Autojoin,
    Send,
    SendTo,
    /// Reserved: answered with "not implemented".
    GetRooms,
    /// Reserved: answered with "not implemented".
    Create,
    /// Reserved: answered with "not implemented".
    Leave,
    /// Anything else; carries the raw action string.
    Unknown(String),
}

impl Action {
    /// Maps a wire action string onto an [`Action`]. Never fails.
    pub fn parse(action: &str) -> Self {
        match action {
            "register" => Self::Register,
            "join" => Self::Join,
            "autojoin" => Self::Autojoin,
            "send" => Self::Send,
            "send_to" => Self::SendTo,
            "get_rooms" => Self::GetRooms,
            "create" => Self::Create,
            "leave" => Self::Leave,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire spelling of this action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Register => "register",
            Self::Join => "join",
            Self::Autojoin => "autojoin",
            Self::Send => "send",
            Self::SendTo => "send_to",
            Self::GetRooms => "get_rooms",
            Self::Create => "create",
            Self::Leave => "leave",
            Self::Unknown(other) => other,
        }
    }

    /// Returns `true` for actions reserved for a later protocol revision.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::GetRooms | Self::Create | Self::Leave)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `register`: where to reach the player on the relay.
///
/// `address` is the player's host; a trailing `:port` is accepted and
/// ignored for relay delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub address: String,
    pub relay_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlayerId>,
}

/// `join` / `autojoin`: no `rid` means "create a room for me".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub pid: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<RoomId>,
}

/// `send`: fan a message out to every other member of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPayload {
    pub pid: PlayerId,
    pub rid: RoomId,
    pub message: String,
}

/// `send_to`: like [`SendPayload`] but only to the listed members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToPayload {
    pub pid: PlayerId,
    pub rid: RoomId,
    pub recipients: Vec<PlayerId>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Relay datagram
// ---------------------------------------------------------------------------

/// An outbound relay datagram: `{"<sender-id>": "<message>"}`.
///
/// Exactly one key. Serde goes through a `BTreeMap` so the object shape
/// is produced and checked in one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<String, String>",
    try_from = "BTreeMap<String, String>"
)]
pub struct RelayDatagram {
    pub sender: PlayerId,
    pub message: String,
}

impl From<RelayDatagram> for BTreeMap<String, String> {
    fn from(datagram: RelayDatagram) -> Self {
        BTreeMap::from([(datagram.sender.to_string(), datagram.message)])
    }
}

impl TryFrom<BTreeMap<String, String>> for RelayDatagram {
    type Error = ProtocolError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(ProtocolError::InvalidMessage(format!(
                "relay datagram must have exactly one key, got {}",
                map.len()
            )));
        }
        let (key, message) = map.into_iter().next().ok_or_else(|| {
            ProtocolError::InvalidMessage("empty relay datagram".into())
        })?;
        let sender = key.parse().map_err(|e| {
            ProtocolError::InvalidMessage(format!("bad sender id {key}: {e}"))
        })?;
        Ok(Self { sender, message })
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Status tag of a JSON reply object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Fail,
}

/// The JSON object written back when a command fails:
/// `{"status":"fail","data":"<reason>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: ReplyStatus,
    pub data: String,
}

/// What the dispatcher writes back for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A plain text line, e.g. `joined room <rid>`.
    Text(String),
    /// A failure, written as a [`StatusReply`] JSON object.
    Failure(String),
}

impl Reply {
    /// Encodes the reply as one line (without the trailing newline).
    pub fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Text(text) => Ok(text.clone().into_bytes()),
            Self::Failure(reason) => codec.encode(&StatusReply {
                status: ReplyStatus::Fail,
                data: reason.clone(),
            }),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
