//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes on the wire were wrong: bad
//! JSON, the wrong shape, or a command without the payload it needs.
//! None of them are fatal to a connection.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing required fields,
    /// wrong data types, or a truncated line.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The action requires a payload but the envelope carried none.
    #[error("action {0} requires a payload")]
    MissingPayload(String),

    /// The message decoded but violates protocol rules, e.g. a relay
    /// datagram with more than one key or an empty datagram.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
