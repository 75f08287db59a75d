//! Transport layer for lobbyrelay.
//!
//! Two transports sit under the server:
//!
//! - the **control channel**: connection-oriented, newline-framed TCP
//!   ([`TcpLineTransport`] / [`LineConnection`]), abstracted by the
//!   [`Transport`] and [`Connection`] traits;
//! - the **relay**: connectionless UDP ([`UdpRelay`]), used both to receive
//!   gameplay datagrams and, through the [`DatagramSender`] seam, to push
//!   fan-out deliveries to players.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;
mod udp;

pub use error::TransportError;
pub use tcp::{LineConnection, TcpLineTransport, MAX_LINE_BYTES};
pub use udp::{UdpRelay, RELAY_BUFFER_SIZE};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops accepting new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that exchanges whole messages with its peer.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one message to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> SocketAddr;
}

/// Where a relay datagram should go: a host (IP literal or name) and a
/// UDP port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayEndpoint {
    pub host: String,
    pub port: u16,
}

impl RelayEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Outbound half of the relay: sends one datagram to one endpoint.
///
/// The registry fans out through this trait, so tests can substitute a
/// recording sender for the real socket. The returned future is `Send`
/// because fan-out runs inside spawned connection tasks.
pub trait DatagramSender: Send + Sync + 'static {
    /// Sends `data` as a single datagram. No acknowledgment, no retry.
    fn send_datagram(
        &self,
        target: &RelayEndpoint,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
