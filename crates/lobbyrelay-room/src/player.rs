//! Registered players.

use std::net::{IpAddr, SocketAddr};

use lobbyrelay_protocol::PlayerId;
use lobbyrelay_transport::RelayEndpoint;
use serde::Serialize;

/// A registered player: who they are and where the relay reaches them.
///
/// The identifier is fixed at first registration. Address and relay port
/// change only through [`RoomState::register`](crate::RoomState::register).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    id: PlayerId,
    address: String,
    relay_port: u16,
    /// Control-channel port; unused and always zero.
    control_port: u16,
}

impl Player {
    pub fn new(id: PlayerId, address: impl Into<String>, relay_port: u16) -> Self {
        Self {
            id,
            address: address.into(),
            relay_port,
            control_port: 0,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// The address as registered, possibly with a `:port` suffix.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn relay_port(&self) -> u16 {
        self.relay_port
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    /// The registered address with any port suffix removed.
    pub fn host(&self) -> String {
        host_of(&self.address)
    }

    /// Where relay deliveries for this player are sent.
    pub fn relay_endpoint(&self) -> RelayEndpoint {
        RelayEndpoint::new(self.host(), self.relay_port)
    }

    pub(crate) fn update_endpoint(&mut self, address: &str, relay_port: u16) {
        self.address = address.to_string();
        self.relay_port = relay_port;
    }
}

/// Strips a port from `10.0.0.5:0`, `[::1]:7`, or `host.example:80`.
/// Bare IPs (including IPv6) and bare hostnames pass through.
fn host_of(address: &str) -> String {
    if let Ok(sock) = address.parse::<SocketAddr>() {
        return sock.ip().to_string();
    }
    if address.parse::<IpAddr>().is_ok() {
        return address.to_string();
    }
    if let Some(inner) = address
        .strip_prefix('[')
        .and_then(|rest| rest.split(']').next())
    {
        return inner.to_string();
    }
    match address.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host.to_string(),
        _ => address.to_string(),
    }
}
