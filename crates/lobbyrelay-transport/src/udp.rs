//! UDP relay socket.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::{DatagramSender, RelayEndpoint, TransportError};

/// Size of the receive buffer; longer datagrams are truncated by the OS.
pub const RELAY_BUFFER_SIZE: usize = 1000;

/// The relay's UDP socket.
///
/// Cheap to clone: the receive loop and the registry's fan-out share the
/// same bound socket, so recipients see deliveries coming from the relay
/// port.
#[derive(Debug, Clone)]
pub struct UdpRelay {
    socket: Arc<UdpSocket>,
}

impl UdpRelay {
    /// Binds the relay socket to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "relay listening");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Returns the local address the socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives one datagram into `buf`.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> Result<(usize, SocketAddr), TransportError> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(TransportError::ReceiveFailed)
    }
}

impl DatagramSender for UdpRelay {
    async fn send_datagram(
        &self,
        target: &RelayEndpoint,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let sent = self
            .socket
            .send_to(data, (target.host.as_str(), target.port))
            .await
            .map_err(TransportError::SendFailed)?;

        if sent != data.len() {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("datagram truncated to {sent} of {} bytes", data.len()),
            )));
        }
        Ok(())
    }
}
