//! Relay receive loop.
//!
//! Inbound datagrams are opaque: their bytes go to the inbound conduit
//! untouched. Outbound delivery is the registry's job (see
//! [`RoomState::send_room`](lobbyrelay_room::RoomState::send_room)).

use lobbyrelay_protocol::Channel;
use lobbyrelay_room::ReportSink;
use lobbyrelay_transport::{RELAY_BUFFER_SIZE, UdpRelay};
use tokio::sync::watch;

use crate::server::shutdown_requested;

/// Receives datagrams until shutdown.
///
/// Empty datagrams and receive errors are reported and skipped; nothing
/// stops the loop except the shutdown signal.
pub(crate) async fn run_relay(
    relay: UdpRelay,
    reports: ReportSink,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let received = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            received = relay.recv_from(&mut buf) => received,
        };

        match received {
            Ok((0, peer)) => {
                tracing::debug!(%peer, "empty relay datagram");
                reports.error(Channel::Relay, Some(peer), "empty datagram");
            }
            Ok((len, peer)) => {
                tracing::debug!(%peer, len, "relay datagram received");
                reports.inbound(Channel::Relay, peer, buf[..len].to_vec());
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay receive failed");
                reports.error(Channel::Relay, None, e.to_string());
            }
        }
    }

    tracing::info!("relay stopped");
}
