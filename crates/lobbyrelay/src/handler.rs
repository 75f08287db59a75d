//! Per-connection handler: read a line, dispatch it, write the reply.
//!
//! Each accepted control connection gets its own Tokio task running
//! [`handle_connection`]. The flow for every line is:
//!   1. Record the raw bytes on the inbound conduit
//!   2. Decode the envelope, then the payload its action expects
//!   3. Call the registry
//!   4. Write one reply line: plain text on success, a
//!      `{"status":"fail","data":...}` object on failure
//!
//! Only transport failures, the idle deadline and shutdown end the loop.
//! Everything else is answered and the connection stays open.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lobbyrelay_protocol::{
    Action, Channel, Codec, Envelope, JoinPayload, JsonCodec, RegisterPayload,
    Reply, RoomId, SendPayload, SendToPayload,
};
use lobbyrelay_room::{FanOutReport, RoomState};
use lobbyrelay_transport::{Connection, DatagramSender, LineConnection, TransportError};
use tokio::sync::watch;

use crate::LobbyError;
use crate::server::shutdown_requested;

/// Handles a single control connection from accept to close.
pub(crate) async fn handle_connection<S: DatagramSender>(
    conn: LineConnection,
    state: Arc<RoomState<S>>,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), LobbyError> {
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    tracing::debug!(%conn_id, %peer, "handling new connection");

    loop {
        let read = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                tracing::debug!(%conn_id, "closing for shutdown");
                break;
            }
            read = next_line(&conn, idle_timeout) => read,
        };

        let line = match read {
            Some(Ok(Some(line))) => line,
            Some(Ok(None)) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                state
                    .reports()
                    .error(Channel::Control, Some(peer), e.to_string());
                close(&conn).await;
                return Err(e.into());
            }
            None => {
                tracing::info!(%conn_id, %peer, "connection idle, closing");
                break;
            }
        };

        state
            .reports()
            .inbound(Channel::Control, peer, line.clone());

        let reply = dispatch(&state, peer, &line).await;
        if let Err(e) = send_reply(&conn, &reply).await {
            tracing::debug!(%conn_id, error = %e, "reply failed");
            state
                .reports()
                .error(Channel::Control, Some(peer), e.to_string());
            if e.is_fatal() {
                close(&conn).await;
                return Err(e);
            }
        }
    }

    close(&conn).await;
    Ok(())
}

/// Reads the next line. `None` means the idle deadline passed; a zero
/// `idle_timeout` waits forever.
async fn next_line(
    conn: &LineConnection,
    idle_timeout: Duration,
) -> Option<Result<Option<Vec<u8>>, TransportError>> {
    if idle_timeout.is_zero() {
        return Some(conn.recv().await);
    }
    tokio::time::timeout(idle_timeout, conn.recv()).await.ok()
}

async fn send_reply(conn: &LineConnection, reply: &Reply) -> Result<(), LobbyError> {
    let bytes = reply.encode(&JsonCodec)?;
    conn.send(&bytes).await?;
    Ok(())
}

async fn close(conn: &LineConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "close failed");
    }
}

/// Runs one control line against the registry and builds the reply.
///
/// Failures are logged, reported on the error conduit, and turned into a
/// [`Reply::Failure`].
pub(crate) async fn dispatch<S: DatagramSender>(
    state: &RoomState<S>,
    peer: SocketAddr,
    line: &[u8],
) -> Reply {
    match execute(state, line).await {
        Ok(text) => Reply::Text(text),
        Err(e) => {
            tracing::debug!(%peer, error = %e, "command failed");
            state
                .reports()
                .error(Channel::Control, Some(peer), e.to_string());
            Reply::Failure(e.to_string())
        }
    }
}

async fn execute<S: DatagramSender>(
    state: &RoomState<S>,
    line: &[u8],
) -> Result<String, LobbyError> {
    let codec = JsonCodec;
    let envelope: Envelope = codec.decode(line)?;
    let action = envelope.action();
    tracing::debug!(
        %action,
        ident = envelope.ident.as_deref().unwrap_or_default(),
        "dispatching"
    );

    match action {
        Action::Register => {
            let p: RegisterPayload = envelope.decode_payload(&codec)?;
            let player = state.register(&p.address, p.relay_port, p.id).await;
            Ok(format!("registered player {}", player.id()))
        }
        Action::Join | Action::Autojoin => {
            let p: JoinPayload = envelope.decode_payload(&codec)?;
            let room_id = state.join(p.pid, p.rid).await?;
            Ok(format!("joined room {room_id}"))
        }
        Action::Send => {
            let p: SendPayload = envelope.decode_payload(&codec)?;
            let report = state.send_room(p.pid, p.rid, &p.message).await?;
            Ok(sent_summary(&report, p.rid))
        }
        Action::SendTo => {
            let p: SendToPayload = envelope.decode_payload(&codec)?;
            let report = state
                .send_to(p.pid, p.rid, &p.recipients, &p.message)
                .await?;
            Ok(sent_summary(&report, p.rid))
        }
        reserved if reserved.is_reserved() => {
            Err(LobbyError::NotImplemented(reserved.to_string()))
        }
        // Echoed on a line of its own, so control characters are escaped.
        other => Ok(format!(
            "unrecognised action: {}",
            other.as_str().escape_debug()
        )),
    }
}

fn sent_summary(report: &FanOutReport, room_id: RoomId) -> String {
    let mut text = format!(
        "sent to {} players in room {room_id}",
        report.delivered.len()
    );
    if !report.is_complete() {
        text.push_str(&format!(", {} failed", report.failed.len()));
    }
    text
}
