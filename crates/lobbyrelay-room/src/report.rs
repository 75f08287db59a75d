//! Report conduits: how the server surfaces what it receives and what
//! goes wrong to the supervisor.
//!
//! Two bounded `mpsc` channels. Producers (connection handlers, the relay
//! loop, registry fan-out) never wait on the consumer: when a conduit is
//! full the **newest** report is dropped and counted. A stalled supervisor
//! therefore loses reports instead of wedging every connection.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lobbyrelay_protocol::Channel;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Conduit capacity used when nothing else is configured.
pub const DEFAULT_REPORT_CAPACITY: usize = 1024;

/// Raw bytes received on either transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: Channel,
    pub peer: SocketAddr,
    pub bytes: Vec<u8>,
}

/// A failure surfaced to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub channel: Channel,
    pub peer: Option<SocketAddr>,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer {
            Some(peer) => write!(f, "[{} {}] {}", self.channel, peer, self.message),
            None => write!(f, "[{}] {}", self.channel, self.message),
        }
    }
}

/// Producer half of both conduits. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReportSink {
    inbound: mpsc::Sender<InboundMessage>,
    errors: mpsc::Sender<ErrorReport>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half of both conduits, owned by the supervisor.
#[derive(Debug)]
pub struct ReportReceiver {
    pub inbound: mpsc::Receiver<InboundMessage>,
    pub errors: mpsc::Receiver<ErrorReport>,
}

/// Creates both conduits, each holding at most `capacity` reports.
///
/// A capacity of zero is raised to one.
pub fn channel(capacity: usize) -> (ReportSink, ReportReceiver) {
    let capacity = capacity.max(1);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(capacity);
    (
        ReportSink {
            inbound: inbound_tx,
            errors: errors_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        ReportReceiver {
            inbound: inbound_rx,
            errors: errors_rx,
        },
    )
}

impl ReportSink {
    /// Records received bytes. Returns `false` if the report was dropped.
    pub fn inbound(
        &self,
        channel: Channel,
        peer: SocketAddr,
        bytes: Vec<u8>,
    ) -> bool {
        self.offer(
            &self.inbound,
            InboundMessage {
                channel,
                peer,
                bytes,
            },
            "inbound",
        )
    }

    /// Records a failure. Returns `false` if the report was dropped.
    pub fn error(
        &self,
        channel: Channel,
        peer: Option<SocketAddr>,
        message: impl Into<String>,
    ) -> bool {
        self.offer(
            &self.errors,
            ErrorReport {
                channel,
                peer,
                message: message.into(),
            },
            "error",
        )
    }

    /// Total reports dropped on either conduit so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn offer<T>(&self, tx: &mpsc::Sender<T>, report: T, conduit: &str) -> bool {
        match tx.try_send(report) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // First drop, then every power of two.
                if dropped.is_power_of_two() {
                    tracing::warn!(conduit, dropped, "report conduit full, dropping newest");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(conduit, "report conduit closed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_reports_reach_receiver() {
        let (sink, mut rx) = channel(4);

        assert!(sink.inbound(Channel::Control, peer(), b"hi".to_vec()));
        assert!(sink.error(Channel::Relay, None, "boom"));

        let inbound = rx.inbound.recv().await.unwrap();
        assert_eq!(inbound.channel, Channel::Control);
        assert_eq!(inbound.bytes, b"hi");

        let error = rx.errors.recv().await.unwrap();
        assert_eq!(error.message, "boom");
        assert_eq!(error.to_string(), "[relay] boom");
    }

    #[tokio::test]
    async fn test_full_conduit_drops_newest_without_blocking() {
        let (sink, mut rx) = channel(2);

        assert!(sink.error(Channel::Control, None, "first"));
        assert!(sink.error(Channel::Control, None, "second"));
        assert!(!sink.error(Channel::Control, None, "third"));
        assert_eq!(sink.dropped(), 1);

        assert_eq!(rx.errors.recv().await.unwrap().message, "first");
        assert_eq!(rx.errors.recv().await.unwrap().message, "second");
        assert!(rx.errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_conduit_counts_as_dropped() {
        let (sink, rx) = channel(2);
        drop(rx);

        assert!(!sink.inbound(Channel::Relay, peer(), vec![1]));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let (sink, _rx) = channel(0);
        assert!(sink.error(Channel::Control, None, "fits"));
        assert!(!sink.error(Channel::Control, None, "dropped"));
    }

    #[test]
    fn test_error_report_display_with_peer() {
        let report = ErrorReport {
            channel: Channel::Control,
            peer: Some(peer()),
            message: "bad line".into(),
        };
        assert_eq!(report.to_string(), "[control 127.0.0.1:4000] bad line");
    }
}
