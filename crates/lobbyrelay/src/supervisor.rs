//! The supervisor: the consumer end of the report conduits, and the
//! timer that prunes empty rooms.

use std::sync::Arc;
use std::time::Duration;

use lobbyrelay_room::{ErrorReport, InboundMessage, ReportReceiver, RoomState};
use lobbyrelay_transport::DatagramSender;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

use crate::server::shutdown_requested;

/// Drains both conduits and prunes the registry until shutdown.
///
/// Inbound messages are logged at debug, errors at warn. A zero
/// `prune_interval` disables pruning. Reports still queued when shutdown
/// arrives are logged before returning.
pub async fn run_supervisor<S: DatagramSender>(
    state: Arc<RoomState<S>>,
    mut reports: ReportReceiver,
    prune_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut prune = (!prune_interval.is_zero()).then(|| {
        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::now() + prune_interval,
            prune_interval,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            Some(message) = reports.inbound.recv() => log_inbound(&message),
            Some(error) = reports.errors.recv() => log_error(&error),
            _ = next_tick(&mut prune) => state.prune_rooms().await,
        }
    }

    while let Ok(message) = reports.inbound.try_recv() {
        log_inbound(&message);
    }
    while let Ok(error) = reports.errors.try_recv() {
        log_error(&error);
    }
    if state.reports().dropped() > 0 {
        tracing::warn!(dropped = state.reports().dropped(), "reports were dropped");
    }
    tracing::info!("supervisor stopped");
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_inbound(message: &InboundMessage) {
    tracing::debug!(
        channel = %message.channel,
        peer = %message.peer,
        text = %String::from_utf8_lossy(&message.bytes),
        "inbound"
    );
}

fn log_error(error: &ErrorReport) {
    tracing::warn!(report = %error, "reported error");
}
