//! `LobbyServer` builder and server loop.
//!
//! This is the entry point for running a lobby. It ties together all the
//! layers: transport → protocol → registry.
//!
//! ```text
//!            ┌──────────── TcpLineTransport ── handler task per connection ──┐
//! clients ───┤                                                               ├─→ RoomState
//!            └──────────── UdpRelay ───────── relay receive loop ────────────┘      │
//!                              ▲                                                    │
//!                              └──────────────── fan-out (send / send_to) ──────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lobbyrelay_protocol::Channel;
use lobbyrelay_room::report::{self, DEFAULT_REPORT_CAPACITY};
use lobbyrelay_room::{ReportReceiver, RoomConfig, RoomState};
use lobbyrelay_transport::{TcpLineTransport, Transport, UdpRelay};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::LobbyError;
use crate::handler::handle_connection;
use crate::relay::run_relay;

/// Control connections served at once when nothing else is configured.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// A control connection silent for this long is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the supervisor prunes empty rooms by default.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(30);

/// Everything needed to start a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface both sockets bind to.
    pub host: String,
    /// TCP port of the control channel. `0` picks a free port.
    pub control_port: u16,
    /// UDP port of the relay. `0` picks a free port.
    pub relay_port: u16,
    /// Admission limit for concurrent control connections.
    pub max_connections: usize,
    /// Read deadline for each control line. Zero means no deadline.
    pub idle_timeout: Duration,
    /// Capacity of each report conduit.
    pub report_capacity: usize,
    /// Interval between prune sweeps. Zero disables pruning.
    pub prune_interval: Duration,
    /// Settings for every room the registry creates.
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            control_port: 0,
            relay_port: 0,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            report_capacity: DEFAULT_REPORT_CAPACITY,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    fn control_addr(&self) -> String {
        join_host_port(&self.host, self.control_port)
    }

    fn relay_addr(&self) -> String {
        join_host_port(&self.host, self.relay_port)
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Builder for configuring and starting a lobby server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn start() -> Result<(), lobbyrelay::LobbyError> {
/// use lobbyrelay::prelude::*;
///
/// let (server, reports) = LobbyServer::builder()
///     .host("127.0.0.1")
///     .control_port(7000)
///     .relay_port(7001)
///     .build()
///     .await?;
/// # drop(reports);
/// server.run().await
/// # }
/// ```
pub struct LobbyServerBuilder {
    config: ServerConfig,
}

impl LobbyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    pub fn control_port(mut self, port: u16) -> Self {
        self.config.control_port = port;
        self
    }

    pub fn relay_port(mut self, port: u16) -> Self {
        self.config.relay_port = port;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn report_capacity(mut self, capacity: usize) -> Self {
        self.config.report_capacity = capacity;
        self
    }

    pub fn prune_interval(mut self, interval: Duration) -> Self {
        self.config.prune_interval = interval;
        self
    }

    pub fn room_capacity(mut self, capacity: usize) -> Self {
        self.config.room.capacity = capacity;
        self
    }

    /// Binds both sockets and builds the registry.
    ///
    /// Returns the server together with the consumer half of the report
    /// conduits; hand it to [`run_supervisor`](crate::run_supervisor).
    pub async fn build(self) -> Result<(LobbyServer, ReportReceiver), LobbyError> {
        let control = TcpLineTransport::bind(&self.config.control_addr()).await?;
        let relay = UdpRelay::bind(&self.config.relay_addr()).await?;

        let (sink, reports) = report::channel(self.config.report_capacity);
        let state = Arc::new(RoomState::with_config(
            relay.clone(),
            sink,
            self.config.room.clone(),
        ));

        let server = LobbyServer {
            config: self.config,
            control,
            relay,
            state,
        };
        Ok((server, reports))
    }
}

impl Default for LobbyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound lobby server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// serving.
pub struct LobbyServer {
    config: ServerConfig,
    control: TcpLineTransport,
    relay: UdpRelay,
    state: Arc<RoomState<UdpRelay>>,
}

impl LobbyServer {
    /// Creates a new builder.
    pub fn builder() -> LobbyServerBuilder {
        LobbyServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Local address of the control channel.
    pub fn control_addr(&self) -> std::io::Result<SocketAddr> {
        self.control.local_addr()
    }

    /// Local address of the relay socket.
    pub fn relay_addr(&self) -> std::io::Result<SocketAddr> {
        self.relay.local_addr()
    }

    /// The shared registry.
    pub fn registry(&self) -> Arc<RoomState<UdpRelay>> {
        Arc::clone(&self.state)
    }

    /// Serves until the process is terminated.
    pub async fn run(self) -> Result<(), LobbyError> {
        let (_keep_open, shutdown) = watch::channel(false);
        self.run_until(shutdown).await
    }

    /// Serves until `shutdown` turns `true`.
    ///
    /// Accepts control connections and spawns a handler task for each,
    /// at most `max_connections` at a time. Runs the relay receive loop
    /// alongside. On shutdown, stops accepting, lets every handler finish
    /// its current command, and waits for all of them.
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) -> Result<(), LobbyError> {
        let LobbyServer {
            config,
            mut control,
            relay,
            state,
        } = self;

        if let (Ok(control_addr), Ok(relay_addr)) = (control.local_addr(), relay.local_addr()) {
            tracing::info!(
                control = %control_addr,
                relay = %relay_addr,
                max_connections = config.max_connections,
                "lobby server running"
            );
        }

        let relay_task = tokio::spawn(run_relay(
            relay,
            state.reports().clone(),
            shutdown.clone(),
        ));

        let admission = Arc::new(Semaphore::new(config.max_connections.max(1)));
        let mut handlers = JoinSet::new();

        loop {
            // Take a slot before accepting so excess clients wait in the
            // kernel backlog rather than in memory.
            let permit = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                permit = Arc::clone(&admission).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                accepted = control.accept() => accepted,
            };

            match accepted {
                Ok(conn) => {
                    let state = Arc::clone(&state);
                    let shutdown = shutdown.clone();
                    let idle_timeout = config.idle_timeout;
                    handlers.spawn(async move {
                        let _permit = permit;
                        handle_connection(conn, state, idle_timeout, shutdown).await
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    state
                        .reports()
                        .error(Channel::Control, None, format!("accept failed: {e}"));
                }
            }

            while let Some(finished) = handlers.try_join_next() {
                log_handler_exit(finished);
            }
        }

        tracing::info!(open = handlers.len(), "shutting down, draining connections");
        while let Some(finished) = handlers.join_next().await {
            log_handler_exit(finished);
        }

        if let Err(e) = relay_task.await {
            tracing::error!(error = %e, "relay task failed");
        }
        control.shutdown().await?;

        tracing::info!("lobby server stopped");
        Ok(())
    }
}

fn log_handler_exit(finished: Result<Result<(), LobbyError>, tokio::task::JoinError>) {
    match finished {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "connection ended with error"),
        Err(e) => tracing::error!(error = %e, "connection task failed"),
    }
}

/// Resolves once `shutdown` reads `true`.
///
/// If every sender is gone nobody can ask for a shutdown any more, so this
/// never resolves.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let signalled = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}
