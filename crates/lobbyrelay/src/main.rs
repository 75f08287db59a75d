use std::time::Duration;

use clap::Parser;
use lobbyrelay::{
    DEFAULT_MAX_CONNECTIONS, LobbyError, LobbyServer, ServerConfig, run_supervisor,
};
use lobbyrelay_room::report::DEFAULT_REPORT_CAPACITY;
use lobbyrelay_room::{DEFAULT_ROOM_CAPACITY, RoomConfig};
use tokio::sync::watch;

/// Game lobby over TCP, message relay over UDP.
#[derive(Parser, Debug)]
#[command(name = "lobbyrelay", version, about, long_about = None)]
struct Args {
    /// TCP port of the control channel.
    control_port: u16,

    /// UDP port of the relay.
    relay_port: u16,

    /// Interface to bind both sockets to.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Control connections served at once; further clients wait.
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Close a control connection after this many silent seconds (0 disables).
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,

    /// Capacity of each report conduit.
    #[arg(long, default_value_t = DEFAULT_REPORT_CAPACITY)]
    report_capacity: usize,

    /// Seconds between sweeps removing empty rooms (0 disables).
    #[arg(long, default_value_t = 30)]
    prune_interval_secs: u64,

    /// Maximum players per room.
    #[arg(long, default_value_t = DEFAULT_ROOM_CAPACITY)]
    room_capacity: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            control_port: args.control_port,
            relay_port: args.relay_port,
            max_connections: args.max_connections,
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            report_capacity: args.report_capacity,
            prune_interval: Duration::from_secs(args.prune_interval_secs),
            room: RoomConfig {
                capacity: args.room_capacity,
            },
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<(), LobbyError> {
    init_tracing();

    let config = ServerConfig::from(Args::parse());
    let prune_interval = config.prune_interval;
    let (server, reports) = LobbyServer::builder().config(config).build().await?;

    let (stop, shutdown) = watch::channel(false);
    let supervisor = tokio::spawn(run_supervisor(
        server.registry(),
        reports,
        prune_interval,
        shutdown.clone(),
    ));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                let _ = stop.send(true);
            }
            Err(e) => tracing::error!(error = %e, "cannot listen for interrupt"),
        }
    });

    server.run_until(shutdown).await?;

    if let Err(e) = supervisor.await {
        tracing::error!(error = %e, "supervisor task failed");
    }
    Ok(())
}
