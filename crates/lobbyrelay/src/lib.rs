//! # lobbyrelay
//!
//! In-memory game lobby and message relay.
//!
//! Clients register over a line-oriented TCP control channel, create or
//! join bounded rooms, and exchange gameplay messages through a UDP relay
//! that fans each message out to the other members of a room.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbyrelay::prelude::*;
//!
//! # async fn start() -> Result<(), LobbyError> {
//! let (server, reports) = LobbyServer::builder()
//!     .control_port(7000)
//!     .relay_port(7001)
//!     .build()
//!     .await?;
//!
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! tokio::spawn(run_supervisor(
//!     server.registry(),
//!     reports,
//!     server.config().prune_interval,
//!     shutdown.clone(),
//! ));
//! server.run_until(shutdown).await
//! # }
//! ```

mod error;
mod handler;
mod relay;
mod server;
mod supervisor;

pub use error::LobbyError;
pub use server::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_PRUNE_INTERVAL, LobbyServer,
    LobbyServerBuilder, ServerConfig,
};
pub use supervisor::run_supervisor;

pub mod prelude {
    pub use crate::{LobbyError, LobbyServer, LobbyServerBuilder, ServerConfig, run_supervisor};
    pub use lobbyrelay_protocol::{
        Action, Codec, Envelope, JoinPayload, JsonCodec, PlayerId, RegisterPayload,
        RelayDatagram, Reply, RoomId, SendPayload, SendToPayload,
    };
    pub use lobbyrelay_room::{
        FanOutReport, Player, ReportReceiver, ReportSink, RoomConfig, RoomError, RoomInfo,
        RoomState,
    };
    pub use lobbyrelay_transport::{DatagramSender, RelayEndpoint, UdpRelay};
}
