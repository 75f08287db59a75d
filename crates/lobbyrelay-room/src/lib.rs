//! Player and room registry for lobbyrelay.
//!
//! All shared mutable state of the server lives here.
//!
//! # Key types
//!
//! - [`RoomState`]: the registry: players by ID, rooms by ID, fan-out
//! - [`Room`]: bounded membership list with its own lock
//! - [`Player`]: a registration: identity plus relay endpoint
//! - [`ReportSink`] / [`ReportReceiver`]: bounded conduits to the supervisor
//! - [`RoomConfig`]: room settings (capacity)

mod config;
mod error;
mod player;
pub mod report;
mod room;
mod state;

pub use config::{DEFAULT_ROOM_CAPACITY, RoomConfig};
pub use error::RoomError;
pub use player::Player;
pub use report::{ErrorReport, InboundMessage, ReportReceiver, ReportSink};
pub use room::{Room, RoomInfo};
pub use state::{DeliveryFailure, FanOutReport, RoomState};
