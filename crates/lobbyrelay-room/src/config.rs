//! Room configuration.

use serde::{Deserialize, Serialize};

/// Member limit given to rooms when nothing else is configured.
pub const DEFAULT_ROOM_CAPACITY: usize = 10;

/// Configuration applied to every room the registry creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum members per room. Fixed when the room is created.
    pub capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}
