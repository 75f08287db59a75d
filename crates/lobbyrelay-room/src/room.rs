//! A room: a bounded membership list behind its own lock.
//!
//! Every check-then-act on membership (capacity check then append,
//! find then remove) happens while holding the room's mutex, so two
//! concurrent joins can never both see the last free slot.

use lobbyrelay_protocol::{PlayerId, RoomId};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{Player, RoomError};

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    /// The room's unique ID.
    pub room_id: RoomId,
    /// Display name, if one was given at creation.
    pub name: Option<String>,
    /// Number of players currently in the room.
    pub player_count: usize,
    /// Maximum players allowed.
    pub capacity: usize,
}

/// A room owned by the registry.
///
/// The registry holds rooms as `Arc<Room>`, so a membership change made
/// through any handle is the change everyone sees.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    name: Option<String>,
    capacity: usize,
    members: Mutex<Vec<PlayerId>>,
}

impl Room {
    /// Creates an empty room. An empty `name` means "no name".
    pub fn new(id: RoomId, name: &str, capacity: usize) -> Self {
        Self {
            id,
            name: (!name.is_empty()).then(|| name.to_string()),
            capacity,
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` once the member count has reached capacity.
    pub async fn is_full(&self) -> bool {
        self.members.lock().await.len() >= self.capacity
    }

    /// Adds a player.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyInRoom`] if the player is already a member
    /// - [`RoomError::RoomFull`] if the room is at capacity
    pub async fn join(&self, player: &Player) -> Result<(), RoomError> {
        let player_id = player.id();
        let mut members = self.members.lock().await;

        if members.contains(&player_id) {
            return Err(RoomError::AlreadyInRoom(player_id, self.id));
        }
        if members.len() >= self.capacity {
            return Err(RoomError::RoomFull(self.id));
        }

        members.push(player_id);
        tracing::info!(
            room_id = %self.id,
            %player_id,
            players = members.len(),
            "player joined"
        );
        Ok(())
    }

    /// Removes a player, returning their ID, or `None` if they were not a
    /// member.
    pub async fn leave(&self, player_id: PlayerId) -> Option<PlayerId> {
        let mut members = self.members.lock().await;
        let index = members.iter().position(|m| *m == player_id)?;
        let removed = members.swap_remove(index);
        tracing::info!(
            room_id = %self.id,
            %player_id,
            players = members.len(),
            "player left"
        );
        Some(removed)
    }

    pub async fn in_room(&self, player_id: PlayerId) -> bool {
        self.members.lock().await.contains(&player_id)
    }

    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    /// A copy of the current membership. Order is not meaningful.
    pub async fn members(&self) -> Vec<PlayerId> {
        self.members.lock().await.clone()
    }

    pub async fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id,
            name: self.name.clone(),
            player_count: self.member_count().await,
            capacity: self.capacity,
        }
    }
}
