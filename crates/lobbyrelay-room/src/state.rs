//! The registry: every registered player and every live room.
//!
//! # Locking
//!
//! - `players` and `rooms` each sit behind an `RwLock` that guards only
//!   the *shape* of the map (insert, remove, replace).
//! - Each [`Room`] guards its own membership with its own mutex, so
//!   unrelated rooms never wait on each other.
//! - When both are needed the order is always registry map → room.
//! - No lock is held while a datagram is on its way out: fan-out
//!   snapshots membership and endpoints first, releases everything, then
//!   sends.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use lobbyrelay_protocol::{
    Channel, Codec, JsonCodec, PlayerId, RelayDatagram, RoomId,
};
use lobbyrelay_transport::{DatagramSender, RelayEndpoint};
use tokio::sync::RwLock;

use crate::{Player, ReportSink, Room, RoomConfig, RoomError, RoomInfo};

/// One recipient a fan-out could not reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub player_id: PlayerId,
    pub reason: String,
}

/// Outcome of a fan-out. Every recipient was attempted; none was skipped
/// because an earlier one failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: Vec<PlayerId>,
    pub failed: Vec<DeliveryFailure>,
}

impl FanOutReport {
    /// Number of recipients a delivery was attempted for.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    /// Returns `true` if every attempted delivery was handed to the socket.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The player and room registry.
///
/// Build one at startup and share it as `Arc<RoomState<_>>` with every
/// task that needs it. `S` is the relay's outbound half.
pub struct RoomState<S> {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    players: RwLock<HashMap<PlayerId, Player>>,
    config: RoomConfig,
    relay: S,
    reports: ReportSink,
}

impl<S: DatagramSender> RoomState<S> {
    /// Creates an empty registry with the default [`RoomConfig`].
    pub fn new(relay: S, reports: ReportSink) -> Self {
        Self::with_config(relay, reports, RoomConfig::default())
    }

    /// Creates an empty registry.
    pub fn with_config(relay: S, reports: ReportSink, config: RoomConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
            config,
            relay,
            reports,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// The relay used for outbound fan-out.
    pub fn relay(&self) -> &S {
        &self.relay
    }

    /// The report conduits shared with the rest of the server.
    pub fn reports(&self) -> &ReportSink {
        &self.reports
    }

    // -----------------------------------------------------------------
    // Players
    // -----------------------------------------------------------------

    /// Registers a player, or updates an existing registration.
    ///
    /// Resolution, in order:
    /// 1. `id` is given and known → that record's endpoint is updated;
    /// 2. a record with the same `address` exists → it is updated and
    ///    keeps its identifier;
    /// 3. otherwise a record is inserted under `id`, or a fresh ID.
    ///
    /// At most one record holds a given address afterwards: any other
    /// record at `address` is dropped and removed from every room.
    ///
    /// Never fails.
    pub async fn register(
        &self,
        address: &str,
        relay_port: u16,
        id: Option<PlayerId>,
    ) -> Player {
        let (player, evicted) = {
            let mut players = self.players.write().await;

            let existing = id
                .filter(|id| players.contains_key(id))
                .or_else(|| {
                    players
                        .values()
                        .find(|p| p.address() == address)
                        .map(Player::id)
                });
            let player_id = existing.or(id).unwrap_or_default();

            let evicted: Vec<PlayerId> = players
                .values()
                .filter(|p| p.id() != player_id && p.address() == address)
                .map(Player::id)
                .collect();
            for stale in &evicted {
                players.remove(stale);
                tracing::info!(player_id = %stale, address, "dropped duplicate registration");
            }

            let player = match players.get_mut(&player_id) {
                Some(player) => {
                    player.update_endpoint(address, relay_port);
                    tracing::info!(%player_id, address, relay_port, "player re-registered");
                    player.clone()
                }
                None => {
                    let player = Player::new(player_id, address, relay_port);
                    players.insert(player_id, player.clone());
                    tracing::info!(%player_id, address, relay_port, "player registered");
                    player
                }
            };
            (player, evicted)
        };

        if !evicted.is_empty() {
            let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();
            for room in rooms {
                for stale in &evicted {
                    room.leave(*stale).await;
                }
            }
        }

        player
    }

    /// Returns a copy of a player's record.
    pub async fn player(&self, player_id: PlayerId) -> Option<Player> {
        self.players.read().await.get(&player_id).cloned()
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }

    // -----------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------

    /// Creates an empty room with the configured capacity.
    pub async fn create_room(&self, name: &str) -> RoomId {
        let room_id = RoomId::new();
        let room = Arc::new(Room::new(room_id, name, self.config.capacity));
        self.rooms.write().await.insert(room_id, room);
        tracing::info!(%room_id, name, "room created");
        room_id
    }

    /// Adds a registered player to a room.
    ///
    /// With no `room_id` a new unnamed room is created for the player.
    /// The player is seated before the room is published, so a prune
    /// sweep can never see it empty.
    ///
    /// # Errors
    /// - [`RoomError::PlayerNotFound`]: checked first, whatever the room
    /// - [`RoomError::RoomNotFound`]
    /// - [`RoomError::RoomFull`] / [`RoomError::AlreadyInRoom`] from the room
    pub async fn join(
        &self,
        player_id: PlayerId,
        room_id: Option<RoomId>,
    ) -> Result<RoomId, RoomError> {
        let player = self
            .player(player_id)
            .await
            .ok_or(RoomError::PlayerNotFound(player_id))?;

        let Some(room_id) = room_id else {
            let room = Arc::new(Room::new(RoomId::new(), "", self.config.capacity));
            room.join(&player).await?;
            let room_id = room.id();
            self.rooms.write().await.insert(room_id, room);
            tracing::info!(%room_id, "room created");
            return Ok(room_id);
        };

        // Hold the map's read lock across the room join: a concurrent
        // prune needs the write lock and so cannot drop the room under us.
        let rooms = self.rooms.read().await;
        let room = rooms.get(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;
        room.join(&player).await?;
        Ok(room_id)
    }

    /// Removes a player from a room.
    ///
    /// # Errors
    /// - [`RoomError::InvalidArguments`] if either ID is missing
    /// - [`RoomError::PlayerNotFound`] / [`RoomError::RoomNotFound`]
    /// - [`RoomError::NotInRoom`] if the player was not a member
    pub async fn leave(
        &self,
        player_id: Option<PlayerId>,
        room_id: Option<RoomId>,
    ) -> Result<PlayerId, RoomError> {
        let (Some(player_id), Some(room_id)) = (player_id, room_id) else {
            return Err(RoomError::InvalidArguments(
                "leave requires both a player id and a room id".into(),
            ));
        };

        if !self.players.read().await.contains_key(&player_id) {
            return Err(RoomError::PlayerNotFound(player_id));
        }

        let rooms = self.rooms.read().await;
        let room = rooms.get(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;
        room.leave(player_id)
            .await
            .ok_or(RoomError::NotInRoom(player_id, room_id))
    }

    /// Removes every room with no members. Idempotent.
    pub async fn prune_rooms(&self) {
        let mut rooms = self.rooms.write().await;

        let mut empty = Vec::new();
        for (room_id, room) in rooms.iter() {
            if room.member_count().await == 0 {
                empty.push(*room_id);
            }
        }
        for room_id in &empty {
            rooms.remove(room_id);
        }

        if !empty.is_empty() {
            tracing::info!(pruned = empty.len(), remaining = rooms.len(), "pruned empty rooms");
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Current members of a room.
    pub async fn room_members(&self, room_id: RoomId) -> Result<Vec<PlayerId>, RoomError> {
        Ok(self.room(room_id).await?.members().await)
    }

    pub async fn room_info(&self, room_id: RoomId) -> Result<RoomInfo, RoomError> {
        Ok(self.room(room_id).await?.info().await)
    }

    /// Snapshots of every live room, in no particular order.
    pub async fn rooms(&self) -> Vec<RoomInfo> {
        let handles: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(handles.len());
        for room in handles {
            infos.push(room.info().await);
        }
        infos
    }

    async fn room(&self, room_id: RoomId) -> Result<Arc<Room>, RoomError> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::RoomNotFound(room_id))
    }

    // -----------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------

    /// Relays `message` from `sender` to every other member of the room.
    ///
    /// # Errors
    /// [`RoomError::RoomNotFound`] / [`RoomError::NotInRoom`] for the
    /// sender. Delivery failures are not errors: they are collected in
    /// the returned report and surfaced on the error conduit.
    pub async fn send_room(
        &self,
        sender: PlayerId,
        room_id: RoomId,
        message: &str,
    ) -> Result<FanOutReport, RoomError> {
        self.fan_out(sender, room_id, None, message).await
    }

    /// Like [`send_room`](Self::send_room), restricted to `recipients`
    /// that are currently members. Anyone else in `recipients` is skipped.
    pub async fn send_to(
        &self,
        sender: PlayerId,
        room_id: RoomId,
        recipients: &[PlayerId],
        message: &str,
    ) -> Result<FanOutReport, RoomError> {
        self.fan_out(sender, room_id, Some(recipients), message).await
    }

    async fn fan_out(
        &self,
        sender: PlayerId,
        room_id: RoomId,
        only: Option<&[PlayerId]>,
        message: &str,
    ) -> Result<FanOutReport, RoomError> {
        let members = self.room(room_id).await?.members().await;
        if !members.contains(&sender) {
            return Err(RoomError::NotInRoom(sender, room_id));
        }

        let targets: Vec<(PlayerId, Option<RelayEndpoint>)> = {
            let players = self.players.read().await;
            members
                .into_iter()
                .filter(|m| *m != sender)
                .filter(|m| only.is_none_or(|wanted| wanted.contains(m)))
                .map(|m| (m, players.get(&m).map(Player::relay_endpoint)))
                .collect()
        };

        let datagram = JsonCodec.encode(&RelayDatagram {
            sender,
            message: message.to_string(),
        })?;
        let datagram = &datagram;

        let deliveries = targets.iter().map(|(player_id, endpoint)| async move {
            let result = match endpoint {
                Some(endpoint) => self
                    .relay
                    .send_datagram(endpoint, datagram)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("player is not registered".to_string()),
            };
            (*player_id, result)
        });

        let mut report = FanOutReport::default();
        for (player_id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered.push(player_id),
                Err(reason) => {
                    tracing::warn!(%sender, %player_id, %room_id, %reason, "relay delivery failed");
                    self.reports.error(
                        Channel::Relay,
                        None,
                        format!("delivery from {sender} to {player_id} failed: {reason}"),
                    );
                    report.failed.push(DeliveryFailure { player_id, reason });
                }
            }
        }

        tracing::debug!(
            %sender,
            %room_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "fan-out finished"
        );
        Ok(report)
    }
}
