//! Integration tests for the registry using a recording relay.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use lobbyrelay_protocol::{Codec, JsonCodec, PlayerId, RelayDatagram, RoomId};
use lobbyrelay_room::{
    ReportReceiver, RoomConfig, RoomError, RoomState, report,
};
use lobbyrelay_transport::{DatagramSender, RelayEndpoint, TransportError};

// =========================================================================
// Recording relay
// =========================================================================

/// Remembers every datagram instead of sending it. Ports listed in
/// `unreachable` fail as if the socket refused them.
#[derive(Clone, Default)]
struct RecordingRelay {
    sent: Arc<Mutex<Vec<(RelayEndpoint, Vec<u8>)>>>,
    unreachable: Arc<HashSet<u16>>,
}

impl RecordingRelay {
    fn failing_on(ports: &[u16]) -> Self {
        Self {
            sent: Arc::default(),
            unreachable: Arc::new(ports.iter().copied().collect()),
        }
    }

    /// Datagrams delivered to `port`, decoded.
    fn received_on(&self, port: u16) -> Vec<RelayDatagram> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(ep, _)| ep.port == port)
            .map(|(_, bytes)| JsonCodec.decode(bytes).expect("relay datagram"))
            .collect()
    }

    fn total_sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl DatagramSender for RecordingRelay {
    async fn send_datagram(
        &self,
        target: &RelayEndpoint,
        data: &[u8],
    ) -> Result<(), TransportError> {
        if self.unreachable.contains(&target.port) {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "unreachable",
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), data.to_vec()));
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn registry_with(
    relay: RecordingRelay,
    capacity: usize,
) -> (RoomState<RecordingRelay>, ReportReceiver) {
    let (sink, rx) = report::channel(64);
    let state = RoomState::with_config(relay, sink, RoomConfig { capacity });
    (state, rx)
}

fn registry() -> (RoomState<RecordingRelay>, ReportReceiver) {
    registry_with(RecordingRelay::default(), 10)
}

// =========================================================================
// Register
// =========================================================================

#[tokio::test]
async fn test_register_same_address_twice_upserts() {
    let (state, _rx) = registry();

    let first = state.register("10.0.0.5:0", 9001, None).await;
    let second = state.register("10.0.0.5:0", 9002, None).await;

    assert_eq!(first.id(), second.id());
    assert_eq!(state.player_count().await, 1);
    assert_eq!(state.player(first.id()).await.unwrap().relay_port(), 9002);
}

#[tokio::test]
async fn test_register_known_id_updates_endpoint() {
    let (state, _rx) = registry();

    let player = state.register("10.0.0.5", 9001, None).await;
    let moved = state.register("10.0.0.9", 9100, Some(player.id())).await;

    assert_eq!(moved.id(), player.id());
    assert_eq!(moved.address(), "10.0.0.9");
    assert_eq!(state.player_count().await, 1);
}

#[tokio::test]
async fn test_register_known_id_onto_taken_address_keeps_one_record() {
    let (state, _rx) = registry();

    let first = state.register("10.0.0.1", 9001, None).await;
    let second = state.register("10.0.0.2", 9002, None).await;
    let moved = state.register("10.0.0.1", 9003, Some(second.id())).await;

    assert_eq!(moved.id(), second.id());
    assert_eq!(state.player_count().await, 1);
    assert!(state.player(first.id()).await.is_none());

    let again = state.register("10.0.0.1", 9004, None).await;
    assert_eq!(again.id(), second.id());
    assert_eq!(again.relay_port(), 9004);
}

#[tokio::test]
async fn test_register_dropped_duplicate_leaves_its_rooms() {
    let (state, _rx) = registry();

    let first = state.register("10.0.0.1", 9001, None).await;
    let second = state.register("10.0.0.2", 9002, None).await;
    let room = state.join(first.id(), None).await.unwrap();
    state.join(second.id(), Some(room)).await.unwrap();

    state.register("10.0.0.1", 9003, Some(second.id())).await;

    assert_eq!(state.room_members(room).await.unwrap(), vec![second.id()]);
}

#[tokio::test]
async fn test_register_new_explicit_id_is_kept() {
    let (state, _rx) = registry();
    let wanted = PlayerId::new();

    let player = state.register("10.0.0.7", 9001, Some(wanted)).await;
    assert_eq!(player.id(), wanted);
}

#[tokio::test]
async fn test_register_distinct_addresses_are_distinct_players() {
    let (state, _rx) = registry();

    let a = state.register("10.0.0.1", 9001, None).await;
    let b = state.register("10.0.0.2", 9001, None).await;

    assert_ne!(a.id(), b.id());
    assert_eq!(state.player_count().await, 2);
}

// =========================================================================
// Join
// =========================================================================

#[tokio::test]
async fn test_join_unregistered_player_fails_even_for_real_room() {
    let (state, _rx) = registry();
    let room = state.create_room("lobby").await;

    let ghost = PlayerId::new();
    let with_room = state.join(ghost, Some(room)).await;
    let without_room = state.join(ghost, None).await;

    assert!(matches!(with_room, Err(RoomError::PlayerNotFound(p)) if p == ghost));
    assert!(matches!(without_room, Err(RoomError::PlayerNotFound(_))));
    assert_eq!(state.room_count().await, 1, "no room auto-created");
}

#[tokio::test]
async fn test_join_unknown_room_fails() {
    let (state, _rx) = registry();
    let p = state.register("10.0.0.1", 9001, None).await;

    let result = state.join(p.id(), Some(RoomId::new())).await;
    assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
}

#[tokio::test]
async fn test_join_without_room_creates_one_then_fills_to_capacity() {
    let (state, _rx) = registry_with(RecordingRelay::default(), 3);

    let mut players = Vec::new();
    for i in 0..4 {
        players.push(state.register(&format!("10.0.0.{i}"), 9000, None).await);
    }

    let room = state.join(players[0].id(), None).await.unwrap();
    assert_eq!(state.room_count().await, 1);

    state.join(players[1].id(), Some(room)).await.unwrap();
    state.join(players[2].id(), Some(room)).await.unwrap();

    let overflow = state.join(players[3].id(), Some(room)).await;
    assert!(matches!(overflow, Err(RoomError::RoomFull(r)) if r == room));

    let members = state.room_members(room).await.unwrap();
    assert_eq!(members.len(), 3);
    assert!(!members.contains(&players[3].id()));
}

#[tokio::test]
async fn test_join_same_room_twice_is_rejected() {
    let (state, _rx) = registry();
    let p = state.register("10.0.0.1", 9001, None).await;
    let room = state.join(p.id(), None).await.unwrap();

    let again = state.join(p.id(), Some(room)).await;
    assert!(matches!(again, Err(RoomError::AlreadyInRoom(..))));
    assert_eq!(state.room_members(room).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_exceed_capacity() {
    const CAPACITY: usize = 5;
    const CONTENDERS: usize = 40;

    let (state, _rx) = registry_with(RecordingRelay::default(), CAPACITY);
    let state = Arc::new(state);
    let room = state.create_room("contested").await;

    let mut ids = Vec::new();
    for i in 0..CONTENDERS {
        ids.push(state.register(&format!("10.1.0.{i}"), 9000, None).await.id());
    }

    let tasks: Vec<_> = ids
        .into_iter()
        .map(|pid| {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.join(pid, Some(room)).await })
        })
        .collect();

    let mut ok = 0;
    let mut full = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => ok += 1,
            Err(RoomError::RoomFull(_)) => full += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(ok, CAPACITY);
    assert_eq!(full, CONTENDERS - CAPACITY);
    assert_eq!(state.room_members(room).await.unwrap().len(), CAPACITY);
}

// =========================================================================
// Leave
// =========================================================================

#[tokio::test]
async fn test_leave_removes_exactly_one_member() {
    let (state, _rx) = registry();
    let a = state.register("10.0.0.1", 9001, None).await;
    let b = state.register("10.0.0.2", 9001, None).await;
    let room = state.join(a.id(), None).await.unwrap();
    state.join(b.id(), Some(room)).await.unwrap();

    let left = state.leave(Some(a.id()), Some(room)).await.unwrap();

    assert_eq!(left, a.id());
    assert_eq!(state.room_members(room).await.unwrap(), vec![b.id()]);
}

#[tokio::test]
async fn test_leave_non_member_fails_without_mutation() {
    let (state, _rx) = registry();
    let a = state.register("10.0.0.1", 9001, None).await;
    let outsider = state.register("10.0.0.2", 9001, None).await;
    let room = state.join(a.id(), None).await.unwrap();

    let result = state.leave(Some(outsider.id()), Some(room)).await;

    assert!(matches!(result, Err(RoomError::NotInRoom(..))));
    assert_eq!(state.room_members(room).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_leave_argument_and_lookup_errors() {
    let (state, _rx) = registry();
    let a = state.register("10.0.0.1", 9001, None).await;
    let room = state.join(a.id(), None).await.unwrap();

    assert!(matches!(
        state.leave(None, Some(room)).await,
        Err(RoomError::InvalidArguments(_))
    ));
    assert!(matches!(
        state.leave(Some(a.id()), None).await,
        Err(RoomError::InvalidArguments(_))
    ));
    assert!(matches!(
        state.leave(Some(PlayerId::new()), Some(room)).await,
        Err(RoomError::PlayerNotFound(_))
    ));
    assert!(matches!(
        state.leave(Some(a.id()), Some(RoomId::new())).await,
        Err(RoomError::RoomNotFound(_))
    ));
}

#[tokio::test]
async fn test_last_leave_does_not_remove_room() {
    let (state, _rx) = registry();
    let a = state.register("10.0.0.1", 9001, None).await;
    let room = state.join(a.id(), None).await.unwrap();

    state.leave(Some(a.id()), Some(room)).await.unwrap();

    assert_eq!(state.room_count().await, 1);
    assert_eq!(state.room_info(room).await.unwrap().player_count, 0);
}

// =========================================================================
// Prune
// =========================================================================

#[tokio::test]
async fn test_prune_removes_only_empty_rooms_and_is_idempotent() {
    let (state, _rx) = registry();
    let a = state.register("10.0.0.1", 9001, None).await;

    let occupied = state.join(a.id(), None).await.unwrap();
    let empty_one = state.create_room("").await;
    let empty_two = state.create_room("spare").await;
    assert_eq!(state.room_count().await, 3);

    state.prune_rooms().await;
    assert_eq!(state.room_count().await, 1);
    assert!(state.room_info(occupied).await.is_ok());
    assert!(state.room_info(empty_one).await.is_err());
    assert!(state.room_info(empty_two).await.is_err());

    state.prune_rooms().await;
    assert_eq!(state.room_count().await, 1);
    assert_eq!(state.room_members(occupied).await.unwrap(), vec![a.id()]);
}

// =========================================================================
// Fan-out
// =========================================================================

#[tokio::test]
async fn test_send_room_skips_sender() {
    let (state, _rx) = registry();
    let p1 = state.register("10.0.0.5:0", 9001, None).await;
    let p2 = state.register("10.0.0.6", 9002, None).await;
    let p3 = state.register("10.0.0.7", 9003, None).await;
    let room = state.join(p1.id(), None).await.unwrap();
    state.join(p2.id(), Some(room)).await.unwrap();
    state.join(p3.id(), Some(room)).await.unwrap();

    let report = state.send_room(p1.id(), room, "hello").await.unwrap();

    assert_eq!(report.attempted(), 2);
    assert!(report.is_complete());
    assert!(!report.delivered.contains(&p1.id()));

    let relay = state.relay();
    assert!(relay.received_on(9001).is_empty());
    for port in [9002, 9003] {
        let got = relay.received_on(port);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sender, p1.id());
        assert_eq!(got[0].message, "hello");
    }
}

#[tokio::test]
async fn test_send_room_targets_registered_host() {
    let (state, _rx) = registry();
    let p1 = state.register("10.0.0.5:0", 9001, None).await;
    let p2 = state.register("10.0.0.6:4444", 9002, None).await;
    let room = state.join(p1.id(), None).await.unwrap();
    state.join(p2.id(), Some(room)).await.unwrap();

    state.send_room(p1.id(), room, "x").await.unwrap();

    let sent = state.relay().sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, RelayEndpoint::new("10.0.0.6", 9002));
}

#[tokio::test]
async fn test_send_room_requires_membership() {
    let (state, _rx) = registry();
    let p1 = state.register("10.0.0.1", 9001, None).await;
    let outsider = state.register("10.0.0.2", 9002, None).await;
    let room = state.join(p1.id(), None).await.unwrap();

    let not_member = state.send_room(outsider.id(), room, "hi").await;
    let no_room = state.send_room(p1.id(), RoomId::new(), "hi").await;

    assert!(matches!(not_member, Err(RoomError::NotInRoom(..))));
    assert!(matches!(no_room, Err(RoomError::RoomNotFound(_))));
    assert_eq!(state.relay().total_sent(), 0);
}

#[tokio::test]
async fn test_send_room_continues_after_failed_delivery() {
    let (state, mut rx) = registry_with(RecordingRelay::failing_on(&[9002]), 10);
    let p1 = state.register("10.0.0.1", 9001, None).await;
    let p2 = state.register("10.0.0.2", 9002, None).await;
    let p3 = state.register("10.0.0.3", 9003, None).await;
    let p4 = state.register("10.0.0.4", 9004, None).await;
    let room = state.join(p1.id(), None).await.unwrap();
    for p in [&p2, &p3, &p4] {
        state.join(p.id(), Some(room)).await.unwrap();
    }

    let report = state.send_room(p1.id(), room, "go").await.unwrap();

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].player_id, p2.id());
    assert_eq!(state.relay().received_on(9003).len(), 1);
    assert_eq!(state.relay().received_on(9004).len(), 1);

    let surfaced = rx.errors.try_recv().expect("failure reported");
    assert!(surfaced.message.contains(&p2.id().to_string()));
}

#[tokio::test]
async fn test_send_to_delivers_only_to_requested_members() {
    let (state, _rx) = registry();
    let p1 = state.register("10.0.0.1", 9001, None).await;
    let p2 = state.register("10.0.0.2", 9002, None).await;
    let p3 = state.register("10.0.0.3", 9003, None).await;
    let elsewhere = state.register("10.0.0.4", 9004, None).await;
    let room = state.join(p1.id(), None).await.unwrap();
    state.join(p2.id(), Some(room)).await.unwrap();
    state.join(p3.id(), Some(room)).await.unwrap();
    state.join(elsewhere.id(), None).await.unwrap();

    let report = state
        .send_to(p1.id(), room, &[p3.id(), elsewhere.id(), PlayerId::new()], "psst")
        .await
        .unwrap();

    assert_eq!(report.delivered, vec![p3.id()]);
    assert!(state.relay().received_on(9002).is_empty());
    assert!(state.relay().received_on(9004).is_empty());
    assert_eq!(state.relay().received_on(9003)[0].message, "psst");
}

#[tokio::test]
async fn test_send_to_sender_listing_itself_gets_nothing() {
    let (state, _rx) = registry();
    let p1 = state.register("10.0.0.1", 9001, None).await;
    let room = state.join(p1.id(), None).await.unwrap();

    let report = state.send_to(p1.id(), room, &[p1.id()], "echo?").await.unwrap();

    assert_eq!(report.attempted(), 0);
    assert_eq!(state.relay().total_sent(), 0);
}

#[tokio::test]
async fn test_end_to_end_register_join_send() {
    let (state, _rx) = registry();

    let p1 = state.register("10.0.0.5:0", 9001, None).await;
    let p2 = state.register("10.0.0.6:0", 9002, None).await;

    let r1 = state.join(p1.id(), None).await.unwrap();
    assert_eq!(state.join(p2.id(), Some(r1)).await.unwrap(), r1);

    state.send_room(p1.id(), r1, "hello").await.unwrap();

    let sent = state.relay().sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (endpoint, bytes) = &sent[0];
    assert_eq!(endpoint, &RelayEndpoint::new("10.0.0.6", 9002));
    assert_eq!(
        String::from_utf8(bytes.clone()).unwrap(),
        format!(r#"{{"{}":"hello"}}"#, p1.id())
    );
}
