//! Integration tests for host and player clients talking over an in-process
//! broker: joining, seats, snapshots, a full night, and failure paths.

use std::time::Duration;

use lupus::prelude::*;
use lupus::protocol::{
    Alignment, Codec, HostBroadcast, HostEnvelope, JsonCodec, PlayerMessage, RejectReason,
    Rejection, RequestId, SeatAction, SeatRejectReason, SeerResult,
};
use lupus::room::RoomError;
use lupus::transport::{Broker, Link, Topic};
use tokio::sync::broadcast;

// =========================================================================
// Helpers
// =========================================================================

const ROOM: &str = "4821";

fn uid(n: u32) -> Uid {
    Uid::new(format!("p{n}"))
}

fn host_uid() -> Uid {
    Uid::new("host")
}

/// Lets every task run until the table is quiet.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn start_host(broker: &MemoryBroker, template: Vec<RoleId>) -> HostClient {
    HostClient::initialize_as_host(
        broker,
        RoomCode::new(ROOM),
        host_uid(),
        template,
        ClientConfig::default(),
    )
    .await
    .unwrap()
}

/// Joins player `n` and waits for its first snapshot.
async fn join(broker: &MemoryBroker, n: u32) -> PlayerClient {
    let player = PlayerClient::join_as_player(broker, RoomCode::new(ROOM), uid(n), ClientConfig::default())
        .await
        .unwrap();
    player.request_snapshot(None).await.unwrap();
    player
}

/// A host plus one seated player per template role, player `n` in seat `n - 1`.
async fn seated_table(broker: &MemoryBroker, template: Vec<RoleId>) -> (HostClient, Vec<PlayerClient>) {
    let seats = template.len() as u32;
    let host = start_host(broker, template).await;
    let mut players = Vec::new();
    for n in 1..=seats {
        let player = join(broker, n).await;
        player
            .take_seat(Seat(n - 1), Some(format!("Player {n}")), None)
            .await
            .unwrap();
        players.push(player);
    }
    settle().await;
    (host, players)
}

async fn role_of(player: &PlayerClient) -> RoleId {
    player.view().await.unwrap().role().expect("role dealt")
}

/// The player holding `role`.
async fn holder<'a>(players: &'a [PlayerClient], role: RoleId) -> &'a PlayerClient {
    for player in players {
        if role_of(player).await == role {
            return player;
        }
    }
    panic!("nobody holds {role}");
}

async fn seat_of(player: &PlayerClient) -> Seat {
    player.view().await.unwrap().my_seat.expect("seated")
}

async fn status(host: &HostClient) -> RoomStatus {
    host.view().await.unwrap().state.expect("state").status
}

fn drain(rx: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =========================================================================
// Joining and snapshots
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_initialize_as_host_publishes_first_revision() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Seer, RoleId::Villager]).await;

    let view = host.view().await.unwrap();
    assert_eq!(view.revision, Some(1));
    let state = view.state.unwrap();
    assert_eq!(state.host_uid, host_uid());
    assert_eq!(state.status, RoomStatus::Unseated);
    assert_eq!(state.players.len(), 3);
    assert_eq!(host.status(), ConnectionStatus::Live);
}

#[tokio::test(start_paused = true)]
async fn test_join_as_player_snapshot_goes_live() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager, RoleId::Villager]).await;

    let player = join(&broker, 1).await;

    assert_eq!(player.status(), ConnectionStatus::Live);
    let view = player.view().await.unwrap();
    assert_eq!(view.revision, Some(1));
    assert_eq!(view.state.unwrap().room_code, RoomCode::new(ROOM));
    assert_eq!(view.my_seat, None);
}

#[tokio::test(start_paused = true)]
async fn test_join_as_player_subscribe_stalled_times_out() {
    let broker = MemoryBroker::new();
    broker.stall_subscriptions(true).await;

    let result = PlayerClient::join_as_player(&broker, RoomCode::new(ROOM), uid(1), ClientConfig::default()).await;

    assert!(matches!(
        result,
        Err(LupusError::Transport(lupus::transport::TransportError::SubscribeTimeout { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_request_snapshot_without_host_times_out() {
    let broker = MemoryBroker::new();
    let player = PlayerClient::join_as_player(&broker, RoomCode::new(ROOM), uid(1), ClientConfig::default())
        .await
        .unwrap();

    let result = player.request_snapshot(Some(Duration::from_secs(1))).await;

    assert!(matches!(result, Err(LupusError::Session(SessionError::SnapshotTimeout))));
    assert_eq!(player.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_request_snapshot_newer_request_supersedes_older() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager, RoleId::Villager]).await;
    let player = PlayerClient::join_as_player(&broker, RoomCode::new(ROOM), uid(1), ClientConfig::default())
        .await
        .unwrap();
    broker.mute("p1", true).await;

    let first = tokio::spawn({
        let player = player.clone();
        async move { player.request_snapshot(None).await }
    });
    settle().await;

    broker.mute("p1", false).await;
    player.request_snapshot(None).await.unwrap();

    let first = first.await.unwrap();
    assert!(matches!(first, Err(LupusError::Session(SessionError::Superseded))));
    assert_eq!(player.status(), ConnectionStatus::Live);
}

#[tokio::test(start_paused = true)]
async fn test_request_snapshot_on_host_is_immediate() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;

    host.request_snapshot().await.unwrap();
    assert_eq!(host.status(), ConnectionStatus::Live);
}

// =========================================================================
// Seats
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_take_seat_acked_and_visible_to_everyone() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager, RoleId::Villager]).await;
    let player = join(&broker, 1).await;

    let seat = player.take_seat(Seat(2), Some("Ana".into()), None).await.unwrap();
    settle().await;

    assert_eq!(seat, Seat(2));
    assert_eq!(player.view().await.unwrap().my_seat, Some(Seat(2)));
    let state = host.view().await.unwrap().state.unwrap();
    let occupant = state.players[&Seat(2)].as_ref().unwrap();
    assert_eq!(occupant.uid, uid(1));
    assert_eq!(occupant.display_name, "Ana");
}

#[tokio::test(start_paused = true)]
async fn test_take_seat_taken_seat_rejected() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager, RoleId::Villager]).await;
    let player = join(&broker, 1).await;

    host.take_seat(Seat(0), Some("Host".into()), None).await.unwrap();
    let result = player.take_seat(Seat(0), None, None).await;

    assert!(matches!(
        result,
        Err(LupusError::Session(SessionError::SeatRejected(Some(SeatRejectReason::SeatTaken))))
    ));
    assert_eq!(host.view().await.unwrap().my_seat, Some(Seat(0)));
}

#[tokio::test(start_paused = true)]
async fn test_take_seat_unknown_seat_rejected() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;

    let result = player.take_seat(Seat(9), None, None).await;

    assert!(matches!(
        result,
        Err(LupusError::Session(SessionError::SeatRejected(Some(SeatRejectReason::NoSuchSeat))))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_take_seat_no_ack_times_out() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;
    broker.mute("p1", true).await;

    let result = player.take_seat(Seat(1), None, None).await;

    assert!(matches!(result, Err(LupusError::Session(SessionError::SeatRequestTimeout))));
}

#[tokio::test(start_paused = true)]
async fn test_take_seat_publish_failure_reports_disconnected() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;
    broker.fail_publishes("p1", true).await;

    let result = player.take_seat(Seat(1), None, None).await;

    assert!(matches!(result, Err(LupusError::Session(SessionError::Disconnected))));
}

#[tokio::test(start_paused = true)]
async fn test_leave_seat_frees_the_seat() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;
    player.take_seat(Seat(1), None, None).await.unwrap();

    let left = player.leave_seat().await.unwrap();
    settle().await;

    assert_eq!(left, Seat(1));
    assert_eq!(player.view().await.unwrap().my_seat, None);
    let state = host.view().await.unwrap().state.unwrap();
    assert!(state.players[&Seat(1)].is_none());
}

#[tokio::test(start_paused = true)]
async fn test_leave_seat_when_not_seated_fails() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;

    assert!(matches!(player.leave_seat().await, Err(LupusError::NotSeated)));
    assert!(matches!(player.mark_viewed_role().await, Err(LupusError::NotSeated)));
}

#[tokio::test(start_paused = true)]
async fn test_seat_events_reach_listeners() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let mut events = host.events();
    let player = join(&broker, 1).await;

    player.take_seat(Seat(0), None, None).await.unwrap();
    player.take_seat(Seat(1), None, None).await.unwrap();
    settle().await;

    assert_eq!(
        drain(&mut events),
        vec![
            RoomEvent::PlayerJoined { seat: Seat(0), uid: uid(1) },
            RoomEvent::PlayerLeft { seat: Seat(0) },
            RoomEvent::PlayerJoined { seat: Seat(1), uid: uid(1) },
        ]
    );
}

// =========================================================================
// Dealing and the night
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_assign_roles_each_player_gets_own_card() {
    let broker = MemoryBroker::new();
    let template = vec![RoleId::Wolf, RoleId::Seer, RoleId::Villager];
    let (host, players) = seated_table(&broker, template.clone()).await;
    assert_eq!(status(&host).await, RoomStatus::Seated);

    host.assign_roles().await.unwrap();
    settle().await;

    let mut dealt = Vec::new();
    for player in &players {
        let view = player.view().await.unwrap();
        let card = view.private.role_card.clone().unwrap();
        assert_eq!(Some(card.seat), view.my_seat);
        dealt.push(card.role);
    }
    dealt.sort_by_key(|r| r.to_string());
    let mut expected = template;
    expected.sort_by_key(|r| r.to_string());
    assert_eq!(dealt, expected);

    // The host is not seated and sees no card.
    assert_eq!(host.view().await.unwrap().role(), None);
    assert_eq!(status(&host).await, RoomStatus::Assigned);
}

#[tokio::test(start_paused = true)]
async fn test_host_operations_require_the_right_status() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;

    assert!(matches!(
        host.start_night().await,
        Err(LupusError::Room(RoomError::InvalidState { .. }))
    ));
    assert!(matches!(
        host.assign_roles().await,
        Err(LupusError::Room(RoomError::InvalidState { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_full_night_wolf_kills_and_seer_checks() {
    let broker = MemoryBroker::new();
    let (host, players) = seated_table(&broker, vec![RoleId::Wolf, RoleId::Seer, RoleId::Villager]).await;
    host.assign_roles().await.unwrap();
    settle().await;
    for player in &players {
        player.mark_viewed_role().await.unwrap();
    }
    settle().await;
    assert_eq!(status(&host).await, RoomStatus::Ready);

    let wolf = holder(&players, RoleId::Wolf).await;
    let seer = holder(&players, RoleId::Seer).await;
    let villager = holder(&players, RoleId::Villager).await;
    let (wolf_seat, villager_seat) = (seat_of(wolf).await, seat_of(villager).await);
    let mut events = villager.events();

    host.start_night().await.unwrap();
    settle().await;
    assert_eq!(status(&host).await, RoomStatus::Ongoing);

    wolf.submit_wolf_vote(villager_seat).await.unwrap();
    settle().await;

    seer.submit_action(Some(wolf_seat), None).await.unwrap();
    settle().await;
    let reveal = seer.view().await.unwrap().private.reveals[&RoleId::Seer].clone();
    assert_eq!(
        reveal,
        PrivatePayload::SeerReveal(SeerResult {
            target: wolf_seat,
            alignment: Alignment::Wolf,
        })
    );
    // The night waits for the seer to close the reveal.
    assert_eq!(status(&host).await, RoomStatus::Ongoing);

    seer.ack_reveal().await.unwrap();
    settle().await;

    let state = host.view().await.unwrap().state.unwrap();
    assert_eq!(state.status, RoomStatus::Ended);
    assert_eq!(state.deaths, vec![villager_seat]);
    assert_eq!(
        drain(&mut events),
        vec![
            RoomEvent::RoleTurn {
                role: RoleId::Wolf,
                pending_seats: vec![wolf_seat],
                step_id: Some(StepId::WolfKill),
            },
            RoomEvent::RoleTurn {
                role: RoleId::Seer,
                pending_seats: vec![],
                step_id: Some(StepId::SeerCheck),
            },
            RoomEvent::NightEnded {
                deaths: vec![villager_seat],
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_submit_action_out_of_turn_rejected_privately() {
    let broker = MemoryBroker::new();
    let (host, players) = seated_table(&broker, vec![RoleId::Wolf, RoleId::Seer, RoleId::Villager]).await;
    host.assign_roles().await.unwrap();
    settle().await;
    for player in &players {
        player.mark_viewed_role().await.unwrap();
    }
    settle().await;
    host.start_night().await.unwrap();
    settle().await;

    let seer = holder(&players, RoleId::Seer).await;
    let wolf = holder(&players, RoleId::Wolf).await;
    let wolf_seat = seat_of(wolf).await;
    seer.submit_action(Some(wolf_seat), None).await.unwrap();
    settle().await;

    assert_eq!(
        seer.view().await.unwrap().private.last_rejection,
        Some(Rejection {
            step: Some(StepId::WolfKill),
            reason: RejectReason::NotYourTurn,
        })
    );
    assert_eq!(wolf.view().await.unwrap().private.last_rejection, None);
}

#[tokio::test(start_paused = true)]
async fn test_restart_game_clears_cards_and_keeps_seats() {
    let broker = MemoryBroker::new();
    let (host, players) = seated_table(&broker, vec![RoleId::Wolf, RoleId::Seer, RoleId::Villager]).await;
    host.assign_roles().await.unwrap();
    settle().await;
    let mut events = players[0].events();

    host.restart_game().await.unwrap();
    settle().await;

    assert_eq!(status(&host).await, RoomStatus::Seated);
    for player in &players {
        let view = player.view().await.unwrap();
        assert_eq!(view.role(), None);
        assert!(view.my_seat.is_some());
    }
    assert_eq!(drain(&mut events), vec![RoomEvent::Restarted]);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_restart_mid_night_returns_to_seated() {
    let broker = MemoryBroker::new();
    let (host, players) = seated_table(&broker, vec![RoleId::Wolf, RoleId::Seer, RoleId::Villager]).await;
    host.assign_roles().await.unwrap();
    settle().await;
    for player in &players {
        player.mark_viewed_role().await.unwrap();
    }
    settle().await;
    host.start_night().await.unwrap();
    settle().await;

    host.emergency_restart_and_reshuffle_roles().await.unwrap();
    settle().await;

    assert_eq!(status(&host).await, RoomStatus::Seated);
    let state = players[0].view().await.unwrap().state.unwrap();
    assert_eq!(state.current_step_index, None);
}

#[tokio::test(start_paused = true)]
async fn test_set_audio_playing_is_published() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;

    host.set_audio_playing(true).await.unwrap();
    settle().await;

    let view = player.view().await.unwrap();
    assert!(view.state.unwrap().is_audio_playing);
    assert_eq!(view.revision, Some(2));
}

// =========================================================================
// Host seated at its own table
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_seated_host_receives_own_private_messages() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;
    host.take_seat(Seat(0), Some("Host".into()), None).await.unwrap();
    player.take_seat(Seat(1), None, None).await.unwrap();
    settle().await;

    host.assign_roles().await.unwrap();
    host.mark_viewed_role().await.unwrap();
    player.mark_viewed_role().await.unwrap();
    settle().await;

    let view = host.view().await.unwrap();
    let card = view.private.role_card.unwrap();
    assert_eq!(card.seat, Seat(0));
    assert_eq!(status(&host).await, RoomStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_host_intent_without_role_fails_locally() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    host.take_seat(Seat(0), None, None).await.unwrap();

    assert!(matches!(host.submit_action(None, None).await, Err(LupusError::NoRole)));
}

// =========================================================================
// Forged traffic
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_impersonated_seat_request_ignored_by_host() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let mallory = broker.subscribe(ROOM, "mallory").await.unwrap();

    let forged = PlayerMessage::SeatActionRequest {
        request_id: RequestId::new("forged"),
        action: SeatAction::Sit,
        seat: Seat(0),
        uid: uid(1),
        display_name: None,
        avatar_url: None,
    };
    let bytes = JsonCodec.encode(&forged).unwrap();
    mallory.link.publish(Topic::PlayerMessage, &bytes).await.unwrap();
    settle().await;

    let state = host.view().await.unwrap().state.unwrap();
    assert!(state.players[&Seat(0)].is_none());
}

#[tokio::test(start_paused = true)]
async fn test_host_topic_frame_from_non_host_dropped_by_player() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;
    let mallory = broker.subscribe(ROOM, "mallory").await.unwrap();

    let mut state = player.view().await.unwrap().state.unwrap();
    state.status = RoomStatus::Ended;
    let forged = HostEnvelope::Public(HostBroadcast::StateUpdate { state, revision: 99 });
    let bytes = JsonCodec.encode(&forged).unwrap();
    mallory.link.publish(Topic::HostBroadcast, &bytes).await.unwrap();
    settle().await;

    let view = player.view().await.unwrap();
    assert_eq!(view.revision, Some(1));
    assert_eq!(view.state.unwrap().status, RoomStatus::Unseated);
}

// =========================================================================
// Leaving
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_leave_room_fails_pending_requests_and_stops_client() {
    let broker = MemoryBroker::new();
    let host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;
    broker.mute("p1", true).await;

    let pending = tokio::spawn({
        let player = player.clone();
        async move { player.take_seat(Seat(1), None, None).await }
    });
    settle().await;

    player.leave_room().await.unwrap();

    let pending = pending.await.unwrap();
    assert!(matches!(pending, Err(LupusError::Session(SessionError::Disconnected))));
    assert_eq!(player.status(), ConnectionStatus::Disconnected);
    assert!(matches!(player.view().await, Err(LupusError::Unavailable)));

    settle().await;
    assert_eq!(host.members().await.unwrap(), vec!["host".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_closed_room_marks_player_disconnected() {
    let broker = MemoryBroker::new();
    let _host = start_host(&broker, vec![RoleId::Wolf, RoleId::Villager]).await;
    let player = join(&broker, 1).await;

    broker.close_room(ROOM).await;
    settle().await;

    assert_eq!(player.status(), ConnectionStatus::Disconnected);
}
