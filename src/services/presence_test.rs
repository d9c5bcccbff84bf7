use super::*;
use crate::cache::StateCache;
use crate::message::ServerMessage;
use crate::services::room;
use crate::state::test_helpers;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

async fn recv_msg(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("message receive timed out")
        .expect("channel closed unexpectedly")
}

async fn assert_no_msg(rx: &mut mpsc::Receiver<ServerMessage>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no message"
    );
}

// =============================================================================
// snapshot
// =============================================================================

#[tokio::test]
async fn snapshot_of_unknown_room_is_empty() {
    let state = test_helpers::test_app_state();
    let current = snapshot(&state, RoomId::Note(Uuid::new_v4())).await;
    assert_eq!(current.online, 0);
    assert!(current.users.is_empty());
}

#[tokio::test]
async fn snapshot_counts_exactly_the_open_connections() {
    let state = test_helpers::test_app_state();
    let room = RoomId::Canvas(Uuid::new_v4());
    test_helpers::seed_room(&state, room, StateCache::empty_canvas()).await;

    let (conn_a, _, _rx_a) = test_helpers::attach(&state, room, "alice").await;
    let (_conn_b, _, _rx_b) = test_helpers::attach(&state, room, "bob").await;
    let (_conn_c, _, _rx_c) = test_helpers::attach(&state, room, "carol").await;
    assert_eq!(snapshot(&state, room).await.online, 3);

    room::leave(&state, room, conn_a).await.unwrap();
    let current = snapshot(&state, room).await;
    assert_eq!(current.online, 2);
    assert_eq!(current.users.len(), 2);
    assert!(current.users.iter().all(|u| u.username != "alice"));
}

#[tokio::test]
async fn count_stays_exact_across_join_leave_sequences() {
    let state = test_helpers::test_app_state();
    let room = RoomId::Note(Uuid::new_v4());
    test_helpers::seed_room(&state, room, StateCache::empty_note()).await;

    let mut attached = Vec::new();
    for i in 0..5 {
        let (conn_id, _, rx) = test_helpers::attach(&state, room, &format!("user{i}")).await;
        attached.push((conn_id, rx));
        assert_eq!(snapshot(&state, room).await.online, attached.len());
    }
    for expected_after in (2..=4).rev() {
        let (conn_id, _rx) = attached.pop().unwrap();
        room::leave(&state, room, conn_id).await.unwrap();
        assert_eq!(snapshot(&state, room).await.online, expected_after);
    }
}

// =============================================================================
// announcements
// =============================================================================

#[tokio::test]
async fn announce_join_notifies_peers_and_sends_roster_to_joiner() {
    let state = test_helpers::test_app_state();
    let room = RoomId::Canvas(Uuid::new_v4());
    test_helpers::seed_room(&state, room, StateCache::empty_canvas()).await;
    let (_conn_a, _, mut rx_a) = test_helpers::attach(&state, room, "alice").await;
    let (conn_b, user_b, mut rx_b) = test_helpers::attach(&state, room, "bob").await;

    announce_join(&state, room, conn_b, user_b, "bob").await;

    let ServerMessage::UserJoined { user_id, username, online } = recv_msg(&mut rx_a).await else {
        panic!("expected user_joined for peer");
    };
    assert_eq!(user_id, user_b);
    assert_eq!(username, "bob");
    assert_eq!(online, 2);

    let ServerMessage::UsersOnline { users, online } = recv_msg(&mut rx_b).await else {
        panic!("expected users_online for joiner");
    };
    assert_eq!(online, 2);
    let mut names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["alice", "bob"]);

    // The joiner must not see their own user_joined.
    assert_no_msg(&mut rx_b).await;
}

#[tokio::test]
async fn announce_leave_notifies_remaining() {
    let state = test_helpers::test_app_state();
    let room = RoomId::Note(Uuid::new_v4());
    test_helpers::seed_room(&state, room, StateCache::empty_note()).await;
    let (_conn_a, _, mut rx_a) = test_helpers::attach(&state, room, "alice").await;
    let (conn_b, user_b, _rx_b) = test_helpers::attach(&state, room, "bob").await;

    let departed = room::leave(&state, room, conn_b).await.unwrap();
    announce_leave(&state, room, departed.user_id, &departed.username, departed.online).await;

    let ServerMessage::UserLeft { user_id, online, .. } = recv_msg(&mut rx_a).await else {
        panic!("expected user_left");
    };
    assert_eq!(user_id, user_b);
    assert_eq!(online, 1);
}

#[tokio::test]
async fn announce_leave_on_emptied_room_sends_nothing() {
    let state = test_helpers::test_app_state();
    let room = RoomId::Note(Uuid::new_v4());
    test_helpers::seed_room(&state, room, StateCache::empty_note()).await;
    let (conn_a, _, _rx_a) = test_helpers::attach(&state, room, "alice").await;

    let departed = room::leave(&state, room, conn_a).await.unwrap();
    assert_eq!(departed.online, 0);

    // Room is evicted; the broadcast has nobody to reach and must not panic.
    announce_leave(&state, room, departed.user_id, &departed.username, departed.online).await;
}
