//! Presence tracker — online-user accounting and join/leave notifications.
//!
//! DESIGN
//! ======
//! Presence is derived from the registry's live connection set at the time
//! of each computation; nothing is cached across membership changes, so the
//! reported count always equals the number of open connections. A joiner
//! gets the full `users_online` list; its peers get `user_joined`. On leave
//! the remaining connections get `user_left` — when none remain, nothing is
//! sent.

use uuid::Uuid;

use crate::message::{OnlineUser, ServerMessage};
use crate::services::room;
use crate::state::{AppState, RoomId};

/// Point-in-time view of a room's online users.
#[derive(Debug, Clone, Default)]
pub struct PresenceSnapshot {
    pub online: usize,
    pub users: Vec<OnlineUser>,
}

/// Compute the current online list for a room. Empty for unknown rooms.
pub async fn snapshot(state: &AppState, room: RoomId) -> PresenceSnapshot {
    let rooms = state.rooms.read().await;
    let Some(room_state) = rooms.get(&room) else {
        return PresenceSnapshot::default();
    };
    let users: Vec<OnlineUser> = room_state
        .connections
        .values()
        .map(|conn| OnlineUser { user_id: conn.user_id, username: conn.username.clone() })
        .collect();
    PresenceSnapshot { online: users.len(), users }
}

/// Announce a join: `user_joined` to every other connection, the full
/// online list to the joiner.
pub async fn announce_join(
    state: &AppState,
    room: RoomId,
    conn_id: Uuid,
    user_id: Uuid,
    username: &str,
) {
    let current = snapshot(state, room).await;

    let joined = ServerMessage::UserJoined {
        user_id,
        username: username.to_owned(),
        online: current.online,
    };
    room::broadcast(state, room, &joined, Some(conn_id)).await;

    let roster = ServerMessage::UsersOnline { users: current.users, online: current.online };
    room::send_to(state, room, conn_id, roster).await;
}

/// Announce a leave to the remaining connections. `online` is the count
/// after removal; an emptied room has nobody left to notify and the
/// broadcast is a no-op because the room entry is already gone.
pub async fn announce_leave(state: &AppState, room: RoomId, user_id: Uuid, username: &str, online: usize) {
    let left = ServerMessage::UserLeft { user_id, username: username.to_owned(), online };
    room::broadcast(state, room, &left, None).await;
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
