//! Room registry — join/leave lifecycle and room-scoped broadcast.
//!
//! DESIGN
//! ======
//! Rooms are created lazily on first join, hydrated from the snapshot
//! gateway, and removed from the registry when the last connection leaves.
//! The cache is discarded on eviction, not flushed: a pending debounce task
//! owns its own snapshot and keeps running, so eviction never races a
//! durable write.
//!
//! ERROR HANDLING
//! ==============
//! Hydration failure aborts the join before any room side effect; the
//! caller closes the socket. Leave is idempotent — removing an absent
//! connection is a no-op, which lets disconnect cleanup and dead-connection
//! pruning coexist without double notifications.

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{Snapshot, StateCache};
use crate::message::ServerMessage;
use crate::services::snapshot;
use crate::state::{AppState, Connection, RoomId, RoomMap, RoomState, now_ms};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// The same connection handle attempted a second join.
    #[error("connection already joined {0}")]
    AlreadyJoined(RoomId),
    /// Initial snapshot load failed; the room was not created.
    #[error("hydration failed: {0}")]
    Hydration(#[from] sqlx::Error),
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Admit a connection to a room, hydrating the cache from durable storage
/// if the room is not live yet. Returns the snapshot and online count the
/// joiner should receive.
///
/// # Errors
///
/// Returns [`JoinError::Hydration`] if the snapshot load fails (the caller
/// must close the socket) and [`JoinError::AlreadyJoined`] when the
/// connection id is already present.
pub async fn join(
    state: &AppState,
    room: RoomId,
    conn_id: Uuid,
    user_id: Uuid,
    username: &str,
    tx: mpsc::Sender<ServerMessage>,
) -> Result<(Snapshot, usize), JoinError> {
    // Hydrate outside the lock; applied only if the room is not live.
    let hydrated = snapshot::load(&state.pool, room).await?;

    let mut rooms = state.rooms.write().await;
    let connection = Connection { user_id, username: username.to_owned(), tx, joined_at: now_ms() };
    admit(&mut rooms, room, conn_id, connection, hydrated)
}

/// Insert a connection under the registry lock. Split from [`join`] so the
/// admission rules are testable without a database.
pub(crate) fn admit(
    rooms: &mut RoomMap,
    room: RoomId,
    conn_id: Uuid,
    connection: Connection,
    hydrated: StateCache,
) -> Result<(Snapshot, usize), JoinError> {
    let room_state = rooms.entry(room).or_insert_with(|| {
        info!(%room, "room hydrated");
        RoomState::new(hydrated)
    });

    if room_state.connections.contains_key(&conn_id) {
        return Err(JoinError::AlreadyJoined(room));
    }
    room_state.connections.insert(conn_id, connection);

    let snap = room_state.cache.snapshot();
    let online = room_state.connections.len();
    info!(%room, %conn_id, online, "connection joined room");
    Ok((snap, online))
}

/// Departure details returned by [`leave`], consumed by the presence
/// tracker to notify the remaining connections.
#[derive(Debug)]
pub struct Departure {
    pub user_id: Uuid,
    pub username: String,
    /// Connections remaining after removal.
    pub online: usize,
}

/// Remove a connection from a room. Idempotent: absent rooms and absent
/// connections return `None`. Evicts the room when it empties — the cache
/// is dropped without a final flush; any pending debounce timer still
/// fires against the snapshot it captured at scheduling time.
pub async fn leave(state: &AppState, room: RoomId, conn_id: Uuid) -> Option<Departure> {
    let mut rooms = state.rooms.write().await;
    let room_state = rooms.get_mut(&room)?;
    let removed = room_state.connections.remove(&conn_id)?;

    let online = room_state.connections.len();
    info!(%room, %conn_id, online, "connection left room");

    if room_state.connections.is_empty() {
        rooms.remove(&room);
        info!(%room, "room evicted from registry");
    }
    Some(Departure { user_id: removed.user_id, username: removed.username, online })
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Broadcast a message to all connections in a room, optionally excluding
/// one. Sends are bounded and non-blocking: a connection whose channel is
/// closed or has no capacity left is dead — it is pruned and the remaining
/// connections get its `user_left`.
pub async fn broadcast(state: &AppState, room: RoomId, msg: &ServerMessage, exclude: Option<Uuid>) {
    let dead = deliver(state, room, msg, exclude).await;

    for conn_id in dead {
        warn!(%room, %conn_id, "pruning dead connection");
        if let Some(departed) = leave(state, room, conn_id).await {
            let notice = ServerMessage::UserLeft {
                user_id: departed.user_id,
                username: departed.username,
                online: departed.online,
            };
            // Secondary failures surface on the next broadcast.
            let _ = deliver(state, room, &notice, None).await;
        }
    }
}

/// Fan a message out under the read lock. Returns the connection ids whose
/// channels were closed.
async fn deliver(
    state: &AppState,
    room: RoomId,
    msg: &ServerMessage,
    exclude: Option<Uuid>,
) -> Vec<Uuid> {
    let rooms = state.rooms.read().await;
    let Some(room_state) = rooms.get(&room) else {
        return Vec::new();
    };

    let mut dead = Vec::new();
    for (conn_id, conn) in &room_state.connections {
        if exclude == Some(*conn_id) {
            continue;
        }
        // A full channel means the receiver has not drained a whole
        // capacity's worth of frames; treat it like a closed one.
        if conn.tx.try_send(msg.clone()).is_err() {
            dead.push(*conn_id);
        }
    }
    dead
}

/// Prune dead connections from a room whose write lock the caller already
/// holds, notifying the survivors. The mutation path uses this so pruning
/// stays inside its critical section.
pub(crate) fn prune_dead(room_state: &mut RoomState, room: RoomId, dead: &[Uuid]) {
    for conn_id in dead {
        let Some(removed) = room_state.connections.remove(conn_id) else {
            continue;
        };
        warn!(%room, %conn_id, "pruning dead connection");
        let notice = ServerMessage::UserLeft {
            user_id: removed.user_id,
            username: removed.username,
            online: room_state.connections.len(),
        };
        for conn in room_state.connections.values() {
            let _ = conn.tx.try_send(notice.clone());
        }
    }
}

/// Send a message to a single connection in a room, best-effort.
pub async fn send_to(state: &AppState, room: RoomId, conn_id: Uuid, msg: ServerMessage) {
    let rooms = state.rooms.read().await;
    if let Some(conn) = rooms.get(&room).and_then(|rs| rs.connections.get(&conn_id)) {
        let _ = conn.tx.try_send(msg);
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
