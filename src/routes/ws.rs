//! WebSocket handler — connection lifecycle and operation routing.
//!
//! DESIGN
//! ======
//! On upgrade the auth gate validates the token and the access policy
//! checks the room, then the connection enters a `select!` loop:
//! - Inbound client messages → classify and route by `type`
//! - Broadcast messages from room peers → forward to the socket
//!
//! State-mutating messages run apply → broadcast → reschedule inside one
//! registry write-lock critical section, so a `sync` issued right after a
//! mutation always observes it. Ephemeral messages relay without touching
//! the cache or the persister.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → join (hydrates the room if first in)
//! 2. Initial `state` snapshot to the socket, presence announcements
//! 3. Message loop
//! 4. Close/error/protocol end → leave + `user_left`, exactly once

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::ApplyError;
use crate::message::{ClientMessage, OpKind, ServerMessage};
use crate::services::session::SessionUser;
use crate::services::{access, persistence, presence, room, session};
use crate::state::{AppState, CLIENT_CHANNEL_CAPACITY, RoomId};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, RoomId::Note(note_id), &params, ws).await
}

pub async fn handle_ws_canvas(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, RoomId::Canvas(board_id), &params, ws).await
}

/// Validate identity and room access, then hand the socket to [`run_ws`].
/// Admission failures close the upgrade before any room side effect.
async fn upgrade(
    state: AppState,
    room: RoomId,
    params: &HashMap<String, String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.get("token") else {
        return (StatusCode::UNAUTHORIZED, "token required").into_response();
    };

    let user = match session::validate_session(&state.pool, token).await {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ws: token validation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "token validation error").into_response();
        }
    };

    match access::can_join(&state.pool, user.id, room).await {
        Ok(true) => ws.on_upgrade(move |socket| run_ws(socket, state, room, user)),
        Ok(false) => (StatusCode::FORBIDDEN, "room not available").into_response(),
        Err(e) => {
            tracing::error!(error = %e, %room, "ws: access check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "access check error").into_response()
        }
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, room: RoomId, user: SessionUser) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CLIENT_CHANNEL_CAPACITY);

    let (snapshot, online) = match room::join(&state, room, conn_id, user.id, &user.username, tx).await {
        Ok(admitted) => admitted,
        Err(e) => {
            warn!(error = %e, %room, %conn_id, "ws: join aborted");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(%room, %conn_id, user_id = %user.id, "ws: connection joined");

    // Initial full-state snapshot, then presence announcements.
    if send_message(&mut socket, &ServerMessage::State { snapshot, online }).await.is_ok() {
        presence::announce_join(&state, room, conn_id, user.id, &user.username).await;

        loop {
            tokio::select! {
                inbound = socket.recv() => {
                    let Some(Ok(msg)) = inbound else { break };
                    match msg {
                        Message::Text(text) => {
                            process_text(&state, room, conn_id, &user, &text).await;
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                Some(outbound) = rx.recv() => {
                    if send_message(&mut socket, &outbound).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Every exit path funnels here: leave + user_left exactly once.
    if let Some(departed) = room::leave(&state, room, conn_id).await {
        presence::announce_leave(&state, room, departed.user_id, &departed.username, departed.online).await;
    }
    info!(%room, %conn_id, "ws: connection closed");
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), ()> {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize outbound message");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

// =============================================================================
// ROUTING
// =============================================================================

/// Parse one inbound text message and route it. Malformed or unknown
/// messages are logged and dropped; the connection stays open.
pub(crate) async fn process_text(
    state: &AppState,
    room: RoomId,
    conn_id: Uuid,
    user: &SessionUser,
    text: &str,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(%room, %conn_id, error = %e, "ws: dropping malformed message");
            return;
        }
    };
    process_message(state, room, conn_id, user, msg).await;
}

/// Route one parsed message: mutate-and-relay for state-changing types,
/// relay-only for ephemeral types, snapshot resend for `sync`.
pub(crate) async fn process_message(
    state: &AppState,
    room: RoomId,
    conn_id: Uuid,
    user: &SessionUser,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::ContentChange { content } => {
            apply_mutation(state, room, conn_id, user, Mutation::Content(content)).await;
        }
        ClientMessage::Op { op, data } => {
            apply_mutation(state, room, conn_id, user, Mutation::Op(op, data)).await;
        }
        ClientMessage::CursorPosition { position } => {
            let relay = ServerMessage::CursorPosition {
                position,
                user_id: user.id,
                username: user.username.clone(),
            };
            room::broadcast(state, room, &relay, Some(conn_id)).await;
        }
        ClientMessage::Presence { data } => {
            let relay = ServerMessage::Presence {
                data,
                user_id: user.id,
                username: user.username.clone(),
            };
            room::broadcast(state, room, &relay, Some(conn_id)).await;
        }
        ClientMessage::Sync => {
            // In-memory snapshot to the sender only; durable storage untouched.
            let rooms = state.rooms.read().await;
            let Some(room_state) = rooms.get(&room) else {
                return;
            };
            let reply = ServerMessage::State {
                snapshot: room_state.cache.snapshot(),
                online: room_state.connections.len(),
            };
            if let Some(conn) = room_state.connections.get(&conn_id) {
                let _ = conn.tx.try_send(reply);
            }
        }
    }
}

// =============================================================================
// MUTATION PATH
// =============================================================================

enum Mutation {
    Content(String),
    Op(OpKind, Value),
}

/// Apply a state-changing message under one write-lock critical section:
/// cache mutation, exclude-sender broadcast, persistence reschedule. The
/// mutation is visible in the cache before any peer can react to the
/// broadcast.
async fn apply_mutation(
    state: &AppState,
    room: RoomId,
    conn_id: Uuid,
    user: &SessionUser,
    mutation: Mutation,
) {
    let mut rooms = state.rooms.write().await;
    let Some(room_state) = rooms.get_mut(&room) else {
        warn!(%room, %conn_id, "ws: mutation for unknown room dropped");
        return;
    };

    let applied: Result<(), ApplyError> = match &mutation {
        Mutation::Content(content) => room_state.cache.set_content(content),
        Mutation::Op(op, data) => room_state.cache.apply_op(*op, data),
    };
    if let Err(e) = applied {
        warn!(%room, %conn_id, error = %e, "ws: operation rejected");
        return;
    }

    let relay = match mutation {
        Mutation::Content(content) => ServerMessage::ContentChange {
            content,
            user_id: user.id,
            username: user.username.clone(),
        },
        Mutation::Op(op, data) => ServerMessage::Op {
            op,
            data,
            user_id: user.id,
            username: user.username.clone(),
        },
    };
    let mut dead = Vec::new();
    for (peer_id, conn) in &room_state.connections {
        if *peer_id == conn_id {
            continue;
        }
        // Closed or at capacity: the peer cannot accept frames anymore.
        if conn.tx.try_send(relay.clone()).is_err() {
            dead.push(*peer_id);
        }
    }
    room::prune_dead(room_state, room, &dead);

    let snap = room_state.cache.snapshot();
    persistence::schedule(&mut room_state.flush, &state.pool, room, snap);
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
