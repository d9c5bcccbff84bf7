//! Thin REST boundary — get/replace a room's durable full state.
//!
//! DESIGN
//! ======
//! Export/import consumers that do not hold a live socket read and write
//! the same tables the snapshot gateway uses, so a REST-driven replace is
//! visible to the next room hydration. These endpoints deliberately bypass
//! the in-memory cache: they serve the durable representation, which may
//! trail a live session by up to one debounce window.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::cache::{Snapshot, StateCache};
use crate::services::session::SessionUser;
use crate::services::{access, session, snapshot};
use crate::state::{AppState, RoomId};

// =============================================================================
// AUTH PLUMBING
// =============================================================================

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the caller or produce the error response directly.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<SessionUser, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err((StatusCode::UNAUTHORIZED, "bearer token required").into_response());
    };
    match session::validate_session(&state.pool, token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((StatusCode::UNAUTHORIZED, "invalid or expired token").into_response()),
        Err(e) => {
            error!(error = %e, "rest: token validation failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// Confirm the room's backing document exists, or produce 404/500.
async fn require_room(state: &AppState, user: &SessionUser, room: RoomId) -> Result<(), Response> {
    match access::can_join(&state.pool, user.id, room).await {
        Ok(true) => Ok(()),
        Ok(false) => Err((StatusCode::NOT_FOUND, "not found").into_response()),
        Err(e) => {
            error!(error = %e, %room, "rest: existence check failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

// =============================================================================
// CANVAS STATE
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CanvasStateBody {
    pub nodes: Vec<Value>,
    pub edges: Vec<Value>,
}

pub async fn get_canvas_state(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let room = RoomId::Canvas(board_id);
    let user = match authenticate(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_room(&state, &user, room).await {
        return resp;
    }

    match snapshot::load(&state.pool, room).await {
        Ok(StateCache::Canvas { nodes, edges }) => Json(CanvasStateBody {
            nodes: nodes.into_values().collect(),
            edges: edges.into_values().collect(),
        })
        .into_response(),
        Ok(StateCache::Note { .. }) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(e) => {
            error!(error = %e, %room, "rest: state load failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn put_canvas_state(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<CanvasStateBody>,
) -> Response {
    let room = RoomId::Canvas(board_id);
    let user = match authenticate(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_room(&state, &user, room).await {
        return resp;
    }

    let missing_id = body
        .nodes
        .iter()
        .chain(body.edges.iter())
        .any(|entity| entity.get("id").and_then(Value::as_str).is_none());
    if missing_id {
        return (StatusCode::BAD_REQUEST, "every node and edge requires a string id").into_response();
    }

    let snap = Snapshot::Canvas { nodes: body.nodes, edges: body.edges };
    match snapshot::persist(&state.pool, room, &snap).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(error = %e, %room, "rest: state replace failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// NOTE CONTENT
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteContentBody {
    pub content: String,
}

pub async fn get_note_content(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let room = RoomId::Note(note_id);
    let user = match authenticate(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_room(&state, &user, room).await {
        return resp;
    }

    match snapshot::load(&state.pool, room).await {
        Ok(StateCache::Note { content }) => Json(NoteContentBody { content }).into_response(),
        Ok(StateCache::Canvas { .. }) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(e) => {
            error!(error = %e, %room, "rest: content load failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn put_note_content(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<NoteContentBody>,
) -> Response {
    let room = RoomId::Note(note_id);
    let user = match authenticate(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_room(&state, &user, room).await {
        return resp;
    }

    let snap = Snapshot::Note { content: body.content };
    match snapshot::persist(&state.pool, room, &snap).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(error = %e, %room, "rest: content replace failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
