//! Wire protocol — the typed messages exchanged over a collaboration socket.
//!
//! DESIGN
//! ======
//! Every message is a JSON object tagged by `type`. Client messages are the
//! five operations a collaborating editor can send; server messages add the
//! presence notifications and the full-state snapshot delivered on join and
//! on `sync`. Canvas operation payloads stay opaque `serde_json::Value`s:
//! the engine requires a string `id` and nothing else — geometry and node
//! schema validation belong to the REST layer.
//!
//! Malformed or unknown inbound messages fail deserialization; the socket
//! loop logs and drops them without closing the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::Snapshot;

// =============================================================================
// CANVAS OPERATIONS
// =============================================================================

/// Sub-kind of a canvas `op` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    AddNode,
    UpdateNode,
    DeleteNode,
    AddEdge,
    UpdateEdge,
    DeleteEdge,
}

impl OpKind {
    /// Whether this op targets the node map (as opposed to the edge map).
    #[must_use]
    pub fn targets_nodes(self) -> bool {
        matches!(self, Self::AddNode | Self::UpdateNode | Self::DeleteNode)
    }

    /// Whether this op removes an entity.
    #[must_use]
    pub fn is_delete(self) -> bool {
        matches!(self, Self::DeleteNode | Self::DeleteEdge)
    }
}

// =============================================================================
// CLIENT → SERVER
// =============================================================================

/// Inbound message from a collaborating client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the full note content. Note rooms only.
    ContentChange { content: String },
    /// Ephemeral text-cursor position. Never cached, never persisted.
    CursorPosition { position: Value },
    /// Request a resend of the current in-memory snapshot. Sender only.
    Sync,
    /// Canvas mutation. `data` must carry a string `id`.
    Op { op: OpKind, data: Value },
    /// Ephemeral canvas presence (cursor, selection). Arbitrary extra fields.
    Presence {
        #[serde(flatten)]
        data: serde_json::Map<String, Value>,
    },
}

// =============================================================================
// SERVER → CLIENT
// =============================================================================

/// One entry in a `users_online` list.
#[derive(Debug, Clone, Serialize)]
pub struct OnlineUser {
    pub user_id: Uuid,
    pub username: String,
}

/// Outbound message to a collaborating client.
///
/// Relayed messages (`content_change`, `cursor_position`, `op`, `presence`)
/// are stamped with the sender's identity so receivers can attribute them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full snapshot of the room. First message after join and the reply
    /// to `sync`. Canvas rooms carry `nodes`/`edges`, note rooms `content`.
    State {
        #[serde(flatten)]
        snapshot: Snapshot,
        online: usize,
    },
    ContentChange {
        content: String,
        user_id: Uuid,
        username: String,
    },
    CursorPosition {
        position: Value,
        user_id: Uuid,
        username: String,
    },
    Op {
        op: OpKind,
        data: Value,
        user_id: Uuid,
        username: String,
    },
    Presence {
        #[serde(flatten)]
        data: serde_json::Map<String, Value>,
        user_id: Uuid,
        username: String,
    },
    /// A peer joined the room. Sent to every other connection.
    UserJoined {
        user_id: Uuid,
        username: String,
        online: usize,
    },
    /// A peer left the room. Sent to the remaining connections.
    UserLeft {
        user_id: Uuid,
        username: String,
        online: usize,
    },
    /// Current online-user list, delivered to a joining connection.
    UsersOnline {
        users: Vec<OnlineUser>,
        online: usize,
    },
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
