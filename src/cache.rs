//! State cache — the authoritative in-memory state of a live room.
//!
//! DESIGN
//! ======
//! A room is either a note (a single content string) or a canvas (maps of
//! nodes and edges keyed by client-supplied string ids). Operations apply
//! in server-receipt order with last-write-wins semantics; there is no
//! causal ordering or merge. An operation either fully applies or is
//! rejected before any mutation, so the cache is never partially updated.
//!
//! The cache does no I/O. Hydration and persistence go through the
//! snapshot gateway, which exchanges owned [`Snapshot`] values with it.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::message::OpKind;

// =============================================================================
// ERRORS
// =============================================================================

/// Rejection of a single operation. Logged and dropped at the protocol
/// boundary; never fatal to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("op data missing string `id`")]
    MissingId,
    #[error("operation does not apply to this room kind")]
    WrongKind,
}

// =============================================================================
// CACHE
// =============================================================================

/// In-memory mutable state of one room.
#[derive(Debug, Clone)]
pub enum StateCache {
    Note {
        content: String,
    },
    Canvas {
        /// Node payloads keyed by their `id` field.
        nodes: HashMap<String, Value>,
        /// Edge payloads keyed by their `id` field.
        edges: HashMap<String, Value>,
    },
}

impl StateCache {
    #[must_use]
    pub fn empty_note() -> Self {
        Self::Note { content: String::new() }
    }

    #[must_use]
    pub fn empty_canvas() -> Self {
        Self::Canvas { nodes: HashMap::new(), edges: HashMap::new() }
    }

    /// Replace the note content. Rejected on canvas rooms.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::WrongKind`] for canvas rooms.
    pub fn set_content(&mut self, content: &str) -> Result<(), ApplyError> {
        let Self::Note { content: current } = self else {
            return Err(ApplyError::WrongKind);
        };
        content.clone_into(current);
        Ok(())
    }

    /// Apply one canvas operation. Rejected on note rooms and when `data`
    /// carries no string `id`; nothing is mutated on rejection.
    ///
    /// Add and update are both upserts: an `update_node`/`update_edge` for
    /// an unknown id inserts it, so out-of-order client state cannot lose
    /// updates. Deletes of unknown ids are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::WrongKind`] for note rooms and
    /// [`ApplyError::MissingId`] when `data.id` is absent or not a string.
    pub fn apply_op(&mut self, op: OpKind, data: &Value) -> Result<(), ApplyError> {
        let Self::Canvas { nodes, edges } = self else {
            return Err(ApplyError::WrongKind);
        };
        let Some(id) = data.get("id").and_then(Value::as_str) else {
            return Err(ApplyError::MissingId);
        };

        let entities = if op.targets_nodes() { nodes } else { edges };
        if op.is_delete() {
            entities.remove(id);
        } else {
            entities.insert(id.to_owned(), data.clone());
        }
        Ok(())
    }

    /// Consistent point-in-time copy. Feeds joiner hydration, `sync`
    /// replies, and debounced persistence.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        match self {
            Self::Note { content } => Snapshot::Note { content: content.clone() },
            Self::Canvas { nodes, edges } => Snapshot::Canvas {
                nodes: nodes.values().cloned().collect(),
                edges: edges.values().cloned().collect(),
            },
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Owned full-state copy of a room, detached from the live cache.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Note { content: String },
    Canvas { nodes: Vec<Value>, edges: Vec<Value> },
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
