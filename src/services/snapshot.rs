//! Snapshot gateway — durable load/persist of a room's full state.
//!
//! DESIGN
//! ======
//! The only module that exchanges room state with Postgres. `load` hydrates
//! a cache on first join; `persist` durably replaces the room's stored
//! state. Canvas persistence is delete-then-insert inside one transaction,
//! so a concurrent hydration never observes a mixed old/new state. The REST
//! state endpoints go through the same functions, which is what makes a
//! REST-driven replace visible to the next room hydration.
//!
//! A room with no stored rows hydrates to an empty cache: absence is
//! "start empty", not an error.

use std::collections::HashMap;

use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{Snapshot, StateCache};
use crate::state::RoomId;

// =============================================================================
// LOAD
// =============================================================================

/// Load a room's durable snapshot into a fresh cache.
///
/// # Errors
///
/// Returns a database error if the query fails. A missing note row or an
/// empty board is not an error.
pub async fn load(pool: &PgPool, room: RoomId) -> Result<StateCache, sqlx::Error> {
    match room {
        RoomId::Note(note_id) => {
            let row: Option<(String,)> = sqlx::query_as("SELECT content FROM notes WHERE id = $1")
                .bind(note_id)
                .fetch_optional(pool)
                .await?;
            Ok(StateCache::Note { content: row.map_or_else(String::new, |(content,)| content) })
        }
        RoomId::Canvas(board_id) => {
            let nodes = load_entities(pool, "canvas_nodes", board_id).await?;
            let edges = load_entities(pool, "canvas_edges", board_id).await?;
            Ok(StateCache::Canvas { nodes, edges })
        }
    }
}

async fn load_entities(
    pool: &PgPool,
    table: &str,
    board_id: Uuid,
) -> Result<HashMap<String, Value>, sqlx::Error> {
    let rows: Vec<(String, Value)> =
        sqlx::query_as(&format!("SELECT id, data FROM {table} WHERE board_id = $1"))
            .bind(board_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

// =============================================================================
// PERSIST
// =============================================================================

/// Durably replace a room's stored state with the given snapshot.
///
/// # Errors
///
/// Returns a database error if the write fails; nothing is partially
/// written (canvas replacement runs in a single transaction).
pub async fn persist(pool: &PgPool, room: RoomId, snap: &Snapshot) -> Result<(), sqlx::Error> {
    match (room, snap) {
        (RoomId::Note(note_id), Snapshot::Note { content }) => {
            sqlx::query("UPDATE notes SET content = $1, updated_at = now() WHERE id = $2")
                .bind(content)
                .bind(note_id)
                .execute(pool)
                .await?;
            Ok(())
        }
        (RoomId::Canvas(board_id), Snapshot::Canvas { nodes, edges }) => {
            let mut tx = pool.begin().await?;
            replace_entities(&mut tx, "canvas_nodes", board_id, nodes).await?;
            replace_entities(&mut tx, "canvas_edges", board_id, edges).await?;
            tx.commit().await?;
            Ok(())
        }
        _ => {
            // Room kind and snapshot kind are paired by construction.
            warn!(%room, "snapshot kind does not match room kind; write skipped");
            Ok(())
        }
    }
}

async fn replace_entities(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    table: &str,
    board_id: Uuid,
    entities: &[Value],
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("DELETE FROM {table} WHERE board_id = $1"))
        .bind(board_id)
        .execute(tx.as_mut())
        .await?;

    for entity in entities {
        let Some(id) = entity.get("id").and_then(Value::as_str) else {
            warn!(%board_id, table, "entity without string id skipped during persist");
            continue;
        };
        sqlx::query(&format!("INSERT INTO {table} (board_id, id, data) VALUES ($1, $2, $3)"))
            .bind(board_id)
            .bind(id)
            .bind(entity)
            .execute(tx.as_mut())
            .await?;
    }
    Ok(())
}
