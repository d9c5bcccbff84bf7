//! Access policy — room admission check.
//!
//! The workspace is shared: any authenticated user may join a room that
//! exists. Finer-grained owner/collaborator permissions belong to the
//! external REST layer; this check only keeps sockets out of rooms whose
//! backing document was never created or has been deleted.

use sqlx::PgPool;
use uuid::Uuid;

use crate::state::RoomId;

/// Whether the given user may join the room.
///
/// # Errors
///
/// Returns a database error if the existence query fails.
pub async fn can_join(pool: &PgPool, _user_id: Uuid, room: RoomId) -> Result<bool, sqlx::Error> {
    let (query, id) = match room {
        RoomId::Note(id) => ("SELECT EXISTS(SELECT 1 FROM notes WHERE id = $1)", id),
        RoomId::Canvas(id) => ("SELECT EXISTS(SELECT 1 FROM canvas_boards WHERE id = $1)", id),
    };
    sqlx::query_scalar(query).bind(id).fetch_one(pool).await
}
