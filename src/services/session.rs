//! Session validation — the auth gate for websocket and REST access.
//!
//! ARCHITECTURE
//! ============
//! Credential issuance, token minting, and logout live in the external
//! REST layer that owns the `sessions` table; this module only validates
//! bearer tokens and resolves the user identity. Websocket upgrades pass
//! the token as a query parameter, REST calls as an
//! `Authorization: Bearer` header — both funnel into [`validate_session`].

use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Resolved user identity behind a valid session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
}

/// Validate a bearer token and return the associated user, if any.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT u.id, u.username
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SessionUser { id: r.get("id"), username: r.get("username") }))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
