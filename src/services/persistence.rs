//! Debounced persister — coalesces mutation bursts into one durable write.
//!
//! DESIGN
//! ======
//! Each room owns a single [`FlushSlot`]. Every state-mutating operation
//! reschedules it while the registry write lock is held: the previous timer
//! task is aborted and a new one is spawned with a snapshot taken after the
//! mutation. Only the final quiet period (600 ms by default) triggers a
//! write, so a burst of K operations produces exactly one durable write
//! containing their cumulative effect. The spawned task owns its snapshot
//! and a pool clone, so a room evicted before the timer fires still
//! persists the state that existed at scheduling time.
//!
//! ERROR HANDLING
//! ==============
//! Write failures are logged and never surface to connected clients; the
//! in-memory cache stays authoritative and the next mutation reschedules a
//! retry. Clients keep collaborating even if durable storage is down.

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::cache::Snapshot;
use crate::services::snapshot;
use crate::state::{AppState, RoomId};

const DEFAULT_FLUSH_DEBOUNCE_MS: u64 = 600;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Quiet period measured from the most recent mutating operation.
pub(crate) fn flush_debounce() -> Duration {
    Duration::from_millis(env_parse("FLUSH_DEBOUNCE_MS", DEFAULT_FLUSH_DEBOUNCE_MS))
}

// =============================================================================
// FLUSH SLOT
// =============================================================================

/// At most one outstanding debounce timer per room. Rescheduling replaces
/// the pending task atomically with respect to the room lock holder, so two
/// mutations can never leave two timers both armed.
#[derive(Debug, Default)]
pub struct FlushSlot {
    pending: Option<JoinHandle<()>>,
}

impl FlushSlot {
    /// Install a new timer task, aborting the previous one if still pending.
    pub fn arm(&mut self, handle: JoinHandle<()>) {
        if let Some(prev) = self.pending.replace(handle) {
            prev.abort();
        }
    }

    /// Abort and clear the pending timer, if any.
    pub fn disarm(&mut self) {
        if let Some(prev) = self.pending.take() {
            prev.abort();
        }
    }

    /// Whether a timer task is installed and has not finished.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

// =============================================================================
// SCHEDULING
// =============================================================================

/// Reschedule the room's durable write. Call with the registry write lock
/// held, after the cache mutation and the broadcast.
pub fn schedule(slot: &mut FlushSlot, pool: &PgPool, room: RoomId, snap: Snapshot) {
    let pool = pool.clone();
    let delay = flush_debounce();
    slot.arm(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match snapshot::persist(&pool, room, &snap).await {
            Ok(()) => debug!(%room, "debounced flush completed"),
            Err(e) => {
                error!(error = %e, %room, "debounced flush failed; in-memory cache remains authoritative");
            }
        }
    }));
}

/// Force an immediate durable write of the room's current state, cancelling
/// any pending timer. No-op for rooms not in the registry.
///
/// # Errors
///
/// Returns a database error if the write fails.
pub async fn flush_now(state: &AppState, room: RoomId) -> Result<(), sqlx::Error> {
    let snap = {
        let mut rooms = state.rooms.write().await;
        let Some(room_state) = rooms.get_mut(&room) else {
            return Ok(());
        };
        room_state.flush.disarm();
        room_state.cache.snapshot()
    };
    snapshot::persist(&state.pool, room, &snap).await
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
