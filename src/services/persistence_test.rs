use super::*;
use crate::cache::StateCache;
use crate::state::test_helpers;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

// =============================================================================
// env_parse / flush_debounce
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__TEST_NONEXISTENT_KEY_98765__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__TEST_FLUSH_EP_VALID__", "250") };
    let val: u64 = env_parse("__TEST_FLUSH_EP_VALID__", 0);
    assert_eq!(val, 250);
    unsafe { std::env::remove_var("__TEST_FLUSH_EP_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__TEST_FLUSH_EP_INVALID__", "soon") };
    let val: u64 = env_parse("__TEST_FLUSH_EP_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__TEST_FLUSH_EP_INVALID__") };
}

#[test]
fn flush_debounce_defaults_to_600ms() {
    unsafe { std::env::remove_var("FLUSH_DEBOUNCE_MS") };
    assert_eq!(flush_debounce(), Duration::from_millis(DEFAULT_FLUSH_DEBOUNCE_MS));
}

// =============================================================================
// FlushSlot — single-slot timer semantics
// =============================================================================

fn counting_timer(counter: &Arc<AtomicUsize>, delay_ms: u64) -> JoinHandle<()> {
    let counter = Arc::clone(counter);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn burst_of_rearms_fires_exactly_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut slot = FlushSlot::default();

    // Five mutations inside the quiet period: each reschedule aborts the
    // previous timer.
    for _ in 0..5 {
        slot.arm(counting_timer(&counter, 50));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(!slot.is_armed());
}

#[tokio::test]
async fn spaced_rearms_fire_each() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut slot = FlushSlot::default();

    slot.arm(counting_timer(&counter, 20));
    tokio::time::sleep(Duration::from_millis(80)).await;
    slot.arm(counting_timer(&counter, 20));
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disarm_cancels_pending_timer() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut slot = FlushSlot::default();

    slot.arm(counting_timer(&counter, 30));
    assert!(slot.is_armed());
    slot.disarm();
    assert!(!slot.is_armed());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fresh_slot_is_not_armed() {
    let slot = FlushSlot::default();
    assert!(!slot.is_armed());
}

// =============================================================================
// schedule / flush_now
// =============================================================================

#[tokio::test]
async fn schedule_arms_the_slot() {
    let state = test_helpers::test_app_state();
    let room = RoomId::Note(Uuid::new_v4());
    let mut slot = FlushSlot::default();

    schedule(&mut slot, &state.pool, room, Snapshot::Note { content: "x".into() });
    assert!(slot.is_armed());
    slot.disarm();
}

#[tokio::test]
async fn flush_now_on_unknown_room_is_noop() {
    let state = test_helpers::test_app_state();
    assert!(flush_now(&state, RoomId::Canvas(Uuid::new_v4())).await.is_ok());
}

#[tokio::test]
async fn flush_now_disarms_pending_timer() {
    let state = test_helpers::test_app_state();
    let room = RoomId::Note(Uuid::new_v4());
    test_helpers::seed_room(&state, room, StateCache::empty_note()).await;
    {
        let mut rooms = state.rooms.write().await;
        let room_state = rooms.get_mut(&room).unwrap();
        let snap = room_state.cache.snapshot();
        schedule(&mut room_state.flush, &state.pool, room, snap);
        assert!(room_state.flush.is_armed());
    }

    // The lazy test pool has no live database, so the forced write fails;
    // the pending timer must still be cancelled.
    let result = flush_now(&state, room).await;
    assert!(result.is_err());

    let rooms = state.rooms.read().await;
    assert!(!rooms[&room].flush.is_armed());
}
