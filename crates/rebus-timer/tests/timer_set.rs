//! Integration tests for the generation-tagged timer set.
//!
//! Uses paused Tokio time so deadlines resolve as soon as the runtime is
//! idle, keeping the tests instant and deterministic.

use std::time::Duration;

use rebus_timer::{Generation, TimerSet};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Hint1,
    Hint2,
    RoundEnd,
    Reap,
}

fn round_set(generation: Generation) -> TimerSet<Kind> {
    let mut timers = TimerSet::new();
    timers.schedule(Kind::Hint1, generation, Duration::from_secs(15));
    timers.schedule(Kind::Hint2, generation, Duration::from_millis(22_500));
    timers.schedule(Kind::RoundEnd, generation, Duration::from_secs(30));
    timers
}

// =========================================================================
// Ordering
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_next_due_fires_in_deadline_order() {
    let start = Instant::now();
    let mut timers = round_set(Generation::INITIAL);

    let first = timers.next_due().await;
    assert_eq!(first.kind, Kind::Hint1);
    assert_eq!(first.deadline - start, Duration::from_secs(15));

    assert_eq!(timers.next_due().await.kind, Kind::Hint2);
    assert_eq!(timers.next_due().await.kind, Kind::RoundEnd);
    assert!(timers.is_empty());
    assert_eq!(timers.metrics().fired, 3);
}

#[tokio::test(start_paused = true)]
async fn test_equal_deadlines_fire_in_schedule_order() {
    let mut timers = TimerSet::new();
    let at = Instant::now() + Duration::from_secs(1);
    timers.schedule_at(Kind::RoundEnd, Generation::INITIAL, at);
    timers.schedule_at(Kind::Reap, Generation::INITIAL, at);

    assert_eq!(timers.next_due().await.kind, Kind::RoundEnd);
    assert_eq!(timers.next_due().await.kind, Kind::Reap);
}

#[tokio::test(start_paused = true)]
async fn test_empty_set_pends_forever() {
    let mut timers: TimerSet<Kind> = TimerSet::new();
    let result =
        tokio::time::timeout(Duration::from_secs(3600), timers.next_due()).await;
    assert!(result.is_err(), "empty set must never fire");
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_generation_removes_whole_round() {
    let old = Generation::INITIAL;
    let new = old.next();
    let mut timers = round_set(old);
    timers.schedule(Kind::Reap, new, Duration::from_secs(600));

    assert_eq!(timers.cancel_generation(old), 3);
    assert_eq!(timers.len(), 1);

    let fired = timers.next_due().await;
    assert_eq!(fired.kind, Kind::Reap);
    assert!(!fired.is_stale(new));
    assert_eq!(timers.metrics().cancelled, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_single_timer() {
    let mut timers = TimerSet::new();
    let id = timers.schedule(Kind::Reap, Generation::INITIAL, Duration::from_secs(1));
    assert!(timers.cancel(id));
    assert!(!timers.cancel(id), "second cancel is a no-op");
    assert!(timers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_where_by_kind() {
    let mut timers = round_set(Generation::INITIAL);
    let removed =
        timers.cancel_where(|_, kind, _| matches!(kind, Kind::Hint1 | Kind::Hint2));
    assert_eq!(removed, 2);
    assert_eq!(timers.pending(), vec![(Kind::RoundEnd, Generation::INITIAL)]);
}

#[tokio::test(start_paused = true)]
async fn test_clear_empties_set() {
    let mut timers = round_set(Generation::INITIAL);
    assert_eq!(timers.clear(), 3);
    assert!(timers.next_deadline().is_none());
}

// =========================================================================
// Cancel safety inside select!
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_dropped_wait_keeps_entries() {
    let mut timers = round_set(Generation::INITIAL);

    // A command arriving before the first deadline wins the select and
    // drops the next_due future.
    tokio::select! {
        _ = timers.next_due() => panic!("timer should not fire first"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }

    assert_eq!(timers.len(), 3);
    assert_eq!(timers.next_due().await.kind, Kind::Hint1);
}

#[tokio::test(start_paused = true)]
async fn test_fired_from_old_generation_is_stale() {
    let old = Generation::INITIAL;
    let mut timers = TimerSet::new();
    timers.schedule(Kind::RoundEnd, old, Duration::from_secs(5));

    let fired = timers.next_due().await;
    let current = old.next();
    assert!(fired.is_stale(current));
}
