//! Generation-tagged timer set for Rebus rooms.
//!
//! Every callback a room schedules (hints, round end, auto-advance, reap)
//! carries the [`Generation`] it was issued for. Moving a room out of a
//! round bumps its generation and cancels the old one in a single call,
//! and any firing that still slips through is recognised as stale by
//! comparing generations, so no bespoke per-timer bookkeeping is needed.
//!
//! # Integration
//!
//! The set sits inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fired = room.timers_mut().next_due() => room.on_timer(fired),
//!     }
//! }
//! ```
//!
//! [`TimerSet::next_due`] pends forever while nothing is scheduled, and is
//! cancel-safe: dropping it mid-sleep leaves every entry in place.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Monotonic epoch a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u64);

impl Generation {
    /// The first generation.
    pub const INITIAL: Self = Self(0);

    /// Returns the generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw counter.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Handle to one scheduled timer, usable with [`TimerSet::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

// ---------------------------------------------------------------------------
// Fired
// ---------------------------------------------------------------------------

/// A timer that has come due, returned by [`TimerSet::next_due`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<K> {
    pub id: TimerId,
    pub kind: K,
    pub generation: Generation,
    /// When the timer was meant to fire.
    pub deadline: Instant,
}

impl<K> Fired<K> {
    /// `true` if the timer was issued for a generation other than `current`.
    pub fn is_stale(&self, current: Generation) -> bool {
        self.generation != current
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Lifetime counters for one timer set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerMetrics {
    pub scheduled: u64,
    pub fired: u64,
    pub cancelled: u64,
}

// ---------------------------------------------------------------------------
// TimerSet
// ---------------------------------------------------------------------------

struct Entry<K> {
    kind: K,
    generation: Generation,
}

/// Per-room set of cancellable scheduled callbacks.
///
/// Entries are ordered by deadline and then by scheduling order, so two
/// timers due at the same instant fire in the order they were scheduled.
pub struct TimerSet<K> {
    entries: BTreeMap<(Instant, TimerId), Entry<K>>,
    next_id: u64,
    metrics: TimerMetrics,
}

impl<K: Clone + fmt::Debug> TimerSet<K> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 0,
            metrics: TimerMetrics::default(),
        }
    }

    /// Schedules `kind` to fire `delay` from now.
    pub fn schedule(
        &mut self,
        kind: K,
        generation: Generation,
        delay: Duration,
    ) -> TimerId {
        self.schedule_at(kind, generation, Instant::now() + delay)
    }

    /// Schedules `kind` to fire at `deadline`.
    pub fn schedule_at(
        &mut self,
        kind: K,
        generation: Generation,
        deadline: Instant,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        trace!(?kind, %generation, "timer scheduled");
        self.entries.insert((deadline, id), Entry { kind, generation });
        self.metrics.scheduled += 1;
        id
    }

    /// Cancels one timer. Returns `false` if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.cancel_where(|tid, _, _| tid == id) == 1
    }

    /// Cancels every timer issued for `generation`. Returns how many were
    /// removed.
    pub fn cancel_generation(&mut self, generation: Generation) -> usize {
        let removed = self.cancel_where(|_, _, g| g == generation);
        if removed > 0 {
            debug!(%generation, removed, "timers cancelled");
        }
        removed
    }

    /// Cancels every timer matching `pred(id, kind, generation)`.
    pub fn cancel_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(TimerId, &K, Generation) -> bool,
    {
        let before = self.entries.len();
        self.entries
            .retain(|(_, id), entry| !pred(*id, &entry.kind, entry.generation));
        let removed = before - self.entries.len();
        self.metrics.cancelled += removed as u64;
        removed
    }

    /// Cancels everything. Used on room teardown.
    pub fn clear(&mut self) -> usize {
        self.cancel_where(|_, _, _| true)
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Waits for the earliest timer and removes it from the set.
    ///
    /// Pends forever while the set is empty.
    pub async fn next_due(&mut self) -> Fired<K> {
        loop {
            let Some(deadline) = self.next_deadline() else {
                std::future::pending::<()>().await;
                continue;
            };
            time::sleep_until(deadline).await;

            if let Some(((deadline, id), entry)) = self.entries.pop_first() {
                self.metrics.fired += 1;
                trace!(kind = ?entry.kind, generation = %entry.generation, "timer fired");
                return Fired {
                    id,
                    kind: entry.kind,
                    generation: entry.generation,
                    deadline,
                };
            }
        }
    }

    /// Kinds and generations of all pending timers, earliest first.
    pub fn pending(&self) -> Vec<(K, Generation)> {
        self.entries
            .values()
            .map(|e| (e.kind.clone(), e.generation))
            .collect()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifetime counters.
    pub fn metrics(&self) -> &TimerMetrics {
        &self.metrics
    }
}

impl<K: Clone + fmt::Debug> Default for TimerSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
