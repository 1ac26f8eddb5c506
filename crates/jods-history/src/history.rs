// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ring buffer of snapshots, a cursor, throttled append, and time-travel.

use std::cell::Cell;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use jods_diff::{Diff, Value};

use crate::error::HistoryError;

/// One recorded point in history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// The full store snapshot at this point.
    pub snapshot: Value,
    /// When this entry was recorded.
    pub timestamp: Instant,
    /// Diff from the entry immediately before this one; `None` for the
    /// first entry in the ring.
    pub diff_from_prior: Option<Diff>,
}

/// Construction options (spec.md §4.E: `maxEntries` default 50, `throttleMs`
/// default 100, `active` environment-dependent).
#[derive(Debug, Clone, Copy)]
pub struct HistoryOptions {
    /// Maximum ring length before the oldest entry is evicted.
    pub max_entries: usize,
    /// Minimum gap between two immediate appends; writes arriving sooner
    /// coalesce into a single deferred append.
    pub throttle: Duration,
    /// Whether the tracker records at all. `false` makes every method a
    /// no-op except construction and reads of the initial entry.
    pub active: bool,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            max_entries: 50,
            throttle: Duration::from_millis(100),
            active: true,
        }
    }
}

/// Options governing a single `travel_to`/`back`/`forward` call.
///
/// Spec.md §9: the source overwrites known keys on travel but never deletes
/// keys added after the target entry, and it is unclear whether that is
/// intentional. Both behaviors are exposed explicitly rather than one being
/// silently chosen: `strict: false` (the source's behavior) preserves
/// later additions; `strict: true` deletes them so the store becomes
/// byte-identical to the target entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TravelOptions {
    /// See the struct docs.
    pub strict: bool,
}

/// What the caller must write back into the store to complete a travel.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelTarget {
    /// The snapshot to restore.
    pub snapshot: Value,
    /// Whether the caller should delete keys absent from `snapshot`
    /// (`Store::replace_state`) or merge only (`Store::set_state`).
    pub strict: bool,
}

/// Bounded, append-only ring of snapshots with a cursor.
///
/// Knows nothing of `jods-store` — it is handed snapshots by whatever wires
/// it to a store's subscription, and in turn hands back plans the caller
/// applies to the store. This keeps it a plain synchronous value, testable
/// without a store or a clock.
pub struct History {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    max_entries: usize,
    throttle: Duration,
    active: bool,
    last_append: Option<Instant>,
    pending: Option<Value>,
    traveling: Cell<bool>,
}

impl History {
    /// Capture `initial_snapshot` as entry 0, cursor at 0.
    #[must_use]
    pub fn new(initial_snapshot: Value, options: HistoryOptions, now: Instant) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(HistoryEntry {
            snapshot: initial_snapshot,
            timestamp: now,
            diff_from_prior: None,
        });
        Self {
            entries,
            cursor: 0,
            max_entries: options.max_entries.max(1),
            throttle: options.throttle,
            active: options.active,
            last_append: None,
            pending: None,
            traveling: Cell::new(false),
        }
    }

    /// Feed a store notification. A no-op while time-traveling or inactive.
    /// Appends immediately if at least `throttle` has elapsed since the
    /// last append, otherwise coalesces into a single pending append.
    pub fn on_notification(&mut self, snapshot: Value, now: Instant) {
        if !self.active || self.traveling.get() {
            return;
        }
        match self.last_append {
            Some(last) if now.duration_since(last) < self.throttle => {
                self.pending = Some(snapshot);
            }
            _ => {
                self.pending = None;
                self.append(snapshot, now);
            }
        }
    }

    /// Apply a coalesced pending append, if one is outstanding. The caller
    /// (`jods-app`'s lifecycle glue) drives this from a one-shot timer.
    pub fn flush_pending(&mut self, now: Instant) {
        if let Some(snapshot) = self.pending.take() {
            self.append(snapshot, now);
        }
    }

    fn append(&mut self, snapshot: Value, now: Instant) {
        // Branching: discard everything past the cursor before recording.
        self.entries.truncate(self.cursor + 1);
        let diff_from_prior = self
            .entries
            .back()
            .map(|prior| jods_diff::diff(&prior.snapshot, &snapshot));
        self.entries.push_back(HistoryEntry {
            snapshot,
            timestamp: now,
            diff_from_prior,
        });
        self.cursor = self.entries.len() - 1;
        if self.entries.len() > self.max_entries {
            self.entries.pop_front();
            self.cursor -= 1;
            tracing::trace!(max = self.max_entries, "history ring evicted oldest entry");
        }
        self.last_append = Some(now);
    }

    /// Begin traveling to `index`. Sets the time-traveling guard so the
    /// store write the caller is about to perform does not itself get
    /// recorded as a new entry; the caller must call
    /// [`History::finish_travel`] once that write completes.
    ///
    /// # Errors
    /// [`HistoryError::IndexOutOfRange`] if `index` is outside the ring
    /// (spec.md §9: the source returns silently here; this is stricter).
    pub fn travel_to(
        &mut self,
        index: usize,
        options: TravelOptions,
    ) -> Result<TravelTarget, HistoryError> {
        let len = self.entries.len();
        let snapshot = self
            .entries
            .get(index)
            .map(|entry| entry.snapshot.clone())
            .ok_or(HistoryError::IndexOutOfRange { index, len })?;
        self.cursor = index;
        self.traveling.set(true);
        Ok(TravelTarget {
            snapshot,
            strict: options.strict,
        })
    }

    /// Clear the time-traveling guard started by [`History::travel_to`].
    pub fn finish_travel(&mut self) {
        self.traveling.set(false);
    }

    /// Travel one entry back, or `None` if already at entry 0.
    ///
    /// # Errors
    /// Never fails — included for symmetry with [`History::travel_to`].
    pub fn back(&mut self, options: TravelOptions) -> Result<Option<TravelTarget>, HistoryError> {
        if self.cursor == 0 {
            return Ok(None);
        }
        self.travel_to(self.cursor - 1, options).map(Some)
    }

    /// Travel one entry forward, or `None` if already at the tail.
    ///
    /// # Errors
    /// Never fails — included for symmetry with [`History::travel_to`].
    pub fn forward(
        &mut self,
        options: TravelOptions,
    ) -> Result<Option<TravelTarget>, HistoryError> {
        if self.cursor + 1 >= self.entries.len() {
            return Ok(None);
        }
        self.travel_to(self.cursor + 1, options).map(Some)
    }

    /// Collapse the ring to a single entry holding the current snapshot.
    /// Never leaves the ring empty.
    pub fn clear(&mut self, now: Instant) {
        let current = self.entries[self.cursor].snapshot.clone();
        self.entries = VecDeque::from([HistoryEntry {
            snapshot: current,
            timestamp: now,
            diff_from_prior: None,
        }]);
        self.cursor = 0;
        self.last_append = None;
        self.pending = None;
    }

    /// Tear down bookkeeping. Unlike [`History::clear`], leaves the ring
    /// empty; unsubscribing from the store is `jods-app`'s responsibility.
    pub fn destroy(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.last_append = None;
        self.pending = None;
    }

    /// Current cursor position.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false` post-construction (the never-empty invariant).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at the cursor.
    #[must_use]
    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.cursor]
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn obj(count: f64) -> Value {
        let mut map = IndexMap::new();
        map.insert("count".to_string(), Value::Number(count));
        Value::Object(map)
    }

    #[test]
    fn branching_discards_entries_past_cursor_then_appends() {
        let t0 = Instant::now();
        let throttle = Duration::from_millis(0);
        let mut history = History::new(
            obj(0.0),
            HistoryOptions {
                throttle,
                ..HistoryOptions::default()
            },
            t0,
        );

        let mut t = t0;
        for value in [10.0, 20.0, 30.0] {
            t += Duration::from_millis(1);
            history.on_notification(obj(value), t);
        }
        assert_eq!(history.len(), 4, "initial entry plus three writes");

        let target = history.travel_to(1, TravelOptions::default()).unwrap();
        assert_eq!(target.snapshot, obj(10.0));
        history.finish_travel();
        assert_eq!(history.cursor(), 1);

        t += Duration::from_millis(1);
        history.on_notification(obj(15.0), t);

        let counts: Vec<f64> = history
            .entries()
            .map(|e| match &e.snapshot {
                Value::Object(m) => match m.get("count") {
                    Some(Value::Number(n)) => *n,
                    _ => f64::NAN,
                },
                _ => f64::NAN,
            })
            .collect();
        assert_eq!(counts, vec![0.0, 10.0, 15.0]);

        assert_eq!(
            history.forward(TravelOptions::default()).unwrap(),
            None,
            "forward has no effect past the new tail"
        );
    }

    #[test]
    fn out_of_range_travel_fails_loudly() {
        let mut history = History::new(obj(0.0), HistoryOptions::default(), Instant::now());
        let err = history.travel_to(5, TravelOptions::default()).unwrap_err();
        assert_eq!(err, HistoryError::IndexOutOfRange { index: 5, len: 1 });
    }

    #[test]
    fn writes_inside_a_throttle_window_coalesce_into_one_pending_append() {
        let t0 = Instant::now();
        let mut history = History::new(
            obj(0.0),
            HistoryOptions {
                throttle: Duration::from_millis(100),
                ..HistoryOptions::default()
            },
            t0,
        );

        history.on_notification(obj(1.0), t0 + Duration::from_millis(10));
        history.on_notification(obj(2.0), t0 + Duration::from_millis(20));
        assert_eq!(history.len(), 1, "both writes stayed pending");

        history.flush_pending(t0 + Duration::from_millis(30));
        assert_eq!(history.len(), 2);
        assert_eq!(history.current().snapshot, obj(2.0));
    }

    #[test]
    fn traveling_guard_suppresses_notifications_during_travel() {
        let t0 = Instant::now();
        let mut history = History::new(
            obj(0.0),
            HistoryOptions {
                throttle: Duration::from_millis(0),
                ..HistoryOptions::default()
            },
            t0,
        );
        history.on_notification(obj(1.0), t0 + Duration::from_millis(1));
        assert_eq!(history.len(), 2);

        history.travel_to(0, TravelOptions::default()).unwrap();
        history.on_notification(obj(999.0), t0 + Duration::from_millis(2));
        assert_eq!(history.len(), 2, "travel-triggered write must not be recorded");
        history.finish_travel();

        history.on_notification(obj(3.0), t0 + Duration::from_millis(3));
        assert_eq!(history.len(), 3, "writes after finish_travel record again");
    }

    #[test]
    fn ring_evicts_from_the_front_past_max_entries() {
        let t0 = Instant::now();
        let mut history = History::new(
            obj(0.0),
            HistoryOptions {
                max_entries: 2,
                throttle: Duration::from_millis(0),
                active: true,
            },
            t0,
        );
        history.on_notification(obj(1.0), t0 + Duration::from_millis(1));
        history.on_notification(obj(2.0), t0 + Duration::from_millis(2));
        assert_eq!(history.len(), 2, "bounded to max_entries");
        assert_eq!(history.entries().next().unwrap().snapshot, obj(1.0));
    }

    #[test]
    fn clear_keeps_the_current_entry() {
        let t0 = Instant::now();
        let mut history = History::new(
            obj(0.0),
            HistoryOptions {
                throttle: Duration::from_millis(0),
                ..HistoryOptions::default()
            },
            t0,
        );
        history.on_notification(obj(1.0), t0 + Duration::from_millis(1));
        history.clear(t0 + Duration::from_millis(2));
        assert_eq!(history.len(), 1);
        assert_eq!(history.current().snapshot, obj(1.0));
    }

    #[test]
    fn inactive_history_never_records() {
        let t0 = Instant::now();
        let mut history = History::new(
            obj(0.0),
            HistoryOptions {
                active: false,
                ..HistoryOptions::default()
            },
            t0,
        );
        history.on_notification(obj(1.0), t0 + Duration::from_millis(1));
        assert_eq!(history.len(), 1);
    }
}
