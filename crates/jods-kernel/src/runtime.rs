// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The per-store bookkeeping: capture stack, dirty set, batch depth and
//! subscription registry.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Opaque identifier for a signal cell, unique within the owning [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

/// Handle returned by [`Runtime::subscribe`]; pass to [`Runtime::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Re-entrant-write recursion bound (spec.md §4.C: "bounded recursion depth
/// configurable; default 100").
const DEFAULT_MAX_FLUSH_ROUNDS: usize = 100;

struct Subscription {
    tracked: RefCell<HashSet<CellId>>,
    live: StdCell<bool>,
    notify: RefCell<Box<dyn FnMut()>>,
}

struct Inner {
    capture_stack: Vec<HashSet<CellId>>,
    dirty: HashSet<CellId>,
    batch_depth: usize,
    flushing: bool,
    next_cell: u64,
    next_sub: u64,
    subs: Vec<(SubscriptionId, Rc<Subscription>)>,
}

/// Owns one store's dependency-tracking and batch/flush state.
///
/// Cloning a `Runtime` is cheap and shares the same underlying state — every
/// [`Cell`] created from it holds a clone.
pub struct Runtime {
    inner: RefCell<Inner>,
    max_flush_rounds: usize,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Runtime")
            .field("dirty_len", &inner.dirty.len())
            .field("batch_depth", &inner.batch_depth)
            .field("subscriptions", &inner.subs.len())
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::build(DEFAULT_MAX_FLUSH_ROUNDS)
    }
}

impl Runtime {
    /// Create a fresh runtime with the default re-entrant flush bound.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_max_flush_rounds(DEFAULT_MAX_FLUSH_ROUNDS)
    }

    /// Create a runtime with a caller-chosen bound on re-entrant flush
    /// rounds. Exceeding it logs and drops the remaining dirty cells rather
    /// than looping forever.
    #[must_use]
    pub fn with_max_flush_rounds(max_flush_rounds: usize) -> Rc<Self> {
        Rc::new(Self::build(max_flush_rounds))
    }

    fn build(max_flush_rounds: usize) -> Self {
        Self {
            inner: RefCell::new(Inner {
                capture_stack: Vec::new(),
                dirty: HashSet::new(),
                batch_depth: 0,
                flushing: false,
                next_cell: 0,
                next_sub: 0,
                subs: Vec::new(),
            }),
            max_flush_rounds,
        }
    }

    pub(crate) fn alloc_cell(&self) -> CellId {
        let mut inner = self.inner.borrow_mut();
        let id = CellId(inner.next_cell);
        inner.next_cell += 1;
        id
    }

    /// Register a dependency on `id` against the currently active capture
    /// frame (subscription run or [`Runtime::capture`] scope), if any.
    /// A no-op outside of one. Exposed so `jods-store` can forward a
    /// computed cell's resolved dependency set into its caller's frame.
    pub fn track(&self, id: CellId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(top) = inner.capture_stack.last_mut() {
            top.insert(id);
        }
    }

    /// Run `f` with a fresh dependency-capture frame and return its result
    /// together with the set of cells it read.
    ///
    /// Used by `jods-store` for computed cells, which are observers in the
    /// same sense a subscription is but are not registered in this
    /// runtime's subscription table (they invalidate lazily on read, not
    /// eagerly on flush).
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> (R, HashSet<CellId>) {
        self.inner.borrow_mut().capture_stack.push(HashSet::new());
        let result = f();
        let tracked = self
            .inner
            .borrow_mut()
            .capture_stack
            .pop()
            .expect("capture stack underflow: push/pop mismatch");
        (result, tracked)
    }

    pub(crate) fn mark_dirty(&self, id: CellId) {
        let mut inner = self.inner.borrow_mut();
        inner.dirty.insert(id);
        let should_flush = inner.batch_depth == 0 && !inner.flushing;
        drop(inner);
        if should_flush {
            self.flush();
        }
    }

    /// Coalesce the writes performed by `f` into a single post-batch flush.
    ///
    /// Batches nest: only the outermost scope's exit triggers a flush
    /// (spec.md §4.C: "on transition to zero, flush").
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.borrow_mut().batch_depth += 1;
        let result = f();
        let should_flush = {
            let mut inner = self.inner.borrow_mut();
            inner.batch_depth -= 1;
            inner.batch_depth == 0
        };
        if should_flush {
            self.flush();
        }
        result
    }

    /// Register a subscription and run it once synchronously to capture its
    /// initial dependency set (spec.md §4.D: "invoked once synchronously on
    /// registration").
    pub fn subscribe(&self, notify: impl FnMut() + 'static) -> SubscriptionId {
        let sub = Rc::new(Subscription {
            tracked: RefCell::new(HashSet::new()),
            live: StdCell::new(true),
            notify: RefCell::new(Box::new(notify)),
        });
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = SubscriptionId(inner.next_sub);
            inner.next_sub += 1;
            inner.subs.push((id, Rc::clone(&sub)));
            id
        };
        self.run_subscription(&sub);
        id
    }

    /// Idempotent: unsubscribing an already-removed or unknown id is a no-op.
    /// Safe to call from inside a running notification — in-progress calls
    /// complete, future ones are suppressed.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let inner = self.inner.borrow();
        if let Some((_, sub)) = inner.subs.iter().find(|(sid, _)| *sid == id) {
            sub.live.set(false);
        }
    }

    fn run_subscription(&self, sub: &Rc<Subscription>) {
        if !sub.live.get() {
            return;
        }
        let (_, tracked) = self.capture(|| {
            (sub.notify.borrow_mut())();
        });
        *sub.tracked.borrow_mut() = tracked;
    }

    /// Atomically snapshot and clear the dirty set, then re-run every live
    /// subscription whose tracked cells intersect it. Re-entrant writes
    /// performed by a subscription are deferred to a follow-up round within
    /// the same call, bounded by `max_flush_rounds`.
    pub fn flush(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.flushing {
                return;
            }
            inner.flushing = true;
        }

        let mut round = 0usize;
        loop {
            let dirty_snapshot: HashSet<CellId> = {
                let mut inner = self.inner.borrow_mut();
                if inner.dirty.is_empty() {
                    break;
                }
                std::mem::take(&mut inner.dirty)
            };

            round += 1;
            if round > self.max_flush_rounds {
                tracing::error!(
                    rounds = round,
                    "signal kernel exceeded max re-entrant flush rounds; dropping pending writes"
                );
                break;
            }

            let affected: Vec<Rc<Subscription>> = {
                let inner = self.inner.borrow();
                inner
                    .subs
                    .iter()
                    .filter(|(_, sub)| {
                        sub.live.get() && !sub.tracked.borrow().is_disjoint(&dirty_snapshot)
                    })
                    .map(|(_, sub)| Rc::clone(sub))
                    .collect()
            };

            for sub in &affected {
                self.run_subscription(sub);
            }
        }

        self.inner.borrow_mut().flushing = false;
    }

    /// Number of cells currently marked dirty (for tests and diagnostics).
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.inner.borrow().dirty.len()
    }

    /// Number of live and tombstoned subscriptions combined (for tests).
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.borrow().subs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cell;

    #[test]
    fn batched_writes_notify_once() {
        let rt = Runtime::new();
        let a = Cell::new(&rt, 1i64);
        let b = Cell::new(&rt, 2i64);
        let c = Cell::new(&rt, 3i64);

        let runs = Rc::new(StdCell::new(0));
        let (ra, rb, rc) = (a.clone(), b.clone(), c.clone());
        let runs_clone = Rc::clone(&runs);
        rt.subscribe(move || {
            let _ = (ra.get(), rb.get(), rc.get());
            runs_clone.set(runs_clone.get() + 1);
        });

        assert_eq!(runs.get(), 1, "initial synchronous call");

        rt.batch(|| {
            a.set(10);
            b.set(20);
            c.set(30);
        });

        assert_eq!(runs.get(), 2, "exactly one notification for the whole batch");
    }

    #[test]
    fn subscriber_only_reruns_for_tracked_cells() {
        let rt = Runtime::new();
        let count = Cell::new(&rt, 0i64);
        let unrelated = Cell::new(&rt, "x".to_string());

        let runs = Rc::new(StdCell::new(0));
        let count_clone = count.clone();
        let runs_clone = Rc::clone(&runs);
        rt.subscribe(move || {
            let _ = count_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        unrelated.set("y".to_string());
        assert_eq!(runs.get(), 1, "unrelated write must not notify");

        count.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn equal_value_write_is_a_no_op() {
        let rt = Runtime::new();
        let cell = Cell::new(&rt, 5i64);
        let runs = Rc::new(StdCell::new(0));
        let cell_clone = cell.clone();
        let runs_clone = Rc::clone(&runs);
        rt.subscribe(move || {
            let _ = cell_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        cell.set(5);
        assert_eq!(runs.get(), 1, "writing the same value must not mark dirty");
    }

    #[test]
    fn unsubscribe_is_idempotent_and_stops_future_notifications() {
        let rt = Runtime::new();
        let cell = Cell::new(&rt, 0i64);
        let runs = Rc::new(StdCell::new(0));
        let cell_clone = cell.clone();
        let runs_clone = Rc::clone(&runs);
        let id = rt.subscribe(move || {
            let _ = cell_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        rt.unsubscribe(id);
        rt.unsubscribe(id);
        cell.set(1);
        assert_eq!(runs.get(), 1, "unsubscribed subscription must not rerun");
    }

    #[test]
    fn reentrant_writes_run_in_a_follow_up_flush_round() {
        let rt = Runtime::new();
        let a = Cell::new(&rt, 0i64);
        let b = Cell::new(&rt, 0i64);

        let (a1, b1) = (a.clone(), b.clone());
        // Writing `b` from within `a`'s subscriber must not be lost or
        // folded into the same round; it runs b's own subscriber next round.
        rt.subscribe(move || {
            let v = a1.get();
            if v == 1 {
                b1.set(1);
            }
        });

        let b_runs = Rc::new(StdCell::new(0));
        let b2 = b.clone();
        let b_runs_clone = Rc::clone(&b_runs);
        rt.subscribe(move || {
            let _ = b2.get();
            b_runs_clone.set(b_runs_clone.get() + 1);
        });
        assert_eq!(b_runs.get(), 1);

        a.set(1);
        assert_eq!(b.get(), 1);
        assert_eq!(b_runs.get(), 2, "b's subscriber ran again in the follow-up round");
    }
}
