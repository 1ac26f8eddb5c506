// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The signal cell: one unit of tracked, batched store state.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use crate::runtime::{CellId, Runtime};

struct Inner<T> {
    value: RefCell<T>,
    generation: StdCell<u64>,
    runtime: Rc<Runtime>,
    id: CellId,
}

/// A reactive container holding a value, its identity within the owning
/// [`Runtime`], and a monotonic write generation (spec.md §3: "the
/// generation counter at last write... used to test freshness" — consumed
/// by `jods-store`'s computed cells to invalidate lazily without the
/// runtime needing a cell registry).
///
/// Reading inside a running subscription or a [`Runtime::capture`] scope
/// registers a dependency; writing marks the cell dirty and, outside a
/// batch, flushes immediately. Cloning a `Cell` is cheap and yields another
/// handle to the same underlying state, not an independent copy.
pub struct Cell<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Cell<T> {
    /// Create a new cell owned by `runtime`.
    pub fn new(runtime: &Rc<Runtime>, value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(value),
                generation: StdCell::new(0),
                runtime: Rc::clone(runtime),
                id: runtime.alloc_cell(),
            }),
        }
    }

    /// This cell's identity within its runtime.
    #[must_use]
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// The write generation as of the last `set`/`update` that actually
    /// changed the value.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.get()
    }

    /// Run `f` against the current value without registering a dependency.
    /// Mirrors spec.md §4.A's read-isolated snapshot scope.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Read the value through the handle, registering a dependency on the
    /// currently running subscription or capture scope, if any.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.runtime.track(self.inner.id);
        f(&self.inner.value.borrow())
    }
}

impl<T: Clone> Cell<T> {
    /// Clone out the current value, tracking a dependency.
    pub fn get(&self) -> T {
        self.with(Clone::clone)
    }
}

impl<T: PartialEq> Cell<T> {
    /// Replace the value. A no-op (no dirty mark, no generation bump) if
    /// `value` equals the current one (spec.md §4.C: "if new value equals
    /// old... no-op").
    pub fn set(&self, value: T) {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            self.inner.generation.set(self.inner.generation.get() + 1);
            self.inner.runtime.mark_dirty(self.inner.id);
        }
    }
}

impl<T: PartialEq + Clone> Cell<T> {
    /// Update in place via `f`; dirties the cell iff the result differs
    /// from the previous value.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut scratch = self.inner.value.borrow().clone();
        f(&mut scratch);
        self.set(scratch);
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
