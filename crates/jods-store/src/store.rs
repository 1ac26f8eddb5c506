// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The store itself: cell table, computed cells, subscribe, batch,
//! get/set state, and the `Patchable` bridge to `jods-diff`.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use jods_diff::{Patchable, PatchError, Value};
use jods_kernel::{Cell, CellId, Runtime, SubscriptionId};

use crate::reader::StoreReader;

enum Slot {
    Value(Cell<Value>),
    Computed(Rc<ComputedCell>),
}

struct ComputedCell {
    formula: Box<dyn Fn(&StoreReader<'_>) -> Value>,
    cached: RefCell<Value>,
    deps: RefCell<Vec<(CellId, u64)>>,
    evaluated: StdCell<bool>,
}

/// A signal-backed mapping from string key to cell; some cells are
/// computed. See the module-level docs and spec.md §4.D.
///
/// A `Store` is always held behind `Rc` — [`Store::subscribe`] needs to
/// hand out a weak back-reference so a subscription never keeps the store
/// alive on its own, so construction always goes through
/// [`crate::StoreBuilder`] or [`Store::empty`].
pub struct Store {
    runtime: Rc<Runtime>,
    cells: RefCell<IndexMap<String, Slot>>,
    cell_index: RefCell<HashMap<CellId, Cell<Value>>>,
}

impl Store {
    /// An empty store with no cells.
    #[must_use]
    pub fn empty() -> Rc<Self> {
        Rc::new(Self {
            runtime: Runtime::new(),
            cells: RefCell::new(IndexMap::new()),
            cell_index: RefCell::new(HashMap::new()),
        })
    }

    pub(crate) fn define_computed(
        &self,
        key: &str,
        formula: impl Fn(&StoreReader<'_>) -> Value + 'static,
    ) {
        let computed = Rc::new(ComputedCell {
            formula: Box::new(formula),
            cached: RefCell::new(Value::Null),
            deps: RefCell::new(Vec::new()),
            evaluated: StdCell::new(false),
        });
        self.cells
            .borrow_mut()
            .insert(key.to_string(), Slot::Computed(computed));
    }

    /// Read a key, tracking a dependency if called from within a running
    /// subscription or computed formula. Returns `None` if the key does
    /// not exist.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let slot_kind = self.cells.borrow().get(key).map(|slot| match slot {
            Slot::Value(cell) => SlotRef::Value(cell.clone()),
            Slot::Computed(computed) => SlotRef::Computed(Rc::clone(computed)),
        })?;
        match slot_kind {
            SlotRef::Value(cell) => Some(cell.get()),
            SlotRef::Computed(computed) => Some(self.resolve_computed(&computed, true)),
        }
    }

    /// Write a key through the signal kernel. Assigning a key currently
    /// backed by a computed cell replaces its formula with a constant —
    /// allowed, logged at debug level (spec.md §4.D).
    pub fn set(&self, key: &str, value: Value) {
        if let Some(cell) = self.value_cell(key) {
            cell.set(value);
            return;
        }
        if matches!(self.cells.borrow().get(key), Some(Slot::Computed(_))) {
            tracing::debug!(key, "overwriting computed cell with a constant value");
        }
        self.install_value_cell(key, value);
    }

    fn install_value_cell(&self, key: &str, value: Value) {
        let cell = Cell::new(&self.runtime, value);
        self.cell_index.borrow_mut().insert(cell.id(), cell.clone());
        self.cells
            .borrow_mut()
            .insert(key.to_string(), Slot::Value(cell));
    }

    /// A pure, dependency-free deep copy of the store, resolving every
    /// computed cell (spec.md §4.A). Must never record a dependency on the
    /// caller's current subscription, even if called from inside one.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let entries: Vec<(String, SlotRef)> = self
            .cells
            .borrow()
            .iter()
            .map(|(key, slot)| {
                let slot_ref = match slot {
                    Slot::Value(cell) => SlotRef::Value(cell.clone()),
                    Slot::Computed(computed) => SlotRef::Computed(Rc::clone(computed)),
                };
                (key.clone(), slot_ref)
            })
            .collect();

        let mut map = IndexMap::new();
        for (key, slot_ref) in entries {
            let value = match slot_ref {
                SlotRef::Value(cell) => cell.peek(Clone::clone),
                SlotRef::Computed(computed) => self.resolve_computed(&computed, false),
            };
            map.insert(key, value);
        }
        Value::Object(map)
    }

    /// Equivalent to [`Store::snapshot`] (spec.md §4.D `getState`).
    #[must_use]
    pub fn get_state(&self) -> Value {
        self.snapshot()
    }

    /// Shallow merge: existing keys are overwritten, new keys are added,
    /// keys absent from `partial` are left intact. Runs inside an implicit
    /// batch.
    pub fn set_state(&self, partial: Value) {
        let Value::Object(map) = partial else {
            tracing::debug!("set_state called with a non-object value; ignored");
            return;
        };
        self.runtime.batch(|| {
            for (key, value) in map {
                self.set(&key, value);
            }
        });
    }

    /// Like [`Store::set_state`], but also removes any existing top-level
    /// key absent from `full` — used for strict time-travel, where the
    /// store must become byte-identical to a historical snapshot rather
    /// than merge into the current one (spec.md §9). Runs inside an
    /// implicit batch.
    pub fn replace_state(&self, full: Value) {
        let Value::Object(map) = full else {
            tracing::debug!("replace_state called with a non-object value; ignored");
            return;
        };
        self.runtime.batch(|| {
            let stale_keys: Vec<String> = self
                .cells
                .borrow()
                .keys()
                .filter(|key| !map.contains_key(*key))
                .cloned()
                .collect();
            for key in stale_keys {
                self.cells.borrow_mut().shift_remove(&key);
            }
            for (key, value) in map {
                self.set(&key, value);
            }
        });
    }

    /// Coalesce a user-level sequence of writes into a single post-batch
    /// flush.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.runtime.batch(f)
    }

    /// Register a subscriber. Invoked once synchronously on registration to
    /// capture its initial dependency set, then on every flush whose dirty
    /// cells intersect it. Holds only a weak reference to the store, so a
    /// live subscription never keeps it alive.
    ///
    /// Takes `store` by reference-to-`Rc` rather than as a method receiver:
    /// the weak back-reference this needs to hand to the kernel can only be
    /// produced from an `Rc<Store>` the caller already holds, and stable
    /// Rust has no blessed `self: &Rc<Self>` receiver shorthand for that.
    pub fn subscribe(
        store: &Rc<Store>,
        mut callback: impl FnMut(Value) + 'static,
    ) -> SubscriptionId {
        let weak: Weak<Store> = Rc::downgrade(store);
        store.runtime.subscribe(move || {
            if let Some(store) = weak.upgrade() {
                let snapshot = store.snapshot();
                callback(snapshot);
            }
        })
    }

    /// Idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.runtime.unsubscribe(id);
    }

    /// Apply a structural diff to this store inside a single batch
    /// (spec.md §4.B "Wrapping").
    ///
    /// # Errors
    /// Returns [`PatchError::ShapeMismatch`] if the diff expects an object
    /// at a path this store holds a scalar or array at.
    pub fn apply_patch(&self, diff: &jods_diff::Diff) -> Result<(), PatchError> {
        self.batch(|| {
            let mut proxy = StoreMutProxy(self);
            jods_diff::patch(&mut proxy, diff)
        })
    }

    fn resolve_computed(&self, computed: &Rc<ComputedCell>, forward: bool) -> Value {
        let stale = !computed.evaluated.get() || {
            let deps = computed.deps.borrow();
            deps.iter()
                .any(|(id, gen)| self.generation_of(*id) != Some(*gen))
        };

        if stale {
            let reader = StoreReader { store: self };
            let (value, touched) = self.runtime.capture(|| (computed.formula)(&reader));
            let snapshot_gens: Vec<(CellId, u64)> = touched
                .iter()
                .filter_map(|id| self.generation_of(*id).map(|gen| (*id, gen)))
                .collect();
            *computed.cached.borrow_mut() = value.clone();
            *computed.deps.borrow_mut() = snapshot_gens;
            computed.evaluated.set(true);
            if forward {
                for id in &touched {
                    self.runtime.track(*id);
                }
            }
            value
        } else {
            if forward {
                for (id, _) in computed.deps.borrow().iter() {
                    self.runtime.track(*id);
                }
            }
            computed.cached.borrow().clone()
        }
    }

    fn generation_of(&self, id: CellId) -> Option<u64> {
        self.cell_index.borrow().get(&id).map(Cell::generation)
    }

    fn value_cell(&self, key: &str) -> Option<Cell<Value>> {
        match self.cells.borrow().get(key)? {
            Slot::Value(cell) => Some(cell.clone()),
            Slot::Computed(_) => None,
        }
    }

    fn get_or_create_object_cell(&self, key: &str) -> Cell<Value> {
        if let Some(cell) = self.value_cell(key) {
            return cell;
        }
        let is_computed = matches!(self.cells.borrow().get(key), Some(Slot::Computed(_)));
        if is_computed {
            tracing::debug!(key, "overwriting computed cell with a constant value");
        }
        self.install_value_cell(key, Value::object());
        self.value_cell(key).expect("just installed")
    }

    fn assign_path(&self, path: &[String], value: Value) {
        let Some((top, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.set(top, value);
            return;
        }
        let cell = self.get_or_create_object_cell(top);
        cell.update(|root| navigate_and_assign(root, rest, value.clone()));
    }

    fn remove_path(&self, path: &[String]) {
        let Some((top, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.cells.borrow_mut().shift_remove(top);
            return;
        }
        if let Some(cell) = self.value_cell(top) {
            cell.update(|root| navigate_and_remove(root, rest));
        }
    }

    fn get_path(&self, path: &[String]) -> Option<Value> {
        let (top, rest) = path.split_first()?;
        let mut cur = self.get(top)?;
        for seg in rest {
            match cur {
                Value::Object(map) => cur = map.get(seg)?.clone(),
                _ => return None,
            }
        }
        Some(cur)
    }
}

enum SlotRef {
    Value(Cell<Value>),
    Computed(Rc<ComputedCell>),
}

fn navigate_and_assign(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cur = root;
    for seg in parents {
        if !matches!(cur, Value::Object(_)) {
            *cur = Value::object();
        }
        let Value::Object(map) = cur else {
            unreachable!("just coerced to Object");
        };
        cur = map.entry(seg.clone()).or_insert_with(Value::object);
    }
    if !matches!(cur, Value::Object(_)) {
        *cur = Value::object();
    }
    let Value::Object(map) = cur else {
        unreachable!("just coerced to Object");
    };
    map.insert(last.clone(), value);
}

fn navigate_and_remove(root: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cur = root;
    for seg in parents {
        let Value::Object(map) = cur else {
            return;
        };
        let Some(next) = map.get_mut(seg) else {
            return;
        };
        cur = next;
    }
    if let Value::Object(map) = cur {
        map.shift_remove(last);
    }
}

/// Adapter giving `jods_diff::patch` the `&mut self` receiver it wants
/// while the store itself stays interior-mutable and shared. The `&mut`
/// exclusivity only ever applies to this zero-sized stack-local wrapper,
/// never to the store.
struct StoreMutProxy<'a>(&'a Store);

impl Patchable for StoreMutProxy<'_> {
    fn assign(&mut self, path: &[String], value: Value) {
        self.0.assign_path(path, value);
    }

    fn remove(&mut self, path: &[String]) {
        self.0.remove_path(path);
    }

    fn replace_array(&mut self, path: &[String], items: Vec<Value>) {
        self.0.assign_path(path, Value::Array(items));
    }

    fn get(&self, path: &[String]) -> Option<Value> {
        self.0.get_path(path)
    }
}
