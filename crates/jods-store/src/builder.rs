// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Construction of a [`Store`] from an initial state plus computed formulas.

use std::rc::Rc;

use jods_diff::Value;

use crate::reader::StoreReader;
use crate::store::Store;

/// Builds a [`Store`]: every key of the initial state becomes a plain cell;
/// [`StoreBuilder::computed`] adds a formula-backed cell (spec.md §4.D:
/// "every enumerable own property of `initialState` becomes a cell").
#[derive(Default)]
pub struct StoreBuilder {
    initial: Vec<(String, Value)>,
    computed: Vec<(String, Box<dyn Fn(&StoreReader<'_>) -> Value>)>,
}

impl StoreBuilder {
    /// Start from an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from an object snapshot; non-object values are
    /// rejected at build time via [`StoreBuilder::build`] returning an
    /// empty-root store (a store's top level is always a mapping).
    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        if let Value::Object(map) = state {
            self.initial = map.into_iter().collect();
        }
        self
    }

    /// Add a single plain cell.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.initial.push((key.into(), value));
        self
    }

    /// Add a computed cell. The formula receives a [`StoreReader`] instead
    /// of closing over the store (spec.md §9), so it can be written once
    /// and reused across stores.
    #[must_use]
    pub fn computed(
        mut self,
        key: impl Into<String>,
        formula: impl Fn(&StoreReader<'_>) -> Value + 'static,
    ) -> Self {
        self.computed.push((key.into(), Box::new(formula)));
        self
    }

    /// Build the store.
    #[must_use]
    pub fn build(self) -> Rc<Store> {
        let store = Store::empty();
        for (key, value) in self.initial {
            store.set(&key, value);
        }
        for (key, formula) in self.computed {
            store.define_computed(&key, formula);
        }
        store
    }
}
