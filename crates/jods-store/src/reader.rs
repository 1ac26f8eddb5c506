// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Explicit reader handle passed to computed formulas, replacing the
//! source's closure-over-`this` (spec.md §9: "Computed cells without
//! closures-over-`this`").

use jods_diff::Value;

use crate::store::Store;

/// A read-only, dependency-tracking view of a [`Store`] passed to computed
/// formulas.
///
/// Reading through this handle registers exactly the same dependency as
/// reading the key directly through the store: each read inside an active
/// capture scope (the formula's own recompute, or a subscriber observing
/// this computed cell) is recorded.
pub struct StoreReader<'a> {
    pub(crate) store: &'a Store,
}

impl StoreReader<'_> {
    /// Read a key, tracking a dependency on it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }
}
