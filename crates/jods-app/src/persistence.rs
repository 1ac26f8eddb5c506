// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store-state persistence is explicitly out of scope for the core (§6):
//! "a durable storage format... is a plugin trait, no concrete durable
//! backend is required by the core." This module names that trait so a
//! downstream crate has a seam to implement against, without core
//! shipping a concrete backend.

use jods_diff::Value;

/// A pluggable store-state persistence backend. Core never implements
/// this; it exists so a downstream crate (a desktop app, a server) can
/// snapshot/restore store state without the core depending on any
/// particular storage technology.
pub trait PersistencePlugin {
    /// The failure type this backend reports.
    type Error;

    /// Persist a full store snapshot under `key`.
    ///
    /// # Errors
    /// Returns `Self::Error` on an underlying storage failure.
    fn save_snapshot(&self, key: &str, snapshot: &Value) -> Result<(), Self::Error>;

    /// Load a previously saved snapshot. Returns `Ok(None)` if `key` has
    /// never been saved.
    ///
    /// # Errors
    /// Returns `Self::Error` on an underlying storage failure other than
    /// not-found.
    fn load_snapshot(&self, key: &str) -> Result<Option<Value>, Self::Error>;

    /// Erase a previously saved snapshot. A no-op, not an error, if `key`
    /// was never saved (spec.md §6 names `clear(handle)` as the third
    /// collaborator operation alongside load/save).
    ///
    /// # Errors
    /// Returns `Self::Error` on an underlying storage failure.
    fn clear(&self, key: &str) -> Result<(), Self::Error>;
}
