// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Snapshot value tree, structural differ and patcher.
//!
//! A [`Value`] is the plain, acyclic, JSON-representable tree that backs a
//! store snapshot (component A). [`diff`] computes a compact [`Diff`]
//! descriptor between two snapshots (component B); [`patch`] re-applies one
//! through the [`Patchable`] trait that `jods-store` implements for its
//! store type, so this crate has no dependency on the store itself.

mod diff;
mod error;
mod patch;
mod value;

pub use diff::{diff, Diff, FieldDiff};
pub use error::PatchError;
pub use patch::{patch, Patchable};
pub use value::Value;

/// Reserved sentinel emitted in place of a snapshot value that would
/// otherwise re-enter a reference already on the traversal stack.
///
/// `Value` itself owns its children by value, so a `Value` tree cannot
/// contain a reference cycle once built; the cycle this sentinel guards
/// against arises one layer up, in `jods-store`'s computed-cell evaluation
/// (formula A reads formula B reads formula A). See [`Value::cycle_placeholder`]
/// and spec.md §9 ("Cycle handling in snapshots... emit a reserved sentinel
/// string; do not attempt to reconstruct references on the receiving side").
pub const CYCLE_SENTINEL: &str = "[Circular]";

/// Placeholder for future sequence-diff strategy selection (spec.md §9,
/// "ordered-sequence diff granularity"). Core only implements whole-array
/// replacement today; this type exists so a future encoding can be added
/// without an API break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions;
