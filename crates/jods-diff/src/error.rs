// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fatal error taxonomy for the differ/patcher (spec.md §7). Non-fatal
//! conditions (an unrecognized `__`-prefixed wrapper key) are logged via
//! `tracing::warn!` at the point they're discovered in `diff.rs` rather
//! than modeled as a type here — nothing downstream distinguishes them
//! from a successful decode.

use thiserror::Error;

/// Fatal failures from [`crate::patch`].
#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    /// A nested mapping diff targeted a scalar position in the store.
    ///
    /// Spec.md §4.B: "patching a scalar position with a nested mapping
    /// diff is a hard error (`PatchShapeMismatch`)."
    #[error("patch shape mismatch at path `{path}`: expected object, found scalar")]
    ShapeMismatch {
        /// Dotted path at which the mismatch was detected.
        path: String,
    },
}
