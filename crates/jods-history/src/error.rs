// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy for the history tracker.

use thiserror::Error;

/// Failures from [`crate::History::travel_to`].
///
/// Spec.md §9: the source returns silently on an out-of-range index; this
/// crate fails loudly instead, since a stricter contract is easier to test
/// against.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// `travel_to` was asked for an entry outside the current ring.
    #[error("history index {index} out of range (0..{len})")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of entries currently held.
        len: usize,
    },
}
