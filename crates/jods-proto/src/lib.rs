// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sync wire message and dotted-path filtering (spec.md §6).

mod filter;
mod message;

pub use filter::{filter_diff, parse_path, path_to_string};
pub use message::{decode, encode, ProtoError, SyncMessage};
