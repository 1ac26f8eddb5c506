// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Lifecycle glue: wiring a store to history/sync, plus the ambient
//! configuration surface every engine-embedding tool needs (spec.md §4.G).

pub mod config;
pub mod persistence;
mod wire;

pub use wire::{on_update, WireOptions, WiringHandle};
