// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bidirectional store sync over a pluggable transport (spec.md §4.F).

mod channel;
mod engine;
mod error;
mod transport;

pub use channel::{ChannelTransport, ChannelTransportHandle};
pub use engine::{SyncEngine, SyncOptions, SyncStatus};
pub use error::SyncError;
pub use transport::{Transport, TransportEvent, TransportSendError};
