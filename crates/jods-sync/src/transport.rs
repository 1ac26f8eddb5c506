// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The socket abstraction `SyncEngine` is generic over.

use thiserror::Error;

/// A lifecycle or inbound-data event from a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The underlying connection became ready.
    Open,
    /// A complete inbound message arrived.
    Message(String),
    /// The transport reported an error; the connection may or may not
    /// still be usable.
    Error(String),
    /// The underlying connection closed.
    Close,
}

/// Failure from [`Transport::send`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport send failed: {0}")]
pub struct TransportSendError(pub String);

/// Spec.md §4.F's socket contract (`send(string)`, `onmessage`/events),
/// reshaped into a poll-based Rust trait: `poll_events` drains whatever
/// arrived since the last call, the same non-blocking drain pattern
/// `echo_session_client::tool::ChannelSession` uses for notifications and
/// frames, rather than a callback or `Stream`.
pub trait Transport {
    /// Send a complete wire message. Implementations should not block.
    ///
    /// # Errors
    /// Returns [`TransportSendError`] if the underlying connection cannot
    /// accept the write (closed, backpressure overflow, etc).
    fn send(&self, message: &str) -> Result<(), TransportSendError>;

    /// Drain every event that has arrived since the last call, in order.
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}
