// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-process [`Transport`] test double, grounded on
//! `echo_session_client::tool::ChannelSession`'s channel-pair adapter.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use crate::transport::{Transport, TransportEvent, TransportSendError};

/// A [`Transport`] backed by `std::sync::mpsc`, for tests and in-process
/// wiring. Use [`ChannelTransport::pair`] to get one end plus a
/// [`ChannelTransportHandle`] that drives the other.
pub struct ChannelTransport {
    outbox: Sender<String>,
    inbox: Receiver<TransportEvent>,
}

/// The test/driver side of a [`ChannelTransport`] pair: push events in,
/// read sent messages out.
pub struct ChannelTransportHandle {
    /// Feed an event to the paired [`ChannelTransport`].
    pub events: Sender<TransportEvent>,
    /// Messages the paired [`ChannelTransport`] has sent.
    pub sent: Receiver<String>,
}

impl ChannelTransport {
    /// Build a connected pair: the engine holds the `ChannelTransport`, the
    /// test holds the `ChannelTransportHandle`.
    #[must_use]
    pub fn pair() -> (ChannelTransport, ChannelTransportHandle) {
        let (outbox_tx, outbox_rx) = channel();
        let (events_tx, events_rx) = channel();
        (
            ChannelTransport {
                outbox: outbox_tx,
                inbox: events_rx,
            },
            ChannelTransportHandle {
                events: events_tx,
                sent: outbox_rx,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: &str) -> Result<(), TransportSendError> {
        self.outbox
            .send(message.to_string())
            .map_err(|_| TransportSendError("peer handle dropped".to_string()))
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}
