// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The sync engine itself: send path, receive path, status tracking.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use jods_diff::{diff, Diff, Value};
use jods_store::{Store, SubscriptionId};

use crate::error::SyncError;
use crate::transport::{Transport, TransportEvent};

/// Construction options (spec.md §4.F).
pub struct SyncOptions {
    /// Override the randomly generated client id (mainly for tests, where
    /// a deterministic id makes assertions simpler).
    pub client_id: Option<String>,
    /// Namespace tag. When set, outbound messages carry it and inbound
    /// messages with a different (or absent) prefix are dropped.
    pub prefix: Option<String>,
    /// Whitelist of top-level keys or dotted paths; empty means
    /// unrestricted. Applied to both directions.
    pub allow_paths: Vec<Vec<String>>,
    /// Blacklist of dotted paths, blanked out of an otherwise-allowed
    /// subtree. Applied to both directions, takes precedence over
    /// `allow_paths`.
    pub sensitive_keys: Vec<Vec<String>>,
    /// Last-chance outbound veto: return `false` to cancel a send.
    pub filter: Option<Box<dyn Fn(&Diff) -> bool>>,
    /// Minimum gap, in milliseconds, between two immediate sends; writes
    /// arriving sooner coalesce into a single throttled send.
    pub throttle_ms: u64,
    /// Reject an outbound message whose encoded size exceeds this many
    /// bytes, instead of sending it.
    pub max_message_size: Option<usize>,
    /// Never send; only apply inbound patches.
    pub receive_only: bool,
    /// Observe every diff actually sent.
    pub on_diff_send: Option<Box<dyn Fn(&Diff)>>,
    /// Last-chance inbound veto/rewrite: return `None` to drop the patch,
    /// `Some(diff)` (typically the same diff) to apply it.
    pub on_patch_receive: Option<Box<dyn Fn(&Diff) -> Option<Diff>>>,
    /// Non-fatal errors (decode failures, schema rejections, transport
    /// errors) are routed here instead of propagating.
    pub on_error: Option<Box<dyn Fn(&SyncError)>>,
    /// Validate an inbound diff before applying it; `Err` drops the
    /// message and reports a [`SyncError::SchemaValidation`].
    pub validate_schema: Option<Box<dyn Fn(&Diff) -> Result<(), String>>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            client_id: None,
            prefix: None,
            allow_paths: Vec::new(),
            sensitive_keys: Vec::new(),
            filter: None,
            throttle_ms: 100,
            max_message_size: None,
            receive_only: false,
            on_diff_send: None,
            on_patch_receive: None,
            on_error: None,
            validate_schema: None,
        }
    }
}

/// Connection status (spec.md §4.F state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No active connection.
    Disconnected,
    /// Connection requested, not yet confirmed.
    Connecting,
    /// Actively exchanging messages.
    Connected,
    /// The transport reported an error.
    Error,
    /// `stop()` was called; no further transitions occur.
    Terminated,
}

struct EngineState {
    last_sent_snapshot: Value,
    pending_snapshot: Option<Value>,
    last_send_ms: Option<u64>,
    applying_remote: bool,
}

/// Drives one store's sync session over one [`Transport`].
///
/// Holds the store strongly (no cycle: the store never references the
/// engine) and subscribes with a weak back-reference to itself, mirroring
/// `jods_store::Store::subscribe`'s own weak-self pattern, so a dropped
/// engine's subscription quietly stops firing rather than keeping anything
/// alive.
pub struct SyncEngine<T: Transport> {
    transport: RefCell<T>,
    store: Rc<Store>,
    subscription: Cell<Option<SubscriptionId>>,
    client_id: String,
    options: SyncOptions,
    state: RefCell<EngineState>,
    status: Cell<SyncStatus>,
    terminated: Cell<bool>,
    /// Timestamp from the most recent caller-driven tick
    /// ([`SyncEngine::drain_inbound`] or [`SyncEngine::flush_pending`]).
    /// The store notifies synchronously from inside an arbitrary write
    /// call, with no timestamp of its own to hand us, so a write that
    /// lands between ticks is stamped with the last tick we saw.
    clock: Cell<u64>,
}

impl<T: Transport + 'static> SyncEngine<T> {
    /// Start a sync session: subscribe to `store`, ready to exchange
    /// messages over `transport`.
    #[must_use]
    pub fn start(store: &Rc<Store>, transport: T, options: SyncOptions) -> Rc<Self> {
        let client_id = options.client_id.clone().unwrap_or_else(random_client_id);
        let engine = Rc::new(Self {
            transport: RefCell::new(transport),
            store: Rc::clone(store),
            subscription: Cell::new(None),
            client_id,
            options,
            state: RefCell::new(EngineState {
                last_sent_snapshot: store.snapshot(),
                pending_snapshot: None,
                last_send_ms: None,
                applying_remote: false,
            }),
            status: Cell::new(SyncStatus::Disconnected),
            terminated: Cell::new(false),
            clock: Cell::new(0),
        });

        let weak = Rc::downgrade(&engine);
        let sub_id = Store::subscribe(store, move |snapshot| {
            if let Some(engine) = weak.upgrade() {
                engine.on_store_notification(snapshot);
            }
        });
        engine.subscription.set(Some(sub_id));
        engine
    }

    /// This session's randomly generated (or overridden) client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.get()
    }

    /// Drain transport events and process them. The caller drives this
    /// from whatever event loop it has (a real timer, a game loop tick, or
    /// a test harness).
    pub fn drain_inbound(&self, now_ms: u64) {
        self.clock.set(now_ms);
        if self.terminated.get() {
            return;
        }
        let events = self.transport.borrow_mut().poll_events();
        for event in events {
            self.handle_transport_event(event, now_ms);
        }
    }

    /// Send a coalesced throttled write, if one is outstanding and
    /// `throttle_ms` has elapsed. Mirrors `jods_history::History::
    /// flush_pending` — the engine owns no timer of its own.
    pub fn flush_pending(&self, now_ms: u64) {
        self.clock.set(now_ms);
        if self.terminated.get() {
            return;
        }
        let snapshot = self.state.borrow_mut().pending_snapshot.take();
        if let Some(snapshot) = snapshot {
            self.try_send(snapshot, now_ms);
        }
    }

    /// Stop the session: detach the store subscription, mark
    /// [`SyncStatus::Terminated`]. Idempotent.
    pub fn stop(&self) {
        if self.terminated.replace(true) {
            return;
        }
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
        self.status.set(SyncStatus::Terminated);
    }

    fn on_store_notification(&self, snapshot: Value) {
        if self.terminated.get() || self.options.receive_only {
            return;
        }
        if self.state.borrow().applying_remote {
            return;
        }
        self.try_send(snapshot, self.clock.get());
    }

    fn try_send(&self, snapshot: Value, now_ms: u64) {
        let within_throttle = {
            let state = self.state.borrow();
            matches!(state.last_send_ms, Some(last) if now_ms.saturating_sub(last) < self.options.throttle_ms)
        };
        if within_throttle {
            self.state.borrow_mut().pending_snapshot = Some(snapshot);
            return;
        }

        let raw = diff(&self.state.borrow().last_sent_snapshot, &snapshot);
        let filtered = jods_proto::filter_diff(&raw, &self.options.allow_paths, &self.options.sensitive_keys);
        if filtered.is_empty() {
            self.state.borrow_mut().last_sent_snapshot = snapshot;
            return;
        }
        if let Some(filter) = &self.options.filter {
            if !filter(&filtered) {
                return;
            }
        }

        let message = jods_proto::SyncMessage {
            client_id: self.client_id.clone(),
            prefix: self.options.prefix.clone(),
            timestamp: now_ms,
            changes: filtered.clone(),
        };
        let encoded = match jods_proto::encode(&message) {
            Ok(text) => text,
            Err(err) => {
                self.report_error(SyncError::Encode(err));
                return;
            }
        };
        if let Some(max) = self.options.max_message_size {
            if encoded.len() > max {
                self.report_error(SyncError::MessageTooLarge {
                    size: encoded.len(),
                    max,
                });
                return;
            }
        }

        if let Some(hook) = &self.options.on_diff_send {
            hook(&filtered);
        }
        if let Err(err) = self.transport.borrow().send(&encoded) {
            self.report_error(SyncError::Transport(err.0));
            return;
        }

        let mut state = self.state.borrow_mut();
        state.last_sent_snapshot = snapshot;
        state.last_send_ms = Some(now_ms);
    }

    fn handle_transport_event(&self, event: TransportEvent, now_ms: u64) {
        match event {
            TransportEvent::Open => {
                if self.status.get() != SyncStatus::Terminated {
                    self.status.set(SyncStatus::Connecting);
                }
            }
            TransportEvent::Message(text) => {
                if matches!(self.status.get(), SyncStatus::Disconnected | SyncStatus::Connecting) {
                    self.status.set(SyncStatus::Connected);
                }
                self.handle_message(&text, now_ms);
            }
            TransportEvent::Error(message) => {
                self.status.set(SyncStatus::Error);
                self.report_error(SyncError::Transport(message));
            }
            TransportEvent::Close => {
                if self.status.get() != SyncStatus::Terminated {
                    self.status.set(SyncStatus::Disconnected);
                }
            }
        }
    }

    fn handle_message(&self, text: &str, _now_ms: u64) {
        let message = match jods_proto::decode(text) {
            Ok(message) => message,
            Err(err) => {
                self.report_error(SyncError::Decode(err));
                return;
            }
        };

        if message.client_id == self.client_id {
            return; // our own echo
        }
        if let Some(expected) = &self.options.prefix {
            if message.prefix.as_deref() != Some(expected.as_str()) {
                return;
            }
        }
        if let Some(validate) = &self.options.validate_schema {
            if let Err(err) = validate(&message.changes) {
                self.report_error(SyncError::SchemaValidation(err));
                return;
            }
        }

        let filtered = jods_proto::filter_diff(&message.changes, &self.options.allow_paths, &self.options.sensitive_keys);
        let to_apply = match &self.options.on_patch_receive {
            Some(hook) => match hook(&filtered) {
                Some(d) => d,
                None => return,
            },
            None => filtered,
        };

        self.state.borrow_mut().applying_remote = true;
        let result = self.store.apply_patch(&to_apply);
        self.state.borrow_mut().applying_remote = false;

        match result {
            Ok(()) => {
                self.state.borrow_mut().last_sent_snapshot = self.store.snapshot();
            }
            Err(err) => self.report_error(SyncError::Patch(err)),
        }
    }

    fn report_error(&self, err: SyncError) {
        tracing::warn!(%err, "sync error");
        if let Some(hook) = &self.options.on_error {
            hook(&err);
        }
    }
}

fn random_client_id() -> String {
    let value: u128 = rand::random();
    format!("{value:032x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelTransport;
    use jods_store::StoreBuilder;
    use std::time::Duration;

    #[test]
    fn does_not_echo_its_own_message_back_into_the_store() {
        let store = StoreBuilder::new()
            .field("count", Value::Number(1.0))
            .build();
        let (transport, handle) = ChannelTransport::pair();
        let engine = SyncEngine::start(
            &store,
            transport,
            SyncOptions {
                client_id: Some("self-id".to_string()),
                ..SyncOptions::default()
            },
        );

        let message = jods_proto::SyncMessage {
            client_id: "self-id".to_string(),
            prefix: None,
            timestamp: 0,
            changes: diff(&Value::object(), &Value::object()),
        };
        let encoded = jods_proto::encode(&message).unwrap();
        handle.events.send(TransportEvent::Message(encoded)).unwrap();

        engine.drain_inbound(10);
        assert_eq!(store.get("count"), Some(Value::Number(1.0)));
    }

    #[test]
    fn sensitive_keys_are_stripped_from_outbound_sends() {
        let store = StoreBuilder::new()
            .field("profile", Value::object())
            .build();
        let (transport, handle) = ChannelTransport::pair();
        let engine = SyncEngine::start(
            &store,
            transport,
            SyncOptions {
                sensitive_keys: vec![vec!["profile".to_string(), "ssn".to_string()]],
                throttle_ms: 0,
                ..SyncOptions::default()
            },
        );
        let _ = &engine;

        let mut profile = indexmap::IndexMap::new();
        profile.insert("name".to_string(), Value::from("Ada"));
        profile.insert("ssn".to_string(), Value::from("000-00-0000"));
        store.set("profile", Value::Object(profile));

        let sent = handle.sent.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(!sent.contains("000-00-0000"), "ssn leaked onto the wire: {sent}");
        assert!(sent.contains("Ada"));
    }

    #[test]
    fn oversized_outbound_messages_are_reported_and_dropped() {
        let store = StoreBuilder::new().field("blob", Value::from("")).build();
        let (transport, handle) = ChannelTransport::pair();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let errors_clone = Rc::clone(&errors);
        let engine = SyncEngine::start(
            &store,
            transport,
            SyncOptions {
                throttle_ms: 0,
                max_message_size: Some(16),
                on_error: Some(Box::new(move |err| {
                    errors_clone.borrow_mut().push(err.to_string());
                })),
                ..SyncOptions::default()
            },
        );
        let _ = &engine;

        store.set("blob", Value::from("this value is far longer than sixteen bytes"));

        assert!(handle.sent.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].contains("exceeds max_message_size"));
    }

    /// Spec.md §6's `allowKeys` is a bare top-level-key whitelist; a
    /// single-segment `allow_paths` entry is the same filter, so no
    /// separate field exists (see DESIGN.md).
    #[test]
    fn single_segment_allow_paths_blocks_other_top_level_keys() {
        let store = StoreBuilder::new()
            .field("todos", Value::Array(Vec::new()))
            .field(
                "user",
                Value::Object({
                    let mut map = indexmap::IndexMap::new();
                    map.insert("name".to_string(), Value::from("u"));
                    map.insert("role".to_string(), Value::from("admin"));
                    map
                }),
            )
            .build();
        let (transport, handle) = ChannelTransport::pair();
        let engine = SyncEngine::start(
            &store,
            transport,
            SyncOptions {
                allow_paths: vec![vec!["todos".to_string()]],
                throttle_ms: 0,
                ..SyncOptions::default()
            },
        );
        let _ = &engine;

        let mut user = indexmap::IndexMap::new();
        user.insert("name".to_string(), Value::from("changed"));
        user.insert("role".to_string(), Value::from("admin"));
        store.set("user", Value::Object(user));
        assert!(handle.sent.recv_timeout(Duration::from_millis(50)).is_err());

        store.set("todos", Value::Array(vec![Value::from("write spec")]));
        let sent = handle.sent.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(sent.contains("write spec"));
    }
}
