// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `onUpdate` plus the store→history→sync wiring helper (spec.md §4.G).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use jods_diff::Value;
use jods_history::{History, HistoryOptions};
use jods_store::{Store, SubscriptionId};
use jods_sync::{SyncEngine, SyncOptions, Transport};

/// Wrap [`Store::subscribe`] under the name spec.md §4.G gives it: a
/// callback that fires once synchronously with the current snapshot, then
/// again on every subsequent flush that touched a dependency it read.
/// Identical to `Store::subscribe` — this exists so call sites read the
/// way the specification describes them, not to add behavior.
pub fn on_update(store: &Rc<Store>, callback: impl FnMut(Value) + 'static) -> SubscriptionId {
    Store::subscribe(store, callback)
}

/// What to attach when wiring a store.
pub struct WireOptions<T: Transport> {
    /// Attach a history tracker with these options.
    pub history: Option<HistoryOptions>,
    /// Attach a sync engine over this transport with these options.
    pub sync: Option<(T, SyncOptions)>,
}

impl<T: Transport> Default for WireOptions<T> {
    fn default() -> Self {
        Self {
            history: None,
            sync: None,
        }
    }
}

/// The result of [`wire`]: keeps a store's history tracker and sync engine
/// alive and wired to it. Dropping this handle unsubscribes the history
/// forwarder and stops the sync engine — the same "cancellation handle,
/// idempotent, safe mid-flush" contract `jods-sync::SyncEngine::stop` and
/// `jods-history`'s travel guard already follow individually, composed
/// here over both.
pub struct WiringHandle<T: Transport + 'static> {
    store: Rc<Store>,
    subscription: Option<SubscriptionId>,
    history: Option<Rc<RefCell<History>>>,
    sync: Option<Rc<SyncEngine<T>>>,
}

impl<T: Transport + 'static> WiringHandle<T> {
    /// Wire `store` to whichever of history/sync `options` requests.
    #[must_use]
    pub fn wire(store: &Rc<Store>, options: WireOptions<T>) -> Self {
        let history = options
            .history
            .map(|opts| Rc::new(RefCell::new(History::new(store.snapshot(), opts, Instant::now()))));

        let sync = options
            .sync
            .map(|(transport, sync_options)| SyncEngine::start(store, transport, sync_options));

        let subscription = history.clone().map(|history| {
            on_update(store, move |snapshot| {
                history.borrow_mut().on_notification(snapshot, Instant::now());
            })
        });

        Self {
            store: Rc::clone(store),
            subscription,
            history,
            sync,
        }
    }

    /// The history tracker, if one was attached.
    #[must_use]
    pub fn history(&self) -> Option<&Rc<RefCell<History>>> {
        self.history.as_ref()
    }

    /// The sync engine, if one was attached.
    #[must_use]
    pub fn sync(&self) -> Option<&Rc<SyncEngine<T>>> {
        self.sync.as_ref()
    }
}

impl<T: Transport + 'static> Drop for WiringHandle<T> {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
        if let Some(sync) = &self.sync {
            sync.stop();
        }
    }
}
