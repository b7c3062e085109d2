//! Single holder of the current [`LifecycleStatus`].
//!
//! `set` is a total replacement. Subscribers are called synchronously, in
//! subscription order, before `set` returns; async consumers use
//! [`StatusStore::watch`] instead.

use charge_checkout_core::status::LifecycleStatus;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;

/// Callback invoked with every status passed to [`StatusStore::set`]
pub type StatusCallback = Arc<dyn Fn(&LifecycleStatus) + Send + Sync>;

struct Inner {
    current: watch::Sender<LifecycleStatus>,
    subscribers: Mutex<Vec<(u64, StatusCallback)>>,
    next_id: AtomicU64,
}

impl Inner {
    fn remove(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(subscriber, _)| *subscriber != id);
    }
}

/// Shared handle to the current status
///
/// Clones share the same status.
#[derive(Clone)]
pub struct StatusStore {
    inner: Arc<Inner>,
}

impl StatusStore {
    /// Store starting at [`LifecycleStatus::Init`]
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(LifecycleStatus::Init);
        Self {
            inner: Arc::new(Inner {
                current,
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Current status
    #[must_use]
    pub fn get(&self) -> LifecycleStatus {
        self.inner.current.borrow().clone()
    }

    /// Replace the status and notify every subscriber
    pub fn set(&self, status: LifecycleStatus) {
        let previous = self.inner.current.send_replace(status.clone());
        tracing::debug!(from = %previous, to = %status, "Status set");
        metrics::counter!("checkout.status.transitions", "status" => status.name()).increment(1);

        // Callbacks run outside the lock so they may unsubscribe.
        let subscribers: Vec<StatusCallback> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            callback(&status);
        }
    }

    /// Register `callback` for every subsequent `set`
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LifecycleStatus) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Receiver observing the latest status
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<LifecycleStatus> {
        self.inner.current.subscribe()
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStore")
            .field("current", &*self.inner.current.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Registration returned by [`StatusStore::subscribe`]
///
/// The callback stays registered until this is dropped or
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    store: Weak<Inner>,
}

impl Subscription {
    /// Remove the callback
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
