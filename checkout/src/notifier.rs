//! Re-emits every distinct status to an external observer.

use crate::status_store::{StatusStore, Subscription};
use charge_checkout_core::status::LifecycleStatus;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Observer attached to a [`StatusStore`]
///
/// The observer is called once with the status current at attach time, then
/// once per change. Two statuses are the same only if their payloads are
/// equal, so `error` followed by an `error` with another code is reported
/// twice. Detaches on drop.
///
/// The observer runs synchronously inside `StatusStore::set` and must not set
/// the status itself.
pub struct Notifier {
    _subscription: Subscription,
}

impl Notifier {
    /// Attach `observer` to `store`
    pub fn attach<F>(store: &StatusStore, observer: F) -> Self
    where
        F: Fn(&LifecycleStatus) + Send + Sync + 'static,
    {
        let emitter = Arc::new(Emitter {
            last: Mutex::new(None),
            observer: Box::new(observer),
        });

        // Held until the current status is delivered, so a concurrent `set`
        // is emitted after it rather than before.
        let mut last = emitter.last.lock().unwrap_or_else(PoisonError::into_inner);

        let from_store = Arc::clone(&emitter);
        let subscription = store.subscribe(move |status| from_store.emit(status));

        emitter.deliver(&mut last, &store.get());
        drop(last);

        Self {
            _subscription: subscription,
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

struct Emitter {
    last: Mutex<Option<LifecycleStatus>>,
    observer: Box<dyn Fn(&LifecycleStatus) + Send + Sync>,
}

impl Emitter {
    fn emit(&self, status: &LifecycleStatus) {
        // Held while the observer runs so emissions never interleave.
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        self.deliver(&mut last, status);
    }

    fn deliver(&self, last: &mut Option<LifecycleStatus>, status: &LifecycleStatus) {
        if last.as_ref() == Some(status) {
            tracing::trace!(%status, "Suppressed repeated status");
            return;
        }
        *last = Some(status.clone());
        (self.observer)(status);
    }
}
