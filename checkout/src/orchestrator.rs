//! Orchestrator facade over the checkout store.

use crate::notifier::Notifier;
use crate::reducer::{CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState};
use crate::status_store::StatusStore;
use charge_checkout_core::context::OrchestrationContext;
use charge_checkout_core::status::LifecycleStatus;
use charge_checkout_core::types::{Address, ChainId, ChargeId};
use charge_checkout_runtime::{EffectHandle, Store, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

type CheckoutStore = Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

type Observer = Arc<dyn Fn(&LifecycleStatus) + Send + Sync>;

/// What is being paid, and who is watching
#[derive(Clone)]
pub struct CheckoutParams {
    /// Chain the charge is paid on
    pub chain_id: ChainId,
    /// Charge to pay
    pub charge_id: ChargeId,
    /// Wallet already connected by the host, if any
    pub connected_address: Option<Address>,
    observer: Option<Observer>,
}

impl CheckoutParams {
    /// Parameters for paying `charge_id` on `chain_id`
    #[must_use]
    pub const fn new(chain_id: ChainId, charge_id: ChargeId) -> Self {
        Self {
            chain_id,
            charge_id,
            connected_address: None,
            observer: None,
        }
    }

    /// Start with a wallet the host has already connected
    #[must_use]
    pub fn with_connected_address(mut self, address: Address) -> Self {
        self.connected_address = Some(address);
        self
    }

    /// Observe every distinct status, starting with the initial one
    #[must_use]
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&LifecycleStatus) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }
}

impl fmt::Debug for CheckoutParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutParams")
            .field("chain_id", &self.chain_id)
            .field("charge_id", &self.charge_id)
            .field("connected_address", &self.connected_address)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Drives the checkout of one charge
///
/// Owns the store running [`CheckoutReducer`]. Dropping the orchestrator
/// cancels every outstanding collaborator call; their results are never
/// applied.
///
/// # Example
///
/// ```ignore
/// let orchestrator = Orchestrator::new(
///     CheckoutParams::new(ChainId::new(8453), charge_id).with_observer(render),
///     environment,
/// );
///
/// orchestrator.submit().await.wait().await;
/// ```
pub struct Orchestrator {
    store: CheckoutStore,
    status: StatusStore,
    shutdown_timeout: Duration,
    _notifier: Option<Notifier>,
}

impl Orchestrator {
    /// Create an orchestrator in the `init` status
    #[must_use]
    pub fn new(params: CheckoutParams, environment: CheckoutEnvironment) -> Self {
        let status = StatusStore::new();
        let notifier = params
            .observer
            .map(|observer| Notifier::attach(&status, move |s| observer(s)));

        let mut context = OrchestrationContext::new(params.chain_id, params.charge_id);
        context.address = params.connected_address;

        tracing::debug!(
            chain_id = context.chain_id.value(),
            charge_id = %context.charge_id,
            "Creating checkout orchestrator"
        );

        let shutdown_timeout = environment.config.shutdown_timeout;
        let capacity = environment.config.broadcast_capacity;
        let store = Store::with_broadcast_capacity(
            CheckoutState::new(status.clone(), context),
            CheckoutReducer,
            environment,
            capacity,
        );

        Self {
            store,
            status,
            shutdown_timeout,
            _notifier: notifier,
        }
    }

    /// Take the next step of the checkout
    ///
    /// Never fails: collaborator failures end up in the status or the
    /// side-channel message. The returned handle resolves once the attempt
    /// and everything it triggered (polling, receipt watching) has finished.
    #[tracing::instrument(skip(self))]
    pub async fn submit(&self) -> EffectHandle {
        match self.store.send(CheckoutAction::Submit).await {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(%error, "Submit after shutdown ignored");
                EffectHandle::completed()
            },
        }
    }

    /// Report an account switch or disconnect from the host
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
    pub async fn account_changed(&self, address: Option<Address>) -> Result<(), StoreError> {
        self.store
            .send(CheckoutAction::WalletAccountChanged { address })
            .await
            .map(drop)
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> LifecycleStatus {
        self.status.get()
    }

    /// The status store, for subscribing or watching
    #[must_use]
    pub const fn status_store(&self) -> &StatusStore {
        &self.status
    }

    /// Attach another observer; it is detached when the notifier drops
    pub fn observe<F>(&self, observer: F) -> Notifier
    where
        F: Fn(&LifecycleStatus) + Send + Sync + 'static,
    {
        Notifier::attach(&self.status, observer)
    }

    /// Transient message from the last attempt, if it failed
    pub async fn error_message(&self) -> Option<String> {
        self.store
            .state(|state| state.context.error_message.clone())
            .await
    }

    /// Snapshot of the orchestration context
    pub async fn context(&self) -> OrchestrationContext {
        self.store.state(|state| state.context.clone()).await
    }

    /// Every action produced by a collaborator call
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<CheckoutAction> {
        self.store.subscribe_actions()
    }

    /// Stop accepting input and wait for outstanding calls
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if calls were still running
    /// after the configured timeout; they are cancelled.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.store.shutdown(self.shutdown_timeout).await
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("status", &self.status.get())
            .field("pending_effects", &self.store.pending_effects())
            .finish_non_exhaustive()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.store.cancel_effects();
    }
}
