//! # Charge Checkout
//!
//! Lifecycle orchestration for paying a commerce charge on-chain: connect a
//! wallet, resolve the charge into contract calls, submit them as one batch,
//! follow the batch until its receipt is confirmed, and expose one coherent
//! [`LifecycleStatus`](charge_checkout_core::status::LifecycleStatus).
//!
//! ## Components
//!
//! - [`StatusStore`]: holds the current status; get, replace, subscribe, watch
//! - [`CheckoutReducer`]: the transition function. The `submit()` decision
//!   tree and the rules reacting to accepted batches, submission status, and
//!   receipts are arms of one `match`
//! - [`Orchestrator`]: the caller-facing facade; `submit()` never fails
//! - [`Notifier`]: reports every distinct status to an observer
//!
//! ## Example
//!
//! ```ignore
//! use charge_checkout::{CheckoutEnvironment, CheckoutParams, Orchestrator};
//!
//! let environment = CheckoutEnvironment::new(wallet, resolver, submitter, poller, receipts, links)
//!     .with_config(CheckoutConfig::from_env());
//!
//! let orchestrator = Orchestrator::new(
//!     CheckoutParams::new(ChainId::new(8453), ChargeId::new(charge))
//!         .with_observer(|status| println!("{status}")),
//!     environment,
//! );
//!
//! // Pay: connect, resolve, submit, then wait for the receipt.
//! orchestrator.submit().await.wait().await;
//!
//! // From `success` a second submit opens the receipt page.
//! orchestrator.submit().await;
//! ```

/// Status observer
pub mod notifier;

/// Orchestrator facade
pub mod orchestrator;

/// Checkout transition function
pub mod reducer;

/// Current status holder
pub mod status_store;

pub use notifier::Notifier;
pub use orchestrator::{CheckoutParams, Orchestrator};
pub use reducer::{CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState};
pub use status_store::{StatusCallback, StatusStore, Subscription};
