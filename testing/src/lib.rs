//! # Charge Checkout Testing
//!
//! Testing utilities and helpers for the charge checkout workspace.
//!
//! This crate provides:
//! - Scriptable in-memory collaborators ([`mocks`])
//! - The [`ReducerTest`] Given-When-Then harness
//! - A [`StatusRecorder`] observer
//! - Fixture values for the common charge/payer/call setup
//!
//! ## Example
//!
//! ```ignore
//! use charge_checkout_testing::{fixtures, mocks::*, StatusRecorder};
//!
//! #[tokio::test]
//! async fn pays_the_charge() {
//!     let recorder = StatusRecorder::new();
//!     let wallet = Arc::new(MockWalletConnector::connecting(fixtures::payer()));
//!     // ...build the environment, construct the orchestrator with
//!     // recorder.callback(), submit, and assert on recorder.names()
//! }
//! ```

use charge_checkout_core::status::LifecycleStatus;
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory collaborators
pub mod mocks;


pub use reducer_test::{ReducerTest, assertions};

/// Values shared by most checkout tests
pub mod fixtures {
    use charge_checkout_core::types::{
        Address, ChainId, ChargeId, ContractCall, Receipt, Resolution, SubmissionId,
        TransactionHash,
    };

    /// Base mainnet
    #[must_use]
    pub const fn chain_id() -> ChainId {
        ChainId::new(8453)
    }

    /// The charge being paid
    #[must_use]
    pub fn charge_id() -> ChargeId {
        ChargeId::new("4f1c2d7e-charge")
    }

    /// The payer's wallet
    #[must_use]
    pub fn payer() -> Address {
        Address::new("0x1111111111111111111111111111111111111111")
    }

    /// A single call transferring to the commerce contract
    #[must_use]
    pub fn call_x() -> ContractCall {
        ContractCall::new(
            Address::new("0x2222222222222222222222222222222222222222"),
            "0xa9059cbb",
        )
    }

    /// Resolution paying the charge with [`call_x`]
    #[must_use]
    pub fn payable() -> Resolution {
        Resolution::with_calls(vec![call_x()])
    }

    /// Identifier the submitter assigns
    #[must_use]
    pub fn submission_id() -> SubmissionId {
        SubmissionId::new("batch-0001")
    }

    /// Hash of the transaction including the batch
    #[must_use]
    pub fn transaction_hash() -> TransactionHash {
        TransactionHash::new("0xabc123")
    }

    /// Receipt confirming [`transaction_hash`]
    #[must_use]
    pub const fn receipt(transaction_hash: TransactionHash) -> Receipt {
        Receipt::confirmed(transaction_hash, 19_000_000)
    }
}

/// Observer that keeps every status it is given
#[derive(Debug, Clone, Default)]
pub struct StatusRecorder {
    seen: Arc<Mutex<Vec<LifecycleStatus>>>,
}

impl StatusRecorder {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback to hand to the orchestrator or notifier
    #[must_use]
    pub fn callback(&self) -> impl Fn(&LifecycleStatus) + Send + Sync + use<> {
        let seen = Arc::clone(&self.seen);
        move |status| {
            seen.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(status.clone());
        }
    }

    /// Statuses received, in order
    #[must_use]
    pub fn statuses(&self) -> Vec<LifecycleStatus> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the statuses received, in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.statuses().iter().map(LifecycleStatus::name).collect()
    }

    /// Most recent status
    #[must_use]
    pub fn last(&self) -> Option<LifecycleStatus> {
        self.statuses().pop()
    }
}

/// Install a test-friendly tracing subscriber
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
