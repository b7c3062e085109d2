//! Collaborator traits injected into the checkout reducer.
//!
//! Each trait stands for an independently owned asynchronous provider. The
//! futures are boxed and `'static` so implementations can be shared as
//! `Arc<dyn Trait>` and awaited from spawned effects.
//!
//! # Example
//!
//! ```ignore
//! struct InjectedWallet { provider: Eip1193Provider }
//!
//! impl WalletConnector for InjectedWallet {
//!     fn connect(&self, hint: Option<&str>) -> CollaboratorFuture<Address> {
//!         let provider = self.provider.clone();
//!         Box::pin(async move { provider.request_accounts().await })
//!     }
//! }
//! ```

use crate::error::CollaboratorError;
use crate::types::{
    Address, CallsStatus, ChargeId, ContractCall, Receipt, Resolution, SubmissionId,
    TransactionHash,
};
use std::future::Future;
use std::pin::Pin;

/// Future returned by every collaborator call.
pub type CollaboratorFuture<T> = Pin<Box<dyn Future<Output = Result<T, CollaboratorError>> + Send>>;

/// Connects the payer's wallet.
pub trait WalletConnector: Send + Sync {
    /// Prompt for a connection, preferring the connector named by `hint`.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::UserRejected`] if the prompt is declined,
    /// [`CollaboratorError::ConnectionFailed`] otherwise.
    fn connect(&self, hint: Option<&str>) -> CollaboratorFuture<Address>;
}

/// Resolves a charge into the calls that pay it.
pub trait ContractResolver: Send + Sync {
    /// Resolve `charge_id` for the payer at `address`.
    ///
    /// Business outcomes (no calls, not enough funds) are reported inside the
    /// [`Resolution`], not as errors.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Network`] when the commerce backend is unreachable.
    fn resolve(&self, address: &Address, charge_id: &ChargeId) -> CollaboratorFuture<Resolution>;
}

/// Submits a batch of calls through the connected wallet.
pub trait BatchSubmitter: Send + Sync {
    /// Submit `calls` as one batch.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::UserRejected`] if signing is declined,
    /// [`CollaboratorError::SubmissionFailed`] otherwise.
    fn submit(&self, calls: Vec<ContractCall>) -> CollaboratorFuture<SubmissionId>;
}

/// Looks up what happened to an accepted submission.
pub trait SubmissionStatusPoller: Send + Sync {
    /// Poll once. The caller re-polls while the batch is
    /// [`CallsStatus::Pending`].
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Observation`] if the status could not be read.
    fn poll(&self, submission_id: &SubmissionId) -> CollaboratorFuture<CallsStatus>;
}

/// Waits for a transaction to be confirmed.
pub trait ReceiptWatcher: Send + Sync {
    /// Resolve once `transaction_hash` has a confirmed receipt.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Observation`] if the receipt could not be fetched.
    fn wait_for_receipt(&self, transaction_hash: &TransactionHash) -> CollaboratorFuture<Receipt>;
}

/// Browsing-context target for an opened link.
pub const NEW_CONTEXT_TARGET: &str = "_blank";

/// Window features isolating the opened context from the opener.
pub const ISOLATED_CONTEXT_FEATURES: &str = "noopener,noreferrer";

/// Request to open a viewable reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenLinkRequest {
    /// Absolute URL
    pub url: String,
    /// Browsing-context target
    pub target: &'static str,
    /// Window features
    pub features: &'static str,
}

impl OpenLinkRequest {
    /// Open `url` in a new context with no opener and no referrer
    pub fn isolated(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: NEW_CONTEXT_TARGET,
            features: ISOLATED_CONTEXT_FEATURES,
        }
    }
}

/// Opens receipt and funding references for the user.
pub trait LinkOpener: Send + Sync {
    /// Open the link. Failures are the opener's to report.
    fn open(&self, request: &OpenLinkRequest);
}
