//! In-memory collaborators.
//!
//! Every mock answers from a script: queued outcomes are used first, in
//! order, then the fallback answers every further call. Calls are recorded
//! so tests can assert on what the orchestrator asked for.

use charge_checkout_core::environment::{
    BatchSubmitter, CollaboratorFuture, ContractResolver, LinkOpener, OpenLinkRequest,
    ReceiptWatcher, SubmissionStatusPoller, WalletConnector,
};
use charge_checkout_core::error::CollaboratorError;
use charge_checkout_core::types::{
    Address, CallsStatus, ChargeId, ContractCall, Receipt, Resolution, SubmissionId,
    TransactionHash,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

/// Message wallets commonly return when a prompt is declined
pub const WALLET_REJECTION_TEXT: &str = "User rejected the request.";

type Outcome<T> = Result<T, CollaboratorError>;

/// Queued outcomes plus a fallback
#[derive(Debug)]
struct Script<T> {
    queued: Mutex<VecDeque<Outcome<T>>>,
    fallback: Outcome<T>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(fallback: Outcome<T>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, outcome: Outcome<T>) {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    fn next(&self) -> Outcome<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn record<T>(log: &Mutex<Vec<T>>, entry: T) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
}

fn snapshot<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Wallet connector answering from a script
#[derive(Debug)]
pub struct MockWalletConnector {
    script: Script<Address>,
    hints: Mutex<Vec<Option<String>>>,
}

impl MockWalletConnector {
    /// Always connects `address`
    #[must_use]
    pub fn connecting(address: Address) -> Self {
        Self::with_fallback(Ok(address))
    }

    /// Always declines the prompt
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_fallback(Err(CollaboratorError::user_rejected(WALLET_REJECTION_TEXT)))
    }

    /// Always fails with a connection error
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::with_fallback(Err(CollaboratorError::connection_failed(message)))
    }

    fn with_fallback(fallback: Outcome<Address>) -> Self {
        Self {
            script: Script::new(fallback),
            hints: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next call with `outcome`
    #[must_use]
    pub fn then(self, outcome: Result<Address, CollaboratorError>) -> Self {
        self.script.push(outcome);
        self
    }

    /// Number of `connect` calls
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Connector hints received, in call order
    #[must_use]
    pub fn hints(&self) -> Vec<Option<String>> {
        snapshot(&self.hints)
    }
}

impl WalletConnector for MockWalletConnector {
    fn connect(&self, hint: Option<&str>) -> CollaboratorFuture<Address> {
        record(&self.hints, hint.map(str::to_string));
        let outcome = self.script.next();
        Box::pin(async move { outcome })
    }
}

/// Contract resolver answering from a script
#[derive(Debug)]
pub struct MockContractResolver {
    script: Script<Resolution>,
    requests: Mutex<Vec<(Address, ChargeId)>>,
}

impl MockContractResolver {
    /// Always resolves to `resolution`
    #[must_use]
    pub fn resolving(resolution: Resolution) -> Self {
        Self::with_fallback(Ok(resolution))
    }

    /// Always fails with a network error
    #[must_use]
    pub fn unreachable(message: &str) -> Self {
        Self::with_fallback(Err(CollaboratorError::network(message)))
    }

    fn with_fallback(fallback: Outcome<Resolution>) -> Self {
        Self {
            script: Script::new(fallback),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next call with `outcome`
    #[must_use]
    pub fn then(self, outcome: Result<Resolution, CollaboratorError>) -> Self {
        self.script.push(outcome);
        self
    }

    /// Number of `resolve` calls
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// `(address, charge)` pairs received, in call order
    #[must_use]
    pub fn requests(&self) -> Vec<(Address, ChargeId)> {
        snapshot(&self.requests)
    }
}

impl ContractResolver for MockContractResolver {
    fn resolve(&self, address: &Address, charge_id: &ChargeId) -> CollaboratorFuture<Resolution> {
        record(&self.requests, (address.clone(), charge_id.clone()));
        let outcome = self.script.next();
        Box::pin(async move { outcome })
    }
}

/// Batch submitter answering from a script
#[derive(Debug)]
pub struct MockBatchSubmitter {
    script: Script<SubmissionId>,
    batches: Mutex<Vec<Vec<ContractCall>>>,
}

impl MockBatchSubmitter {
    /// Always accepts, assigning `submission_id`
    #[must_use]
    pub fn accepting(submission_id: SubmissionId) -> Self {
        Self::with_fallback(Ok(submission_id))
    }

    /// Always declines signing
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_fallback(Err(CollaboratorError::user_rejected(WALLET_REJECTION_TEXT)))
    }

    /// Always fails with a submission error
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::with_fallback(Err(CollaboratorError::submission_failed(message)))
    }

    fn with_fallback(fallback: Outcome<SubmissionId>) -> Self {
        Self {
            script: Script::new(fallback),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next call with `outcome`
    #[must_use]
    pub fn then(self, outcome: Result<SubmissionId, CollaboratorError>) -> Self {
        self.script.push(outcome);
        self
    }

    /// Number of `submit` calls
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Batches received, in call order
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<ContractCall>> {
        snapshot(&self.batches)
    }
}

impl BatchSubmitter for MockBatchSubmitter {
    fn submit(&self, calls: Vec<ContractCall>) -> CollaboratorFuture<SubmissionId> {
        record(&self.batches, calls);
        let outcome = self.script.next();
        Box::pin(async move { outcome })
    }
}

/// Status poller that reports `Pending` a fixed number of times, then the
/// inclusion
#[derive(Debug)]
pub struct MockSubmissionStatusPoller {
    script: Script<CallsStatus>,
    polled: Mutex<Vec<SubmissionId>>,
}

impl MockSubmissionStatusPoller {
    /// Reports `pending_polls` pending answers, then inclusion in
    /// `transaction_hash` for every later poll
    #[must_use]
    pub fn included_after(pending_polls: usize, transaction_hash: TransactionHash) -> Self {
        let poller = Self {
            script: Script::new(Ok(CallsStatus::Included { transaction_hash })),
            polled: Mutex::new(Vec::new()),
        };
        for _ in 0..pending_polls {
            poller.script.push(Ok(CallsStatus::Pending));
        }
        poller
    }

    /// Answer the next poll with `outcome`
    #[must_use]
    pub fn then(self, outcome: Result<CallsStatus, CollaboratorError>) -> Self {
        self.script.push(outcome);
        self
    }

    /// Number of polls
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Submission ids polled, in call order
    #[must_use]
    pub fn polled(&self) -> Vec<SubmissionId> {
        snapshot(&self.polled)
    }
}

impl SubmissionStatusPoller for MockSubmissionStatusPoller {
    fn poll(&self, submission_id: &SubmissionId) -> CollaboratorFuture<CallsStatus> {
        record(&self.polled, submission_id.clone());
        let outcome = self.script.next();
        Box::pin(async move { outcome })
    }
}

/// Receipt watcher confirming at a fixed block
///
/// A gated watcher holds every receipt until [`MockReceiptWatcher::release`]
/// is called, which lets tests observe `transactionPending` before
/// confirmation.
#[derive(Debug)]
pub struct MockReceiptWatcher {
    block_number: u64,
    gate: Option<Arc<Semaphore>>,
    failure: Option<CollaboratorError>,
    failures_left: AtomicUsize,
    watched: Mutex<Vec<TransactionHash>>,
}

impl MockReceiptWatcher {
    /// Confirms immediately at `block_number`
    #[must_use]
    pub const fn confirming_at(block_number: u64) -> Self {
        Self {
            block_number,
            gate: None,
            failure: None,
            failures_left: AtomicUsize::new(0),
            watched: Mutex::new(Vec::new()),
        }
    }

    /// Confirms at `block_number` once released
    #[must_use]
    pub fn gated_at(block_number: u64) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::confirming_at(block_number)
        }
    }

    /// Every wait fails with an observation error
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::failing_first(usize::MAX, message, 0)
    }

    /// The first `times` waits fail, later ones confirm at `block_number`
    #[must_use]
    pub fn failing_first(times: usize, message: &str, block_number: u64) -> Self {
        Self {
            failure: Some(CollaboratorError::observation(message)),
            failures_left: AtomicUsize::new(times),
            ..Self::confirming_at(block_number)
        }
    }

    /// Let one held receipt through
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Transaction hashes watched, in call order
    #[must_use]
    pub fn watched(&self) -> Vec<TransactionHash> {
        snapshot(&self.watched)
    }
}

impl ReceiptWatcher for MockReceiptWatcher {
    fn wait_for_receipt(&self, transaction_hash: &TransactionHash) -> CollaboratorFuture<Receipt> {
        record(&self.watched, transaction_hash.clone());

        let gate = self.gate.clone();
        let failure = self.failure.clone().filter(|_| {
            self.failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
        });
        let receipt = Receipt::confirmed(transaction_hash.clone(), self.block_number);

        Box::pin(async move {
            if let Some(error) = failure {
                return Err(error);
            }
            if let Some(gate) = gate {
                gate.acquire()
                    .await
                    .map_err(|_| CollaboratorError::observation("receipt gate closed"))?
                    .forget();
            }
            Ok(receipt)
        })
    }
}

/// Link opener that records every request
#[derive(Debug, Default)]
pub struct RecordingLinkOpener {
    opened: Mutex<Vec<OpenLinkRequest>>,
}

impl RecordingLinkOpener {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received, in call order
    #[must_use]
    pub fn opened(&self) -> Vec<OpenLinkRequest> {
        snapshot(&self.opened)
    }

    /// URLs opened, in call order
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.opened().into_iter().map(|request| request.url).collect()
    }
}

impl LinkOpener for RecordingLinkOpener {
    fn open(&self, request: &OpenLinkRequest) {
        record(&self.opened, request.clone());
    }
}
