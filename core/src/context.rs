//! Per-instance orchestration context.
//!
//! Everything the orchestrator and the bridge rules share lives here, owned by
//! the reducer state. Results of asynchronous calls are matched against the
//! [`AttemptId`] or [`SubmissionId`] captured when the call was made; a result
//! that does not match the current one belongs to a superseded attempt.

use crate::types::{Address, ChainId, ChargeId, ContractCall, SubmissionId, TransactionHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one `submit()` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(u64);

impl AttemptId {
    /// Raw sequence number
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Mutable state shared by the submit flow and the bridge rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationContext {
    /// Chain the charge is paid on
    pub chain_id: ChainId,
    /// Charge being paid
    pub charge_id: ChargeId,
    /// Connected wallet, once known
    pub address: Option<Address>,
    /// Calls from the most recent successful resolution
    pub resolved_calls: Option<Vec<ContractCall>>,
    /// Set by resolution, consumed by the attempt that reads it
    pub insufficient_balance: bool,
    /// Submission accepted for the current attempt
    pub submission_id: Option<SubmissionId>,
    /// Transaction that included the current submission
    pub transaction_hash: Option<TransactionHash>,
    /// Side-channel message for transient display
    pub error_message: Option<String>,
    in_flight: Option<AttemptId>,
    attempts: u64,
}

impl OrchestrationContext {
    /// Fresh context for a charge on a chain
    #[must_use]
    pub const fn new(chain_id: ChainId, charge_id: ChargeId) -> Self {
        Self {
            chain_id,
            charge_id,
            address: None,
            resolved_calls: None,
            insufficient_balance: false,
            submission_id: None,
            transaction_hash: None,
            error_message: None,
            in_flight: None,
            attempts: 0,
        }
    }

    /// Start a new attempt.
    ///
    /// Returns `None` if another attempt is still in flight.
    pub fn begin_attempt(&mut self) -> Option<AttemptId> {
        if self.in_flight.is_some() {
            return None;
        }
        self.attempts += 1;
        let attempt = AttemptId(self.attempts);
        self.in_flight = Some(attempt);
        self.error_message = None;
        Some(attempt)
    }

    /// The attempt currently in flight
    #[must_use]
    pub const fn in_flight(&self) -> Option<AttemptId> {
        self.in_flight
    }

    /// Whether `attempt` is the one in flight
    #[must_use]
    pub fn is_current_attempt(&self, attempt: AttemptId) -> bool {
        self.in_flight == Some(attempt)
    }

    /// Whether `submission_id` belongs to the current submission
    #[must_use]
    pub fn is_current_submission(&self, submission_id: &SubmissionId) -> bool {
        self.submission_id.as_ref() == Some(submission_id)
    }

    /// Close the in-flight attempt
    pub const fn finish_attempt(&mut self) {
        self.in_flight = None;
    }

    /// Store a resolution. An empty call list counts as no list.
    pub fn record_resolution(&mut self, calls: Vec<ContractCall>, insufficient_balance: bool) {
        self.resolved_calls = if calls.is_empty() { None } else { Some(calls) };
        self.insufficient_balance = insufficient_balance;
    }

    /// Read and clear the insufficient-balance flag
    pub const fn take_insufficient_balance(&mut self) -> bool {
        std::mem::replace(&mut self.insufficient_balance, false)
    }

    /// Forget a submission that was rejected or failed so the next attempt
    /// re-resolves from scratch
    pub fn clear_submission(&mut self) {
        self.resolved_calls = None;
        self.submission_id = None;
        self.transaction_hash = None;
    }

    /// Forget everything tied to the connected account.
    ///
    /// An accepted submission is already on its way to the chain and keeps
    /// being observed.
    pub fn reset(&mut self) {
        self.resolved_calls = None;
        self.insufficient_balance = false;
        self.in_flight = None;
    }
}
