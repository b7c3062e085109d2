//! The lifecycle status exposed to checkout consumers.
//!
//! Exactly one [`LifecycleStatus`] variant is active at any time. Every
//! transition replaces the whole value; there is no partial update API.
//!
//! The serialized form is adjacently tagged so a consumer can address
//! `statusName` and `statusData.code` directly:
//!
//! ```json
//! { "statusName": "error",
//!   "statusData": { "code": "insufficient_balance", "error": "...", "message": "..." } }
//! ```

use crate::types::Receipt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message shown when the wallet holder declines a prompt.
pub const USER_REJECTED_MESSAGE: &str = "Request denied.";

/// Message attached to every escalated failure that is not a funds problem.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Message attached to the `insufficient_balance` error.
pub const INSUFFICIENT_BALANCE_MESSAGE: &str =
    "You don't have enough funds. Add funds and try again.";

/// Raw error recorded with the `insufficient_balance` code.
pub const INSUFFICIENT_BALANCE_ERROR: &str = "User has insufficient balance";

/// Raw error recorded with the `contracts_unavailable` code.
pub const CONTRACTS_UNAVAILABLE_ERROR: &str = "Contracts are not available";

/// Machine-readable failure code carried in `statusData.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The payer cannot cover the charge; the consumer may offer funding
    InsufficientBalance,
    /// Resolution succeeded without a usable call list
    ContractsUnavailable,
    /// Any other failure while connecting, resolving, or submitting
    UnclassifiedFailure,
}

impl ErrorCode {
    /// Wire representation of the code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientBalance => "insufficient_balance",
            Self::ContractsUnavailable => "contracts_unavailable",
            Self::UnclassifiedFailure => "unclassified_failure",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the `error` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatus {
    /// Failure code
    pub code: ErrorCode,
    /// Raw error, serialized for diagnostics
    pub error: String,
    /// Human-readable message for display
    pub message: String,
}

impl ErrorStatus {
    /// Build an error payload
    pub fn new(code: ErrorCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            error: error.into(),
            message: message.into(),
        }
    }

    /// The fixed `insufficient_balance` payload
    #[must_use]
    pub fn insufficient_balance() -> Self {
        Self::new(
            ErrorCode::InsufficientBalance,
            INSUFFICIENT_BALANCE_ERROR,
            INSUFFICIENT_BALANCE_MESSAGE,
        )
    }

    /// The fixed `contracts_unavailable` payload
    #[must_use]
    pub fn contracts_unavailable() -> Self {
        Self::new(
            ErrorCode::ContractsUnavailable,
            CONTRACTS_UNAVAILABLE_ERROR,
            GENERIC_ERROR_MESSAGE,
        )
    }
}

/// Single summary of checkout progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "statusName",
    content = "statusData",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum LifecycleStatus {
    /// No action taken yet
    #[default]
    Init,
    /// A batch was accepted and awaits on-chain inclusion
    TransactionPending,
    /// Confirmed on-chain
    Success {
        /// Receipts in confirmation order; never empty
        transaction_receipts: Vec<Receipt>,
    },
    /// The current attempt failed; `submit()` may be called again
    Error(ErrorStatus),
}

impl LifecycleStatus {
    /// `success` carrying exactly one receipt
    #[must_use]
    pub fn success(receipt: Receipt) -> Self {
        Self::Success {
            transaction_receipts: vec![receipt],
        }
    }

    /// Name of the active variant, as serialized in `statusName`
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::TransactionPending => "transactionPending",
            Self::Success { .. } => "success",
            Self::Error(_) => "error",
        }
    }

    /// The error payload, if this is the `error` variant
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorStatus> {
        match self {
            Self::Error(status) => Some(status),
            _ => None,
        }
    }

    /// Whether this is an `error` with the given code
    #[must_use]
    pub fn is_error_with(&self, code: ErrorCode) -> bool {
        self.error().is_some_and(|status| status.code == code)
    }

    /// Whether this is the `success` variant
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(status) => write!(f, "error({})", status.code),
            other => f.write_str(other.name()),
        }
    }
}
