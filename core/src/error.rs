//! Failure taxonomy.
//!
//! Collaborators fail with [`CollaboratorError`]. The orchestrator classifies
//! every such failure into a [`CheckoutError`], which decides whether the
//! failure is surfaced as a side-channel message or escalated to an `error`
//! status.

use crate::status::{
    ErrorCode, ErrorStatus, GENERIC_ERROR_MESSAGE, INSUFFICIENT_BALANCE_MESSAGE,
    USER_REJECTED_MESSAGE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// EIP-1193 error code for a request the user declined.
pub const USER_REJECTED_RPC_CODE: i64 = 4001;

/// Phrases wallets use when a user declines a prompt.
const USER_REJECTION_PHRASES: &[&str] = &["user rejected", "user denied", "request denied"];

/// The step of an attempt that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Wallet connection
    Connect,
    /// Contract resolution
    Resolve,
    /// Batch submission
    Submit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Resolve => "resolve",
            Self::Submit => "submit",
        })
    }
}

/// Errors reported by external collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollaboratorError {
    /// The wallet holder declined a connection or signing prompt
    #[error("User rejected the request: {message}")]
    UserRejected {
        /// Wallet-provided detail
        message: String,
    },

    /// The wallet could not be connected
    #[error("Wallet connection failed: {message}")]
    ConnectionFailed {
        /// Failure detail
        message: String,
    },

    /// A network request failed
    #[error("Network error: {message}")]
    Network {
        /// Failure detail
        message: String,
    },

    /// The batch was not accepted
    #[error("Submission failed: {message}")]
    SubmissionFailed {
        /// Failure detail
        message: String,
        /// JSON-RPC error code, when the wallet returned one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i64>,
    },

    /// A status or receipt observation failed
    #[error("Observation failed: {message}")]
    Observation {
        /// Failure detail
        message: String,
    },
}

impl CollaboratorError {
    /// A user rejection
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::UserRejected {
            message: message.into(),
        }
    }

    /// A connection failure
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// A network failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// A submission failure without an RPC code
    pub fn submission_failed(message: impl Into<String>) -> Self {
        Self::SubmissionFailed {
            message: message.into(),
            code: None,
        }
    }

    /// An observation failure
    pub fn observation(message: impl Into<String>) -> Self {
        Self::Observation {
            message: message.into(),
        }
    }

    /// Whether this failure means the wallet holder declined the prompt.
    ///
    /// Wallets do not agree on how to report a rejection: besides the explicit
    /// variant, an EIP-1193 `4001` code or the usual phrasing inside another
    /// failure counts as a rejection.
    #[must_use]
    pub fn is_user_rejection(&self) -> bool {
        match self {
            Self::UserRejected { .. }
            | Self::SubmissionFailed {
                code: Some(USER_REJECTED_RPC_CODE),
                ..
            } => true,
            Self::ConnectionFailed { message } | Self::SubmissionFailed { message, .. } => {
                let lowered = message.to_lowercase();
                USER_REJECTION_PHRASES
                    .iter()
                    .any(|phrase| lowered.contains(phrase))
            },
            Self::Network { .. } | Self::Observation { .. } => false,
        }
    }
}

/// Classified checkout failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// A normal, retryable decline by the wallet holder
    #[error("user rejected the request during {step}")]
    UserRejected {
        /// Where the rejection happened
        step: Step,
    },

    /// The resolver reported inadequate funds
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Resolution produced no usable call list
    #[error("contracts unavailable")]
    ContractsUnavailable,

    /// Anything else
    #[error("{step} failed: {source}")]
    Unclassified {
        /// Where the failure happened
        step: Step,
        /// The collaborator failure
        source: CollaboratorError,
    },
}

impl CheckoutError {
    /// Classify a collaborator failure raised during `step`
    #[must_use]
    pub fn classify(step: Step, error: CollaboratorError) -> Self {
        if error.is_user_rejection() {
            Self::UserRejected { step }
        } else {
            Self::Unclassified {
                step,
                source: error,
            }
        }
    }

    /// Failure code, or `None` for failures that are not escalated
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::UserRejected { .. } => None,
            Self::InsufficientBalance => Some(ErrorCode::InsufficientBalance),
            Self::ContractsUnavailable => Some(ErrorCode::ContractsUnavailable),
            Self::Unclassified { .. } => Some(ErrorCode::UnclassifiedFailure),
        }
    }

    /// Message for the side channel
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::UserRejected { .. } => USER_REJECTED_MESSAGE,
            Self::InsufficientBalance => INSUFFICIENT_BALANCE_MESSAGE,
            Self::ContractsUnavailable | Self::Unclassified { .. } => GENERIC_ERROR_MESSAGE,
        }
    }

    /// The `error` status payload, or `None` when the failure stays off the
    /// status (user rejections)
    #[must_use]
    pub fn status(&self) -> Option<ErrorStatus> {
        match self {
            Self::UserRejected { .. } => None,
            Self::InsufficientBalance => Some(ErrorStatus::insufficient_balance()),
            Self::ContractsUnavailable => Some(ErrorStatus::contracts_unavailable()),
            Self::Unclassified { step, source } => Some(ErrorStatus::new(
                ErrorCode::UnclassifiedFailure,
                serialize_raw(*step, source),
                GENERIC_ERROR_MESSAGE,
            )),
        }
    }
}

#[derive(Serialize)]
struct RawFailure<'a> {
    step: Step,
    #[serde(flatten)]
    error: &'a CollaboratorError,
}

fn serialize_raw(step: Step, error: &CollaboratorError) -> String {
    serde_json::to_string(&RawFailure { step, error })
        .unwrap_or_else(|_| format!("{step}: {error}"))
}
