//! Domain identifiers and value types shared by every checkout component.
//!
//! Identifiers are newtypes over their wire representation so that a charge id
//! can never be passed where a submission id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EVM chain identifier (e.g. `8453` for Base mainnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Create a chain id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a payment request issued by the commerce backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeId(String);

impl ChargeId {
    /// Create a charge id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChargeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded account address of the connected wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow the raw address
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle assigned by the batch submitter.
///
/// Correlates an accepted batch with its transaction hash and receipt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Create a submission id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of the on-chain transaction that included a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionHash(String);

impl TransactionHash {
    /// Create a transaction hash
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Borrow the raw hash
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One on-chain invocation to include in a submission batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    /// Target contract
    pub to: Address,
    /// ABI-encoded calldata, `0x`-prefixed
    pub data: String,
    /// Native value attached to the call, in wei
    #[serde(default)]
    pub value: u128,
}

impl ContractCall {
    /// Create a call without native value
    pub fn new(to: Address, data: impl Into<String>) -> Self {
        Self {
            to,
            data: data.into(),
            value: 0,
        }
    }

    /// Attach native value to the call
    #[must_use]
    pub const fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// Result of resolving a charge into callable contract invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Calls that satisfy the charge; may be empty when the resolver could not
    /// produce any
    #[serde(default)]
    pub calls: Vec<ContractCall>,
    /// Whether the payer lacks the funds to satisfy the charge
    #[serde(default)]
    pub insufficient_balance: bool,
}

impl Resolution {
    /// A resolution with calls and sufficient balance
    #[must_use]
    pub const fn with_calls(calls: Vec<ContractCall>) -> Self {
        Self {
            calls,
            insufficient_balance: false,
        }
    }

    /// A resolution flagging inadequate funds
    #[must_use]
    pub const fn insufficient(calls: Vec<ContractCall>) -> Self {
        Self {
            calls,
            insufficient_balance: true,
        }
    }
}

/// Outcome of one poll of the submission status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CallsStatus {
    /// The batch has not been included yet
    Pending,
    /// The batch was included in the given transaction
    Included {
        /// Hash of the including transaction
        transaction_hash: TransactionHash,
    },
}

/// Outcome recorded in a transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptOutcome {
    /// Execution succeeded
    Success,
    /// Execution reverted
    Reverted,
}

/// Confirmation artifact proving on-chain inclusion of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Hash of the confirmed transaction
    pub transaction_hash: TransactionHash,
    /// Block that included the transaction
    pub block_number: u64,
    /// Execution outcome
    pub status: ReceiptOutcome,
}

impl Receipt {
    /// A successful receipt for `transaction_hash` at `block_number`
    #[must_use]
    pub const fn confirmed(transaction_hash: TransactionHash, block_number: u64) -> Self {
        Self {
            transaction_hash,
            block_number,
            status: ReceiptOutcome::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn resolution_deserializes_resolver_payload() {
        let json = r#"{
            "calls": [{"to": "0xabc", "data": "0x1234", "value": 5}],
            "insufficientBalance": true
        }"#;

        let resolution: Resolution = serde_json::from_str(json).unwrap();
        assert!(resolution.insufficient_balance);
        assert_eq!(resolution.calls.len(), 1);
        assert_eq!(resolution.calls[0].to, Address::new("0xabc"));
        assert_eq!(resolution.calls[0].value, 5);
    }

    #[test]
    fn resolution_without_calls_defaults_to_empty() {
        let resolution: Resolution = serde_json::from_str("{}").unwrap();
        assert!(resolution.calls.is_empty());
        assert!(!resolution.insufficient_balance);
    }

    #[test]
    fn calls_status_is_tagged() {
        let status = CallsStatus::Included {
            transaction_hash: TransactionHash::new("0xfeed"),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "included");
        assert_eq!(json["transactionHash"], "0xfeed");
    }
}
