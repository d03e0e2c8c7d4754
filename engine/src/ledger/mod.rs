//! # Ledger Access
//!
//! The vault is a smart contract; the engine reaches it through a ledger.
//! [`LedgerClient`] is the seam: four calls, nothing else.
//!
//! ```text
//! account_sequence   — current sequence of an account (nonce = sequence + 1)
//! simulate           — run a read-only call, return the contract's value
//! submit             — send a signed transaction, returns its id
//! transaction_status — poll a submitted transaction
//! ```
//!
//! Two implementations:
//!
//! - [`RpcLedgerClient`]: JSON-RPC 2.0 over HTTP.
//! - `InMemoryLedger`: an in-process ledger that hosts the vault and
//!   access-mode contracts with their documented rules. For tests and
//!   local runs, behind the `test-util` feature.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod rpc;

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryLedger;
pub use rpc::{RpcError, RpcLedgerClient, RpcRequest, RpcResponse};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keys::Address;
use crate::transaction::Transaction;

/// Errors a ledger call can produce.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("contract not found: {0}")]
    ContractNotFound(String),

    /// The ledger or the contract refused the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The ledger could not be reached or did not answer.
    #[error("ledger unreachable: {0}")]
    Transport(String),

    /// The ledger answered with something we could not interpret.
    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Pending,
    NotFound,
    Success {
        ledger: u64,
        #[serde(rename = "returnValue", default)]
        return_value: serde_json::Value,
    },
    Failed {
        reason: String,
    },
}

impl TxStatus {
    /// `true` once polling can stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. })
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn account_sequence(&self, address: &Address) -> Result<u64, LedgerError>;

    /// Executes a read-only call without changing ledger state.
    async fn simulate(&self, tx: &Transaction) -> Result<serde_json::Value, LedgerError>;

    /// Submits a signed transaction. Acceptance is not success: poll
    /// [`transaction_status`](Self::transaction_status) for the outcome.
    async fn submit(&self, tx: &Transaction) -> Result<String, LedgerError>;

    async fn transaction_status(&self, tx_id: &str) -> Result<TxStatus, LedgerError>;
}
