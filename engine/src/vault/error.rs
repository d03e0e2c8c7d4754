//! The error taxonomy surfaced by a [`VaultSession`](super::VaultSession).
//!
//! Lower-level errors convert with `From`, so the session body is a chain
//! of `?`. Two predicates tell callers what to offer the user:
//! [`VaultError::is_user_cancelled`] (offer "try again") and
//! [`VaultError::is_retryable`] (safe to retry automatically). Transient
//! failures of store, revoke and set_mode arrive as
//! [`VaultError::Unconfirmed`], which is never retryable.

use thiserror::Error;

use crate::card::CardError;
use crate::crypto::{CipherError, DerivationError, KeyError};
use crate::ledger::LedgerError;
use crate::signer::SignerError;
use crate::transaction::{TransactionError, VaultFunction};

#[derive(Debug, Error)]
pub enum VaultError {
    /// The card failed local validation. Never retried.
    #[error("invalid card: {0}")]
    InvalidCard(CardError),

    /// The session has no identity bound, or was closed.
    #[error("session not initialized: build a session with a secret or a public identity")]
    NotInitialized,

    /// The session lacks a credential the operation needs.
    #[error("missing capability: {0}")]
    Capability(String),

    /// The ledger or the vault refused the transaction, or could not be reached.
    #[error("transaction submission failed: {0}")]
    Submission(#[from] LedgerError),

    /// The vault already holds a non-revoked token for this user.
    #[error("a token already exists for this user; revoke it before storing a new card")]
    TokenAlreadyExists,

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// A state-changing call hit a transient failure. Its transaction may
    /// still land, so it is not a retry candidate.
    #[error("{function} not confirmed: {source}")]
    Unconfirmed {
        function: VaultFunction,
        #[source]
        source: Box<VaultError>,
    },

    /// The user dismissed a delegated signing prompt.
    #[error("request cancelled by the user")]
    UserCancelled,

    /// A delegated signer failed in some way other than cancellation or timeout.
    #[error("signing failed: {0}")]
    Signer(SignerError),

    /// Decryption tag mismatch: wrong key or corrupted payload.
    #[error("payload authentication failed -- wrong key or corrupted payload")]
    Authentication,

    #[error("invalid key length: {actual} bytes")]
    KeyLength { actual: usize },

    /// A feature was used that this session is not configured for.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// `true` for transport failures and timeouts of reads (retrieve, token
    /// status, get mode).
    ///
    /// Store, revoke and set_mode wrap the same failures in
    /// [`VaultError::Unconfirmed`], since a resubmission that races the first
    /// one can duplicate a ledger entry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Submission(LedgerError::Transport(_))
        )
    }

    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }

    /// Marks a transient failure of a state-changing call. Anything else
    /// passes through unchanged.
    pub(crate) fn unconfirmed(self, function: VaultFunction) -> Self {
        if self.is_retryable() {
            Self::Unconfirmed {
                function,
                source: Box::new(self),
            }
        } else {
            self
        }
    }

    pub(crate) fn timeout(operation: &str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

impl From<CardError> for VaultError {
    fn from(err: CardError) -> Self {
        match err {
            CardError::Serialization(msg) => Self::Serialization(msg),
            other => Self::InvalidCard(other),
        }
    }
}

impl From<CipherError> for VaultError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::InvalidKeyLength { actual } => Self::KeyLength { actual },
            // A payload shorter than IV plus tag cannot have come from us.
            CipherError::Authentication | CipherError::PayloadTooShort { .. } => {
                Self::Authentication
            }
            CipherError::EncryptFailed => Self::Serialization("encryption failed".into()),
        }
    }
}

impl From<SignerError> for VaultError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::UserCancelled => Self::UserCancelled,
            SignerError::Timeout { timeout_ms } => Self::Timeout {
                operation: "signer".into(),
                timeout_ms,
            },
            other => Self::Signer(other),
        }
    }
}

impl From<DerivationError> for VaultError {
    fn from(err: DerivationError) -> Self {
        match err {
            DerivationError::NoKeyMaterial => Self::Capability(
                "encryption requires a raw secret or a message signer".into(),
            ),
            DerivationError::EmptySignature => Self::Signer(SignerError::InvalidResponse(
                "empty challenge signature".into(),
            )),
            DerivationError::Signer(e) => e.into(),
        }
    }
}

impl From<TransactionError> for VaultError {
    fn from(err: TransactionError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<KeyError> for VaultError {
    fn from(err: KeyError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
