//! # Signer Abstraction
//!
//! A session signs transactions one of two ways:
//!
//! - [`Signer::Local`]: the session holds a [`VaultKeypair`] and signs in
//!   process, synchronously.
//! - [`Signer::Delegated`]: the key lives elsewhere (a browser wallet, a
//!   hardware device, a remote service). The session hands over the JSON
//!   envelope of the unsigned transaction and awaits a signed one. This can
//!   take minutes if a human is in the loop, and the human can say no.
//!
//! Whatever comes back from a delegated signer is verified before it is
//! trusted: it must be the same transaction, validly signed by the source.
//!
//! Delegated *message* signing ([`MessageSigner`]) is a separate capability
//! used only by key derivation.

mod local;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::keys::VaultKeypair;
use crate::transaction::{sign_transaction, verify_transaction, Transaction, TransactionError};

/// Errors from either signer variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    /// The user dismissed the signing prompt. Distinct from every other
    /// failure so callers can offer a retry.
    #[error("signing request cancelled by the user")]
    UserCancelled,

    #[error("signer rejected the request: {0}")]
    Rejected(String),

    #[error("signer did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("signer returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("signer unavailable: {0}")]
    Unavailable(String),

    #[error("could not encode transaction for signing: {0}")]
    Envelope(#[from] TransactionError),
}

/// An external capability that signs transaction envelopes.
///
/// Receives [`Transaction::to_envelope`] bytes, returns the envelope of the
/// same transaction with `signature` and `signer_public_key` filled in.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, envelope: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// An external capability that signs arbitrary messages with the identity's
/// key. Returns the raw signature bytes.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// The signing capability a session holds. At most one per session.
#[derive(Clone)]
pub enum Signer {
    Local(VaultKeypair),
    Delegated(Arc<dyn TransactionSigner>),
}

impl Signer {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Signs `tx`, bounding a delegated signer's wait by `timeout`.
    pub async fn sign(
        &self,
        mut tx: Transaction,
        timeout: Duration,
    ) -> Result<Transaction, SignerError> {
        match self {
            Self::Local(keypair) => {
                sign_transaction(&mut tx, keypair);
                Ok(tx)
            }
            Self::Delegated(signer) => {
                let envelope = tx.to_envelope()?;
                debug!(tx_id = %tx.id, function = %tx.function, "requesting delegated signature");

                let response =
                    match tokio::time::timeout(timeout, signer.sign_transaction(&envelope)).await {
                        Ok(Ok(bytes)) => bytes,
                        Ok(Err(SignerError::UserCancelled)) => {
                            warn!(tx_id = %tx.id, "delegated signature cancelled by user");
                            return Err(SignerError::UserCancelled);
                        }
                        Ok(Err(e)) => return Err(e),
                        Err(_) => {
                            return Err(SignerError::Timeout {
                                timeout_ms: timeout.as_millis() as u64,
                            })
                        }
                    };

                let signed = Transaction::from_envelope(&response)
                    .map_err(|e| SignerError::InvalidResponse(e.to_string()))?;
                if signed.id != tx.id {
                    return Err(SignerError::InvalidResponse(format!(
                        "signer returned transaction {} instead of {}",
                        signed.id, tx.id
                    )));
                }
                verify_transaction(&signed)
                    .map_err(|e| SignerError::InvalidResponse(e.to_string()))?;
                Ok(signed)
            }
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(kp) => f.debug_tuple("Local").field(kp).finish(),
            Self::Delegated(_) => f.write_str("Delegated(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{ContractArg, TransactionBuilder, VaultFunction};

    fn unsigned(kp: &VaultKeypair) -> Transaction {
        TransactionBuilder::new(VaultFunction::RevokeToken)
            .source(&kp.address())
            .contract("CVAULT")
            .arg(ContractArg::Address(kp.address().to_string()))
            .nonce(1)
            .build()
    }

    struct Cancelling;

    #[async_trait]
    impl TransactionSigner for Cancelling {
        async fn sign_transaction(&self, _envelope: &[u8]) -> Result<Vec<u8>, SignerError> {
            Err(SignerError::UserCancelled)
        }
    }

    struct Stalling;

    #[async_trait]
    impl TransactionSigner for Stalling {
        async fn sign_transaction(&self, _envelope: &[u8]) -> Result<Vec<u8>, SignerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(SignerError::Unavailable("unreachable".into()))
        }
    }

    /// Signs a different transaction than the one it was asked to sign.
    struct Swapping(VaultKeypair);

    #[async_trait]
    impl TransactionSigner for Swapping {
        async fn sign_transaction(&self, envelope: &[u8]) -> Result<Vec<u8>, SignerError> {
            let mut tx = Transaction::from_envelope(envelope)?;
            tx.nonce += 1;
            tx.id = tx.compute_id();
            sign_transaction(&mut tx, &self.0);
            Ok(tx.to_envelope()?)
        }
    }

    struct Garbage;

    #[async_trait]
    impl TransactionSigner for Garbage {
        async fn sign_transaction(&self, _envelope: &[u8]) -> Result<Vec<u8>, SignerError> {
            Ok(b"{}".to_vec())
        }
    }

    #[tokio::test]
    async fn local_signer_signs_in_process() {
        let kp = VaultKeypair::generate();
        let signer = Signer::Local(kp.clone());
        let tx = signer.sign(unsigned(&kp), Duration::from_secs(1)).await.unwrap();
        assert_eq!(verify_transaction(&tx), Ok(()));
    }

    #[tokio::test]
    async fn delegated_keypair_signer_roundtrips_envelope() {
        let kp = VaultKeypair::generate();
        let signer = Signer::Delegated(Arc::new(kp.clone()));
        let tx = unsigned(&kp);
        let id = tx.id.clone();
        let signed = signer.sign(tx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(signed.id, id);
        assert!(signed.is_signed());
    }

    #[tokio::test]
    async fn cancellation_is_distinguishable() {
        let kp = VaultKeypair::generate();
        let signer = Signer::Delegated(Arc::new(Cancelling));
        let err = signer.sign(unsigned(&kp), Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, SignerError::UserCancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_signer_times_out() {
        let kp = VaultKeypair::generate();
        let signer = Signer::Delegated(Arc::new(Stalling));
        let err = signer
            .sign(unsigned(&kp), Duration::from_millis(250))
            .await
            .unwrap_err();
        assert_eq!(err, SignerError::Timeout { timeout_ms: 250 });
    }

    #[tokio::test]
    async fn swapped_transaction_is_rejected() {
        let kp = VaultKeypair::generate();
        let signer = Signer::Delegated(Arc::new(Swapping(kp.clone())));
        let err = signer.sign(unsigned(&kp), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SignerError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn signature_by_wrong_identity_is_rejected() {
        let kp = VaultKeypair::generate();
        let other = VaultKeypair::generate();
        let signer = Signer::Delegated(Arc::new(other));
        let err = signer.sign(unsigned(&kp), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SignerError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn garbage_response_is_rejected() {
        let kp = VaultKeypair::generate();
        let signer = Signer::Delegated(Arc::new(Garbage));
        let err = signer.sign(unsigned(&kp), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SignerError::InvalidResponse(_)));
    }

    #[test]
    fn debug_hides_delegate() {
        let kp = VaultKeypair::generate();
        assert_eq!(
            format!("{:?}", Signer::Delegated(Arc::new(kp.clone()))),
            "Delegated(..)"
        );
        assert!(format!("{:?}", Signer::Local(kp)).starts_with("Local(VaultKeypair(pub="));
    }
}
