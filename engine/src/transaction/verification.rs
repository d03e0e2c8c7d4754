//! Transaction verification: structural checks and cryptographic validation.
//!
//! The engine runs [`verify_transaction`] on every blob a delegated signer
//! hands back, and the in-process ledger runs it on every submission. Checks
//! go from cheapest to most expensive.

use thiserror::Error;

use super::builder::Transaction;
use crate::config::TRANSACTION_VERSION;
use crate::crypto::keys::{Address, VaultPublicKey, VaultSignature};

/// Errors that can occur while building, encoding or verifying a transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unsupported transaction version {0}")]
    UnsupportedVersion(u16),

    #[error("transaction ID mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("transaction is unsigned")]
    MissingSignature,

    #[error("malformed signature: {reason}")]
    MalformedSignature { reason: String },

    #[error("invalid source address: {address}")]
    InvalidSourceAddress { address: String },

    #[error("signer key does not match source address {address}")]
    SignerMismatch { address: String },

    #[error("invalid signature: does not verify against source {source_address}")]
    InvalidSignature { source_address: String },

    #[error("validity window ends before the transaction timestamp")]
    InvalidValidityWindow,

    #[error("unknown vault function: {0}")]
    UnknownFunction(String),

    #[error("envelope encoding failed: {0}")]
    Envelope(String),
}

/// Verifies a signed transaction.
///
/// 1. **Version** equals the current transaction version.
/// 2. **Validity window** does not end before the timestamp.
/// 3. **ID** equals `sha256(signable_bytes)`.
/// 4. **Signature** is present, hex, and 64 bytes.
/// 5. **Source** parses as a `card1...` address.
/// 6. **Signer key** equals the key the source address encodes.
/// 7. **Ed25519** verification over the signable bytes.
///
/// Expiry against the wall clock is the ledger's concern, not checked here.
pub fn verify_transaction(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.version != TRANSACTION_VERSION {
        return Err(TransactionError::UnsupportedVersion(tx.version));
    }

    if tx.valid_until < tx.timestamp {
        return Err(TransactionError::InvalidValidityWindow);
    }

    let expected_id = tx.compute_id();
    if tx.id != expected_id {
        return Err(TransactionError::IdMismatch {
            expected: expected_id,
            actual: tx.id.clone(),
        });
    }

    let sig_hex = tx
        .signature
        .as_ref()
        .ok_or(TransactionError::MissingSignature)?;
    let signature =
        VaultSignature::from_hex(sig_hex).map_err(|e| TransactionError::MalformedSignature {
            reason: e.to_string(),
        })?;

    let source = Address::parse(&tx.source).map_err(|_| TransactionError::InvalidSourceAddress {
        address: tx.source.clone(),
    })?;

    // The embedded key must be the one the address encodes, otherwise
    // anyone could sign for anyone.
    let signer_key = tx
        .signer_public_key
        .as_deref()
        .map(VaultPublicKey::from_hex)
        .transpose()
        .map_err(|_| TransactionError::SignerMismatch {
            address: tx.source.clone(),
        })?
        .unwrap_or_else(|| source.public_key());
    if signer_key != source.public_key() {
        return Err(TransactionError::SignerMismatch {
            address: tx.source.clone(),
        });
    }

    if !signer_key.verify(&tx.signable_bytes(), &signature) {
        return Err(TransactionError::InvalidSignature {
            source_address: tx.source.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::VaultKeypair;
    use crate::transaction::builder::{ContractArg, TransactionBuilder, VaultFunction};
    use crate::transaction::signing::sign_transaction;

    fn valid_signed_tx() -> (Transaction, VaultKeypair) {
        let kp = VaultKeypair::generate();
        let mut tx = TransactionBuilder::new(VaultFunction::RevokeToken)
            .source(&kp.address())
            .contract("CVAULT")
            .arg(ContractArg::Address(kp.address().to_string()))
            .nonce(1)
            .build();
        sign_transaction(&mut tx, &kp);
        (tx, kp)
    }

    #[test]
    fn valid_transaction_passes() {
        let (tx, _) = valid_signed_tx();
        assert_eq!(verify_transaction(&tx), Ok(()));
    }

    #[test]
    fn rejects_unsigned() {
        let (mut tx, _) = valid_signed_tx();
        tx.signature = None;
        assert_eq!(
            verify_transaction(&tx),
            Err(TransactionError::MissingSignature)
        );
    }

    #[test]
    fn rejects_tampered_args() {
        let (mut tx, _) = valid_signed_tx();
        tx.args.push(ContractArg::U64(1));
        match verify_transaction(&tx) {
            Err(TransactionError::IdMismatch { .. }) => {}
            other => panic!("expected IdMismatch, got {:?}", other),
        }
    }

    #[test]
    fn rejects_tampered_args_with_recomputed_id() {
        let (mut tx, _) = valid_signed_tx();
        tx.nonce = 2;
        tx.id = tx.compute_id();
        match verify_transaction(&tx) {
            Err(TransactionError::InvalidSignature { .. }) => {}
            other => panic!("expected InvalidSignature, got {:?}", other),
        }
    }

    #[test]
    fn rejects_signature_from_other_key() {
        let (mut tx, _) = valid_signed_tx();
        let intruder = VaultKeypair::generate();
        sign_transaction(&mut tx, &intruder);
        match verify_transaction(&tx) {
            Err(TransactionError::SignerMismatch { .. }) => {}
            other => panic!("expected SignerMismatch, got {:?}", other),
        }
    }

    #[test]
    fn rejects_forged_signature_without_key_field() {
        let (mut tx, _) = valid_signed_tx();
        let intruder = VaultKeypair::generate();
        tx.signature = Some(intruder.sign(&tx.signable_bytes()).to_hex());
        tx.signer_public_key = None;
        match verify_transaction(&tx) {
            Err(TransactionError::InvalidSignature { .. }) => {}
            other => panic!("expected InvalidSignature, got {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_signature() {
        let (mut tx, _) = valid_signed_tx();
        tx.signature = Some("zz".into());
        assert!(matches!(
            verify_transaction(&tx),
            Err(TransactionError::MalformedSignature { .. })
        ));
    }

    #[test]
    fn rejects_bad_source() {
        let kp = VaultKeypair::generate();
        let mut tx = TransactionBuilder::new(VaultFunction::GetMode).nonce(1).build();
        sign_transaction(&mut tx, &kp);
        assert!(matches!(
            verify_transaction(&tx),
            Err(TransactionError::InvalidSourceAddress { .. })
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let kp = VaultKeypair::generate();
        let mut tx = TransactionBuilder::new(VaultFunction::GetMode)
            .version(99)
            .source(&kp.address())
            .build();
        sign_transaction(&mut tx, &kp);
        assert_eq!(
            verify_transaction(&tx),
            Err(TransactionError::UnsupportedVersion(99))
        );
    }
}
