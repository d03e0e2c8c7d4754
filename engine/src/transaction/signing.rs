//! Transaction signing with Ed25519 keypairs.
//!
//! Signing is a separate step from building because the key may not live
//! in this process at all: a delegated signer receives the envelope and
//! runs the equivalent of [`sign_transaction`] on its own side.

use super::builder::Transaction;
use crate::crypto::keys::VaultKeypair;

/// Signs a transaction in place and records the signer's public key.
///
/// The caller is responsible for `keypair` matching `tx.source`;
/// [`super::verify_transaction`] rejects a mismatch.
///
/// ```
/// use cardvault_engine::crypto::keys::VaultKeypair;
/// use cardvault_engine::transaction::{sign_transaction, TransactionBuilder, VaultFunction};
///
/// let kp = VaultKeypair::generate();
/// let mut tx = TransactionBuilder::new(VaultFunction::RevokeToken)
///     .source(&kp.address())
///     .contract("CVAULT")
///     .nonce(1)
///     .build();
/// sign_transaction(&mut tx, &kp);
/// assert!(tx.is_signed());
/// ```
pub fn sign_transaction<'a>(tx: &'a mut Transaction, keypair: &VaultKeypair) -> &'a Transaction {
    let signature = keypair.sign(&tx.signable_bytes());
    tx.signature = Some(signature.to_hex());
    tx.signer_public_key = Some(keypair.public_key().to_hex());
    tx
}
