//! A [`VaultKeypair`] can stand in for an external wallet: it answers the
//! delegated signing protocols exactly as a remote signer would. Handy for
//! tests and for running the delegated code path without a real wallet.

use async_trait::async_trait;

use super::{MessageSigner, SignerError, TransactionSigner};
use crate::crypto::keys::VaultKeypair;
use crate::transaction::{sign_transaction, Transaction};

#[async_trait]
impl TransactionSigner for VaultKeypair {
    async fn sign_transaction(&self, envelope: &[u8]) -> Result<Vec<u8>, SignerError> {
        let mut tx = Transaction::from_envelope(envelope)
            .map_err(|e| SignerError::Rejected(e.to_string()))?;
        sign_transaction(&mut tx, self);
        Ok(tx.to_envelope()?)
    }
}

#[async_trait]
impl MessageSigner for VaultKeypair {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(self.sign(message).as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn message_signature_is_deterministic() {
        let kp = VaultKeypair::from_seed(&[3u8; 32]);
        let a = kp.sign_message(b"cardvault:x:v1").await.unwrap();
        let b = kp.sign_message(b"cardvault:x:v1").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn refuses_non_envelope() {
        let kp = VaultKeypair::generate();
        let err = TransactionSigner::sign_transaction(&kp, b"\x00\x01").await.unwrap_err();
        assert!(matches!(err, SignerError::Rejected(_)));
    }
}
