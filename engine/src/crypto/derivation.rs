//! # Encryption Key Derivation
//!
//! Turns the credential a session holds into the 256-bit AES key that seals
//! its card payloads.
//!
//! ```text
//! direct:     key = SHA-256(seed)                         (raw secret)
//! delegated:  key = SHA-256(sign("cardvault:<user>:v1"))  (wallet signs)
//! ```
//!
//! The delegated path relies on Ed25519 being deterministic: the same
//! wallet signing the same challenge always produces the same signature,
//! so the same key, without the engine ever seeing the secret.
//!
//! The key is derived at most once per [`KeyDeriver`]. Concurrent callers
//! share one in-flight derivation, so a wallet prompt is never shown twice
//! for the same session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;
use zeroize::Zeroizing;

use super::hash::sha256;
use super::keys::Address;
use crate::config::{AES_KEY_LENGTH, KEY_DERIVATION_NAMESPACE, KEY_DERIVATION_VERSION};
use crate::signer::{MessageSigner, SignerError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    /// Neither a raw secret nor a message signer is available.
    #[error("no key material: initialize the session with a secret or a message signer")]
    NoKeyMaterial,

    #[error("message signer returned an empty signature")]
    EmptySignature,

    #[error(transparent)]
    Signer(#[from] SignerError),
}

/// A derived 256-bit AES key. Zeroized on drop, never serialized, redacted
/// in `Debug`.
pub struct EncryptionKey(Zeroizing<[u8; AES_KEY_LENGTH]>);

impl EncryptionKey {
    fn from_digest(digest: [u8; AES_KEY_LENGTH]) -> Self {
        Self(Zeroizing::new(digest))
    }

    pub fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Direct path: `SHA-256(secret)`.
pub fn derive_from_secret(secret: &[u8]) -> EncryptionKey {
    EncryptionKey::from_digest(sha256(secret))
}

/// Delegated path, second half: `SHA-256(signature)`.
pub fn derive_from_signature(signature: &[u8]) -> EncryptionKey {
    EncryptionKey::from_digest(sha256(signature))
}

/// The user-scoped, versioned challenge a message signer is asked to sign.
pub fn challenge(user: &Address) -> String {
    format!(
        "{}:{}:{}",
        KEY_DERIVATION_NAMESPACE, user, KEY_DERIVATION_VERSION
    )
}

/// The credential a deriver works from.
pub enum KeyMaterial {
    Secret(Zeroizing<Vec<u8>>),
    Delegated {
        user: Address,
        signer: Arc<dyn MessageSigner>,
    },
    None,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret(<redacted>)"),
            Self::Delegated { user, .. } => write!(f, "Delegated({})", user),
            Self::None => f.write_str("None"),
        }
    }
}

/// Session-scoped, single-flight, memoizing key derivation.
#[derive(Debug)]
pub struct KeyDeriver {
    material: KeyMaterial,
    key: OnceCell<EncryptionKey>,
    signer_timeout: Duration,
}

impl KeyDeriver {
    pub fn new(material: KeyMaterial, signer_timeout: Duration) -> Self {
        Self {
            material,
            key: OnceCell::new(),
            signer_timeout,
        }
    }

    /// `true` when [`derive`](Self::derive) has something to work with.
    pub fn can_encrypt(&self) -> bool {
        !matches!(self.material, KeyMaterial::None)
    }

    pub fn is_derived(&self) -> bool {
        self.key.initialized()
    }

    /// Returns the session key, deriving it on first use.
    ///
    /// A failed derivation (cancelled prompt, timeout) leaves the cell
    /// empty, so the next call asks again.
    pub async fn derive(&self) -> Result<&EncryptionKey, DerivationError> {
        self.key.get_or_try_init(|| self.derive_uncached()).await
    }

    async fn derive_uncached(&self) -> Result<EncryptionKey, DerivationError> {
        match &self.material {
            KeyMaterial::Secret(secret) => {
                debug!("deriving encryption key from raw secret");
                Ok(derive_from_secret(secret))
            }
            KeyMaterial::Delegated { user, signer } => {
                debug!(user = %user, "requesting challenge signature for key derivation");
                let message = challenge(user);
                let signature = tokio::time::timeout(
                    self.signer_timeout,
                    signer.sign_message(message.as_bytes()),
                )
                .await
                .map_err(|_| SignerError::Timeout {
                    timeout_ms: self.signer_timeout.as_millis() as u64,
                })??;
                let signature = Zeroizing::new(signature);
                if signature.is_empty() {
                    return Err(DerivationError::EmptySignature);
                }
                Ok(derive_from_signature(&signature))
            }
            KeyMaterial::None => Err(DerivationError::NoKeyMaterial),
        }
    }

    /// Drops the cached key and the credential. The key bytes are zeroized
    /// as they drop.
    pub fn clear(&mut self) {
        self.key.take();
        self.material = KeyMaterial::None;
    }
}
