//! # AES-256-GCM Card Payload Sealing
//!
//! Authenticated encryption for card payloads. The output of [`encrypt`] is
//! the only representation of card data allowed to leave the process.
//!
//! ## Wire format
//!
//! ```text
//! ┌──────────┬──────────────────────┬──────────────┐
//! │ IV (12)  │ ciphertext (= |msg|) │ auth tag (16) │
//! └──────────┴──────────────────────┴──────────────┘
//! ```
//!
//! No associated data. The verifier that consumes these payloads runs in a
//! different runtime and splits them at exactly these offsets, so the
//! layout is fixed.
//!
//! ## Nonce management
//!
//! Every call draws a fresh 96-bit IV from the OS CSPRNG. A per-user key
//! seals a handful of payloads over its lifetime, nowhere near the 2^32
//! random-nonce bound for GCM.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH, MIN_PAYLOAD_LENGTH};

/// Errors that can occur while sealing or opening a payload.
///
/// Authentication failures are deliberately undifferentiated: a wrong key
/// and a flipped bit look the same from the outside.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes, got {actual}")]
    InvalidKeyLength { actual: usize },

    #[error("payload authentication failed -- wrong key or corrupted payload")]
    Authentication,

    #[error("payload too short: {actual} bytes, need at least {MIN_PAYLOAD_LENGTH}")]
    PayloadTooShort { actual: usize },

    #[error("encryption failed")]
    EncryptFailed,
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CipherError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CipherError::InvalidKeyLength { actual: key.len() });
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength { actual: key.len() })
}

/// Seals `plaintext` under `key`, returning `IV ‖ ciphertext ‖ tag`.
///
/// # Example
///
/// ```
/// use cardvault_engine::crypto::encryption::{decrypt, encrypt};
///
/// let key = [0x42u8; 32];
/// let sealed = encrypt(b"card payload", &key).unwrap();
/// assert_eq!(sealed.len(), 12 + 12 + 16);
/// assert_eq!(decrypt(&sealed, &key).unwrap(), b"card payload");
/// ```
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = cipher_for(key)?;

    let mut iv = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + plaintext.len() + AES_TAG_LENGTH);
    out.extend_from_slice(&iv);
    out.extend_from_slice(plaintext);

    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut out[AES_NONCE_LENGTH..])
        .map_err(|_| CipherError::EncryptFailed)?;
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Opens a payload produced by [`encrypt`].
///
/// The first 12 bytes are the IV, the last 16 the tag, everything between
/// is ciphertext. Any modification to any of the three regions fails with
/// [`CipherError::Authentication`].
pub fn decrypt(payload: &[u8], key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = cipher_for(key)?;
    if payload.len() < MIN_PAYLOAD_LENGTH {
        return Err(CipherError::PayloadTooShort {
            actual: payload.len(),
        });
    }

    let (iv, rest) = payload.split_at(AES_NONCE_LENGTH);
    let (ciphertext, tag) = rest.split_at(rest.len() - AES_TAG_LENGTH);

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer, Tag::from_slice(tag))
        .map_err(|_| CipherError::Authentication)?;
    Ok(buffer)
}
