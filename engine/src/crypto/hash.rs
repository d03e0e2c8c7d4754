//! # Hashing Utilities
//!
//! SHA-256 is the only hash the engine uses. It indexes tokens, derives
//! encryption keys, and identifies transactions, and the verifier on the
//! other side of the vault speaks nothing else.
//!
//! The token hash is always computed over the *plaintext* canonical card
//! serialization. Hashing the ciphertext would give a different hash on
//! every encryption (the IV is random), which defeats indexing.

use sha2::{Digest, Sha256};

use crate::config::HASH_OUTPUT_LENGTH;

/// SHA-256 digest as a fixed-size array.
///
/// # Example
///
/// ```
/// use cardvault_engine::crypto::hash::sha256;
///
/// let digest = sha256(b"cardvault");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; HASH_OUTPUT_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over several slices, as if they were concatenated.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; HASH_OUTPUT_LENGTH] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Hex-encoded SHA-256, for display and transaction ids.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let expected = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(sha256_hex(b""), expected);
    }

    #[test]
    fn test_sha256_abc_vector() {
        let expected = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(sha256_hex(b"abc"), expected);
    }

    #[test]
    fn sha256_deterministic() {
        assert_eq!(sha256(b"card"), sha256(b"card"));
        assert_ne!(sha256(b"card"), sha256(b"cards"));
    }

    #[test]
    fn test_multi_matches_concatenation() {
        assert_eq!(sha256_multi(&[b"card", b"vault"]), sha256(b"cardvault"));
        assert_eq!(sha256_multi(&[]), sha256(b""));
    }
}
