//! # Cryptographic Primitives
//!
//! Everything that touches key material or card ciphertext goes through
//! here. All of it is a thin, typed wrapper around audited crates:
//!
//! - **AES-256-GCM** (`aes-gcm`) seals card payloads.
//! - **SHA-256** (`sha2`) for token hashes, key derivation and transaction IDs.
//! - **Ed25519** (`ed25519-dalek`) for identities and transaction signatures.
//! - **bech32** for ledger addresses.
//!
//! We don't roll our own. If a function here ever grows an algorithm of its
//! own, something has gone wrong.

pub mod derivation;
pub mod encryption;
pub mod hash;
pub mod keys;

pub use derivation::{challenge, DerivationError, EncryptionKey, KeyDeriver, KeyMaterial};
pub use encryption::{decrypt, encrypt, CipherError};
pub use hash::sha256;
pub use keys::{Address, KeyError, VaultKeypair, VaultPublicKey, VaultSignature};
