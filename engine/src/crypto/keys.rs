//! # Key Management
//!
//! Ed25519 identities for vault sessions, and the bech32 ledger addresses
//! derived from them.
//!
//! A session holding a raw secret holds one of these keypairs. The same 32
//! bytes that seed the signing key are the input to the direct key
//! derivation path, so a single secret grants both capabilities: signing
//! ledger transactions and sealing card payloads.
//!
//! ## Addresses
//!
//! A ledger address is the bech32 encoding (HRP `card`) of the raw 32-byte
//! public key. No hashing in between, which means anyone holding an address
//! can verify a signature from it without a key lookup.
//!
//! ## Security considerations
//!
//! - Secret keys are zeroized on drop (ed25519-dalek does this for us).
//! - Keys are generated from `OsRng`.
//! - Key bytes are never logged and never appear in `Debug` output.

use bech32::{Bech32, Hrp};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{ADDRESS_HRP, SECRET_KEY_LENGTH, SIGNATURE_LENGTH};

const ADDRESS_PREFIX: Hrp = Hrp::parse_unchecked(ADDRESS_HRP);

/// Errors that can occur during key and address operations.
///
/// Vague on purpose about *why* a secret was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key: expected {SECRET_KEY_LENGTH} hex-encoded bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid address prefix: expected '{ADDRESS_HRP}', got '{0}'")]
    WrongAddressPrefix(String),
}

/// A vault identity keypair wrapping an Ed25519 signing key.
///
/// Deliberately not `Serialize`: exporting a secret is done explicitly via
/// [`secret_key_bytes`](Self::secret_key_bytes) or never.
///
/// # Examples
///
/// ```
/// use cardvault_engine::crypto::keys::VaultKeypair;
///
/// let kp = VaultKeypair::generate();
/// let sig = kp.sign(b"store_token");
/// assert!(kp.verify(b"store_token", &sig));
/// assert!(kp.address().as_str().starts_with("card1"));
/// ```
pub struct VaultKeypair {
    signing_key: SigningKey,
}

/// The public half of a vault identity.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 signature. Always 64 bytes when produced by this crate, but
/// stored as a `Vec` so a malformed blob from a delegated signer can be
/// carried to verification and rejected there instead of failing to parse.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSignature {
    #[serde(with = "crate::encoding::hex_vec")]
    bytes: Vec<u8>,
}

/// A bech32 ledger address (`card1...`).
///
/// Always holds a string that decoded successfully, so
/// [`public_key`](Self::public_key) cannot fail.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    encoded: String,
    key: [u8; 32],
}

impl VaultKeypair {
    /// Generates a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Constructs a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Restores a keypair from a 64-character hex secret.
    ///
    /// Surrounding whitespace is ignored, since secrets usually arrive from
    /// environment variables or files with a trailing newline.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(
            hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?,
        );
        let seed: &[u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(seed))
    }

    pub fn public_key(&self) -> VaultPublicKey {
        VaultPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// The ledger address of this identity.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Signs a message. Ed25519 is deterministic: same key, same message,
    /// same signature.
    pub fn sign(&self, message: &[u8]) -> VaultSignature {
        VaultSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &VaultSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Exports the raw 32-byte seed.
    ///
    /// This is also the `secret_bytes` of the direct key derivation path,
    /// so it is returned wrapped for zeroization.
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_LENGTH]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Hex-encoded seed, for `keygen` output. Handle with care.
    pub fn secret_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(*self.secret_key_bytes()))
    }
}

impl Clone for VaultKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for VaultKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultKeypair(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for VaultKeypair {
    /// Compares public keys only.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for VaultKeypair {}

// ---------------------------------------------------------------------------
// VaultPublicKey
// ---------------------------------------------------------------------------

impl VaultPublicKey {
    /// Validates that `slice` is 32 bytes and a valid Ed25519 point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verifies a signature against this key. Any malformation (wrong
    /// length, invalid point) is just `false`.
    pub fn verify(&self, message: &[u8], signature: &VaultSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(sig) = signature.to_dalek_signature() else {
            return false;
        };
        verifying_key.verify(message, &sig).is_ok()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }
}

impl Hash for VaultPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for VaultPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for VaultPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// VaultSignature
// ---------------------------------------------------------------------------

impl VaultSignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Wraps arbitrary bytes without checking the length. Verification
    /// rejects anything that is not 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_dalek_signature(&self) -> Option<DalekSignature> {
        let arr: [u8; SIGNATURE_LENGTH] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for VaultSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for VaultSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "VaultSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "VaultSignature({})", hex_str)
        }
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

impl Address {
    pub fn from_public_key(pk: &VaultPublicKey) -> Self {
        // Encoding only fails for payloads beyond the bech32 length limit,
        // which 32 bytes is nowhere near. Fall back to hex rather than panic.
        let encoded = bech32::encode::<Bech32>(ADDRESS_PREFIX, pk.as_bytes())
            .unwrap_or_else(|_| pk.to_hex());
        Self {
            encoded,
            key: *pk.as_bytes(),
        }
    }

    /// Parses and validates a `card1...` address: checksum, prefix, length
    /// and that the payload is a valid Ed25519 point.
    pub fn parse(addr: &str) -> Result<Self, KeyError> {
        let (hrp, data) =
            bech32::decode(addr).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
        if hrp != ADDRESS_PREFIX {
            return Err(KeyError::WrongAddressPrefix(hrp.to_string()));
        }
        let pk = VaultPublicKey::try_from_slice(&data)?;
        Ok(Self {
            encoded: addr.to_ascii_lowercase(),
            key: pk.bytes,
        })
    }

    /// The public key this address encodes.
    pub fn public_key(&self) -> VaultPublicKey {
        VaultPublicKey { bytes: self.key }
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.encoded
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encoded)
    }
}
