//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] produces an unsigned [`Transaction`] invoking
//! one vault function, with a deterministic ID derived from its contents.
//!
//! The builder does not sign. That happens in [`super::signing`] for local
//! keypairs, or out of process for delegated signers, which receive the
//! transaction as a JSON envelope (see [`Transaction::to_envelope`]).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::verification::TransactionError;
use crate::config::{TRANSACTION_VALIDITY, TRANSACTION_VERSION};
use crate::crypto::hash::sha256;
use crate::crypto::keys::Address;
use crate::vault::access::AccessMode;

// ---------------------------------------------------------------------------
// VaultFunction
// ---------------------------------------------------------------------------

/// The remote vault entry point a transaction invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultFunction {
    StoreToken,
    RetrieveToken,
    RevokeToken,
    GetTokenStatus,
    GetMode,
    SetMode,
}

impl VaultFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoreToken => "store_token",
            Self::RetrieveToken => "retrieve_token",
            Self::RevokeToken => "revoke_token",
            Self::GetTokenStatus => "get_token_status",
            Self::GetMode => "get_mode",
            Self::SetMode => "set_mode",
        }
    }

    /// `true` for functions that only read vault state. Read-only calls are
    /// simulated, never submitted.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::RetrieveToken | Self::GetTokenStatus | Self::GetMode
        )
    }
}

impl fmt::Display for VaultFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VaultFunction {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store_token" => Ok(Self::StoreToken),
            "retrieve_token" => Ok(Self::RetrieveToken),
            "revoke_token" => Ok(Self::RevokeToken),
            "get_token_status" => Ok(Self::GetTokenStatus),
            "get_mode" => Ok(Self::GetMode),
            "set_mode" => Ok(Self::SetMode),
            other => Err(TransactionError::UnknownFunction(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ContractArg
// ---------------------------------------------------------------------------

/// A typed argument to a vault function. Byte arguments travel hex-encoded
/// in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContractArg {
    Address(String),
    Bytes(#[serde(with = "crate::encoding::hex_vec")] Vec<u8>),
    Hash32(#[serde(with = "crate::encoding::hex_array")] [u8; 32]),
    String(String),
    U64(u64),
    Mode(AccessMode),
}

impl ContractArg {
    fn type_tag(&self) -> u8 {
        match self {
            Self::Address(_) => 0x01,
            Self::Bytes(_) => 0x02,
            Self::Hash32(_) => 0x03,
            Self::String(_) => 0x04,
            Self::U64(_) => 0x05,
            Self::Mode(_) => 0x06,
        }
    }

    fn write_canonical(&self, buf: &mut Vec<u8>) {
        buf.push(self.type_tag());
        match self {
            Self::Address(s) | Self::String(s) => put_bytes(buf, s.as_bytes()),
            Self::Bytes(b) => put_bytes(buf, b),
            Self::Hash32(h) => buf.extend_from_slice(h),
            Self::U64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Self::Mode(m) => buf.push(m.as_u8()),
        }
    }

    pub fn as_address(&self) -> Option<&str> {
        match self {
            Self::Address(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_hash32(&self) -> Option<&[u8; 32]> {
        match self {
            Self::Hash32(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<AccessMode> {
        match self {
            Self::Mode(m) => Some(*m),
            _ => None,
        }
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A ledger transaction invoking one vault function.
///
/// The `id` is `hex(sha256(signable_bytes))` and is computed at build time.
/// It covers every field except `id`, `signer_public_key` and `signature`,
/// so it is stable across signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub version: u16,
    /// Bech32 address of the account the transaction acts for.
    pub source: String,
    pub contract_id: String,
    pub function: VaultFunction,
    pub args: Vec<ContractArg>,
    /// Per-source sequence number, one above the account's current sequence.
    pub nonce: u64,
    /// Unix milliseconds at build time.
    pub timestamp: u64,
    /// Unix milliseconds after which the ledger refuses the transaction.
    pub valid_until: u64,
    /// Hex-encoded Ed25519 public key, set during signing.
    pub signer_public_key: Option<String>,
    /// Hex-encoded Ed25519 signature over [`Transaction::signable_bytes`].
    pub signature: Option<String>,
}

impl Transaction {
    /// The canonical byte representation used for signing and ID computation.
    ///
    /// Strings and byte arrays are length-prefixed (u32 LE), integers are
    /// fixed-width little-endian, each argument carries a one-byte type tag.
    /// JSON is avoided here since the envelope is free to reorder fields.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.version.to_le_bytes());
        put_bytes(&mut buf, self.source.as_bytes());
        put_bytes(&mut buf, self.contract_id.as_bytes());
        put_bytes(&mut buf, self.function.as_str().as_bytes());

        buf.extend_from_slice(&(self.args.len() as u32).to_le_bytes());
        for arg in &self.args {
            arg.write_canonical(&mut buf);
        }

        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.valid_until.to_le_bytes());
        buf
    }

    pub fn compute_id(&self) -> String {
        hex::encode(sha256(&self.signable_bytes()))
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.valid_until
    }

    /// Serializes the transaction into the opaque blob handed to delegated
    /// signers.
    pub fn to_envelope(&self) -> Result<Vec<u8>, TransactionError> {
        serde_json::to_vec(self).map_err(|e| TransactionError::Envelope(e.to_string()))
    }

    /// Parses a blob returned by a delegated signer.
    pub fn from_envelope(bytes: &[u8]) -> Result<Self, TransactionError> {
        serde_json::from_slice(bytes).map_err(|e| TransactionError::Envelope(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for unsigned [`Transaction`]s.
///
/// ```
/// use cardvault_engine::crypto::keys::VaultKeypair;
/// use cardvault_engine::transaction::{ContractArg, TransactionBuilder, VaultFunction};
///
/// let kp = VaultKeypair::generate();
/// let tx = TransactionBuilder::new(VaultFunction::RevokeToken)
///     .source(&kp.address())
///     .contract("CVAULT")
///     .arg(ContractArg::Address(kp.address().to_string()))
///     .nonce(1)
///     .build();
/// assert_eq!(tx.id, tx.compute_id());
/// assert!(!tx.is_signed());
/// ```
pub struct TransactionBuilder {
    version: u16,
    function: VaultFunction,
    source: String,
    contract_id: String,
    args: Vec<ContractArg>,
    nonce: u64,
    timestamp: Option<u64>,
    validity: Duration,
}

impl TransactionBuilder {
    /// Defaults: current transaction version, nonce 0, timestamp taken at
    /// build time, validity [`TRANSACTION_VALIDITY`].
    pub fn new(function: VaultFunction) -> Self {
        Self {
            version: TRANSACTION_VERSION,
            function,
            source: String::new(),
            contract_id: String::new(),
            args: Vec::new(),
            nonce: 0,
            timestamp: None,
            validity: TRANSACTION_VALIDITY,
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn source(mut self, address: &Address) -> Self {
        self.source = address.to_string();
        self
    }

    pub fn contract(mut self, contract_id: &str) -> Self {
        self.contract_id = contract_id.to_string();
        self
    }

    pub fn arg(mut self, arg: ContractArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = ContractArg>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Sets the timestamp explicitly (Unix milliseconds).
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn valid_for(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn build(self) -> Transaction {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis().max(0) as u64);
        let valid_until = timestamp.saturating_add(self.validity.as_millis() as u64);

        let mut tx = Transaction {
            id: String::new(),
            version: self.version,
            source: self.source,
            contract_id: self.contract_id,
            function: self.function,
            args: self.args,
            nonce: self.nonce,
            timestamp,
            valid_until,
            signer_public_key: None,
            signature: None,
        };
        tx.id = tx.compute_id();
        tx
    }
}
