//! # Token Records
//!
//! What a successful store leaves behind, in two shapes:
//!
//! - [`TokenRecord`]: the vault's wire form, exactly as `store_token` and
//!   `retrieve_token` return it (snake_case, bytes as hex).
//! - [`TokenMetadata`]: the engine-facing form, with typed network and
//!   status and the ledger transaction that created it.
//!
//! A token is never deleted. Revocation and expiry only change `status`,
//! and the vault keeps the record as an audit trail.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::VaultError;
use crate::card::CardNetwork;

// ---------------------------------------------------------------------------
// TokenHash
// ---------------------------------------------------------------------------

/// SHA-256 of the canonical card serialization. Indexes a token without
/// revealing anything about the card.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for TokenHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for TokenHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TokenHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TokenStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Revoked,
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(VaultError::Serialization(format!(
                "unknown token status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenRecord (wire form)
// ---------------------------------------------------------------------------

/// A token as the vault stores and returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user: String,
    #[serde(with = "crate::encoding::hex_vec")]
    pub encrypted_payload: Vec<u8>,
    pub token_hash: TokenHash,
    pub last_4_digits: String,
    pub card_network: String,
    pub status: TokenStatus,
    pub created_at: u64,
    pub expires_at: u64,
}

// ---------------------------------------------------------------------------
// TokenMetadata
// ---------------------------------------------------------------------------

/// A stored card token, as handed back to callers of the session.
///
/// Produced only after encryption succeeded *and* the vault accepted the
/// store. Safe to log and display: the payload is ciphertext and the only
/// card digits present are the last four.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub user_id: String,
    pub token_hash: TokenHash,
    #[serde(with = "crate::encoding::hex_vec")]
    pub encrypted_payload: Vec<u8>,
    pub last4_digits: String,
    pub card_network: CardNetwork,
    pub status: TokenStatus,
    pub created_at: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_tx_id: Option<String>,
}

impl TokenMetadata {
    /// Converts the vault's wire record. Network names the engine does not
    /// know map to [`CardNetwork::Unknown`] rather than failing the read.
    pub fn from_record(record: TokenRecord, ledger_tx_id: Option<String>) -> Self {
        Self {
            user_id: record.user,
            token_hash: record.token_hash,
            encrypted_payload: record.encrypted_payload,
            last4_digits: record.last_4_digits,
            card_network: record.card_network.parse().unwrap_or_default(),
            status: record.status,
            created_at: record.created_at,
            expires_at: record.expires_at,
            ledger_tx_id,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }

    /// Marks an active token expired once `now` (unix seconds) is past
    /// `expires_at`. Revoked tokens stay revoked. Returns `true` if the
    /// status changed.
    pub fn evaluate_expiry(&mut self, now: u64) -> bool {
        if self.status == TokenStatus::Active && now > self.expires_at {
            self.status = TokenStatus::Expired;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Lookup and revoke outcomes
// ---------------------------------------------------------------------------

/// The result of looking a user's token up on the vault.
///
/// "No token", "no account" and "no contract" are all expected states for
/// a new user and none of them is an error, but they mean different things
/// operationally, so they are kept apart here.
/// [`VaultSession::retrieve`](super::VaultSession::retrieve) collapses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    Found(TokenMetadata),
    NoToken,
    AccountNotFound,
    ContractNotFound,
}

impl TokenLookup {
    pub fn into_option(self) -> Option<TokenMetadata> {
        match self {
            Self::Found(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Revocation never raises; failures come back as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RevokeOutcome {
    Revoked { ledger_tx_id: String },
    Failed { reason: String },
}

impl RevokeOutcome {
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked { .. })
    }
}
