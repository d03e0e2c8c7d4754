//! Plaintext card data and its canonical byte form.
//!
//! [`CardData`] only ever lives in memory: during tokenization, or after a
//! successful local decrypt. Its `Debug` output is redacted and its fields
//! are zeroized on drop.
//!
//! ## Canonical serialization
//!
//! The token hash and the encrypted payload are both computed over the same
//! JSON object, with keys in this exact order:
//!
//! ```text
//! {"pan":"…","cvv":"…","expiryMonth":"…","expiryYear":"…","cardholderName":"…","network":"…"}
//! ```
//!
//! The verifier on the far side of the vault reproduces this layout, so the
//! field order of [`CardData`] is part of the wire contract.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::validation::{clean_pan, detect_network, validate_card_number};
use crate::config::VISIBLE_PAN_DIGITS;

/// Errors raised while checking or serializing card data.
///
/// Messages describe the rule that failed, never the offending value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("card number failed validation")]
    InvalidNumber,

    #[error("security code must be 3 or 4 digits")]
    InvalidCvv,

    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    #[error("card expired")]
    Expired,

    #[error("unknown card network: {0}")]
    UnknownNetwork(String),

    #[error("card serialization failed: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// CardNetwork
// ---------------------------------------------------------------------------

/// Card scheme, as detected from the PAN prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardNetwork {
    Visa,
    Mastercard,
    Rupay,
    Amex,
    /// Unrecognized prefix, or not yet detected.
    #[default]
    Unknown,
}

impl CardNetwork {
    /// Wire name used in contract arguments and the canonical serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visa => "visa",
            Self::Mastercard => "mastercard",
            Self::Rupay => "rupay",
            Self::Amex => "amex",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CardNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardNetwork {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visa" => Ok(Self::Visa),
            "mastercard" => Ok(Self::Mastercard),
            "rupay" => Ok(Self::Rupay),
            "amex" => Ok(Self::Amex),
            "unknown" => Ok(Self::Unknown),
            other => Err(CardError::UnknownNetwork(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// CardData
// ---------------------------------------------------------------------------

/// A raw payment card.
///
/// Expiry fields are two-digit strings (`"07"`, `"29"`), years are read as
/// `20YY`. Leave `network` as [`CardNetwork::Unknown`] to have it detected
/// during tokenization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub pan: String,
    pub cvv: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cardholder_name: String,
    #[serde(default)]
    #[zeroize(skip)]
    pub network: CardNetwork,
}

impl CardData {
    pub fn new(
        pan: impl Into<String>,
        cvv: impl Into<String>,
        expiry_month: impl Into<String>,
        expiry_year: impl Into<String>,
        cardholder_name: impl Into<String>,
    ) -> Self {
        Self {
            pan: pan.into(),
            cvv: cvv.into(),
            expiry_month: expiry_month.into(),
            expiry_year: expiry_year.into(),
            cardholder_name: cardholder_name.into(),
            network: CardNetwork::Unknown,
        }
    }

    /// Sets the network explicitly instead of relying on detection.
    pub fn with_network(mut self, network: CardNetwork) -> Self {
        self.network = network;
        self
    }

    /// The last four digits of the cleaned PAN (fewer if the PAN is shorter).
    pub fn last4(&self) -> String {
        let cleaned = clean_pan(&self.pan);
        let skip = cleaned.chars().count().saturating_sub(VISIBLE_PAN_DIGITS);
        cleaned.chars().skip(skip).collect()
    }

    /// Copy with separators stripped from the PAN, whitespace trimmed from the
    /// other fields, and the network detected if it was left unset.
    pub fn normalized(&self) -> Self {
        let pan = clean_pan(&self.pan);
        let network = match self.network {
            CardNetwork::Unknown => detect_network(&pan),
            explicit => explicit,
        };
        Self {
            pan,
            cvv: self.cvv.trim().to_string(),
            expiry_month: self.expiry_month.trim().to_string(),
            expiry_year: self.expiry_year.trim().to_string(),
            cardholder_name: self.cardholder_name.trim().to_string(),
            network,
        }
    }

    /// Checks everything that can be checked without a network call.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CardError> {
        if !validate_card_number(&self.pan) {
            return Err(CardError::InvalidNumber);
        }
        let cvv = self.cvv.trim();
        if !(3..=4).contains(&cvv.len()) || !cvv.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CardError::InvalidCvv);
        }
        let expires_at = self.expires_at()?;
        if expires_at <= now.timestamp() as u64 {
            return Err(CardError::Expired);
        }
        Ok(())
    }

    /// Unix seconds of the first moment after the end of the expiry month.
    ///
    /// A card expiring `12/29` is usable through 2029-12-31 and expires at
    /// 2030-01-01T00:00:00Z.
    pub fn expires_at(&self) -> Result<u64, CardError> {
        let month = parse_two_digits(&self.expiry_month, "month")?;
        if !(1..=12).contains(&month) {
            return Err(CardError::InvalidExpiry(format!(
                "month must be 01-12, got {month:02}"
            )));
        }
        let year = 2000 + parse_two_digits(&self.expiry_year, "year")? as i32;

        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let boundary = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| CardError::InvalidExpiry("date out of range".into()))?;
        Ok(boundary.and_utc().timestamp() as u64)
    }

    /// The canonical JSON bytes hashed and encrypted during tokenization.
    ///
    /// Call on a [`normalized`](Self::normalized) card so that formatting
    /// differences in the input do not change the token hash.
    pub fn canonical_bytes(&self) -> Result<Zeroizing<Vec<u8>>, CardError> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| CardError::Serialization(e.to_string()))
    }

    /// Parses bytes produced by [`canonical_bytes`](Self::canonical_bytes).
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, CardError> {
        serde_json::from_slice(bytes).map_err(|e| CardError::Serialization(e.to_string()))
    }
}

fn parse_two_digits(value: &str, field: &str) -> Result<u32, CardError> {
    let value = value.trim();
    if value.len() != 2 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CardError::InvalidExpiry(format!("{field} must be two digits")));
    }
    value
        .parse()
        .map_err(|_| CardError::InvalidExpiry(format!("{field} must be two digits")))
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("pan", &super::validation::mask_card_number(&self.pan))
            .field("cvv", &"[REDACTED]")
            .field("expiry", &format_args!("{}/{}", self.expiry_month, self.expiry_year))
            .field("cardholder_name", &"[REDACTED]")
            .field("network", &self.network)
            .finish()
    }
}
