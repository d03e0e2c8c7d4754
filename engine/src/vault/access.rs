//! Access-mode controller.
//!
//! The access mode is a per-user setting held by the account-abstraction
//! contract. It decides how the user's transactions get paid for and
//! authorized. The engine never keeps a copy: every [`VaultSession::get_mode`]
//! goes to the contract, since other parties can change the mode too.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::VaultError;
use super::session::VaultSession;
use crate::transaction::{ContractArg, VaultFunction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// The user pays fees and signs every transaction.
    #[default]
    Standard,
    /// A sponsor pays fees.
    Sponsored,
    /// A scoped, short-lived key signs on the user's behalf.
    SessionKey,
    /// Transactions need several signatures.
    #[serde(alias = "multisig")]
    MultiSig,
}

impl AccessMode {
    /// Wire byte used in transaction signing payloads.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::Sponsored => 1,
            Self::SessionKey => 2,
            Self::MultiSig => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Sponsored => "sponsored",
            Self::SessionKey => "session_key",
            Self::MultiSig => "multi_sig",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "standard" => Ok(Self::Standard),
            "sponsored" => Ok(Self::Sponsored),
            "session_key" | "sessionkey" => Ok(Self::SessionKey),
            "multi_sig" | "multisig" => Ok(Self::MultiSig),
            other => Err(VaultError::Configuration(format!(
                "unknown access mode '{other}'"
            ))),
        }
    }
}

impl VaultSession {
    /// The user's current access mode.
    ///
    /// Without an access contract configured this is always
    /// [`AccessMode::Standard`] and no call is made.
    pub async fn get_mode(&self) -> Result<AccessMode, VaultError> {
        let user = self.identity()?.clone();
        let Some(contract) = self.config().access_contract_id.clone() else {
            debug!(user = %user, "account abstraction not configured, mode is standard");
            return Ok(AccessMode::Standard);
        };

        let value = self
            .read(
                VaultFunction::GetMode,
                &contract,
                vec![ContractArg::Address(user.to_string())],
                false,
            )
            .await?;
        if value.is_null() {
            return Ok(AccessMode::Standard);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Requests a mode change and waits for it to be confirmed.
    pub async fn set_mode(&self, mode: AccessMode) -> Result<String, VaultError> {
        let user = self.identity()?.clone();
        let contract = self.config().access_contract_id.clone().ok_or_else(|| {
            VaultError::Configuration(
                "account abstraction is not enabled: configure an access contract".into(),
            )
        })?;

        let (tx_id, _) = self
            .invoke(
                VaultFunction::SetMode,
                &contract,
                vec![
                    ContractArg::Address(user.to_string()),
                    ContractArg::Mode(mode),
                ],
            )
            .await?;
        info!(user = %user, mode = %mode, tx_id = %tx_id, "access mode changed");
        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        for mode in [
            AccessMode::Standard,
            AccessMode::Sponsored,
            AccessMode::SessionKey,
            AccessMode::MultiSig,
        ] {
            assert_eq!(mode.as_str().parse::<AccessMode>().unwrap(), mode);
            let json = serde_json::to_value(mode).unwrap();
            assert_eq!(json, mode.as_str());
        }
        assert_eq!("multisig".parse::<AccessMode>().unwrap(), AccessMode::MultiSig);
        assert_eq!("Session-Key".parse::<AccessMode>().unwrap(), AccessMode::SessionKey);
        assert!("root".parse::<AccessMode>().is_err());
    }

    #[test]
    fn test_wire_bytes_distinct() {
        let bytes: std::collections::HashSet<u8> = [
            AccessMode::Standard,
            AccessMode::Sponsored,
            AccessMode::SessionKey,
            AccessMode::MultiSig,
        ]
        .iter()
        .map(AccessMode::as_u8)
        .collect();
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn test_default_is_standard() {
        assert_eq!(AccessMode::default(), AccessMode::Standard);
        let parsed: AccessMode = serde_json::from_str("\"multisig\"").unwrap();
        assert_eq!(parsed, AccessMode::MultiSig);
    }
}
