//! # Engine Configuration & Constants
//!
//! Every magic number in the tokenization engine lives here, next to the
//! runtime [`VaultConfig`] a session is constructed with.
//!
//! The cryptographic constants are a cross-runtime contract. The verifier on
//! the other side of the vault decodes payloads with exactly these lengths,
//! so changing any of them silently breaks every token already stored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::vault::error::VaultError;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Engine version string, reported by the CLI.
pub const ENGINE_VERSION: &str = "0.1.0";

/// Version stamped into every ledger transaction built by the engine.
pub const TRANSACTION_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// AES-256-GCM for card payloads. 256-bit keys, 96-bit IVs, 128-bit tags.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM IV length in bytes. Twelve, always.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Smallest possible sealed payload: IV plus tag around an empty ciphertext.
pub const MIN_PAYLOAD_LENGTH: usize = AES_NONCE_LENGTH + AES_TAG_LENGTH;

/// SHA-256 output length in bytes. Token hashes and derived keys share it.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 seed (raw secret) length.
pub const SECRET_KEY_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Key Derivation
// ---------------------------------------------------------------------------

/// Namespace prefix of the delegated-path challenge.
pub const KEY_DERIVATION_NAMESPACE: &str = "cardvault";

/// Version suffix of the delegated-path challenge. Bumping it rotates every
/// delegated user's encryption key, which orphans their stored tokens.
pub const KEY_DERIVATION_VERSION: &str = "v1";

// ---------------------------------------------------------------------------
// Card Parameters
// ---------------------------------------------------------------------------

/// Shortest PAN accepted by the validator.
pub const PAN_MIN_LENGTH: usize = 13;

/// Longest PAN accepted by the validator.
pub const PAN_MAX_LENGTH: usize = 19;

/// Number of trailing PAN digits left visible by masking.
pub const VISIBLE_PAN_DIGITS: usize = 4;

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Bech32 human-readable prefix for ledger addresses (`card1...`).
pub const ADDRESS_HRP: &str = "card";

// ---------------------------------------------------------------------------
// Timing Defaults
// ---------------------------------------------------------------------------

/// Default bound on a single RPC round trip.
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a delegated signer. Humans are slow, wallets are slower.
pub const DEFAULT_SIGNER_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on waiting for a submitted transaction to reach a terminal status.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between confirmation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Smallest timeout [`VaultConfig::with_timeout`] accepts: room for one
/// 1ms poll inside the confirmation window.
pub const MIN_TIMEOUT_MS: u64 = 2;

/// How long a built transaction stays valid on the ledger.
pub const TRANSACTION_VALIDITY: Duration = Duration::from_secs(300);

/// Default RPC endpoint for local development.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8000/rpc";

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Runtime settings for a [`crate::vault::VaultSession`].
///
/// Durations are stored as milliseconds so the struct round-trips cleanly
/// through JSON and environment variables. Account abstraction is enabled
/// exactly when `access_contract_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// JSON-RPC endpoint of the ledger.
    pub rpc_url: String,
    /// Contract id of the token vault.
    pub vault_contract_id: String,
    /// Contract id of the account-abstraction contract, if configured.
    pub access_contract_id: Option<String>,
    /// Bound on each RPC round trip.
    pub network_timeout_ms: u64,
    /// Bound on a delegated signer's response.
    pub signer_timeout_ms: u64,
    /// Bound on confirmation polling after submission.
    pub confirmation_timeout_ms: u64,
    /// Delay between confirmation polls.
    pub poll_interval_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            vault_contract_id: String::new(),
            access_contract_id: None,
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT.as_millis() as u64,
            signer_timeout_ms: DEFAULT_SIGNER_TIMEOUT.as_millis() as u64,
            confirmation_timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl VaultConfig {
    /// Config pointing at the given vault contract, everything else default.
    pub fn for_vault(vault_contract_id: impl Into<String>) -> Self {
        Self {
            vault_contract_id: vault_contract_id.into(),
            ..Self::default()
        }
    }

    /// Enables account abstraction against the given contract.
    pub fn with_access_contract(mut self, contract_id: impl Into<String>) -> Self {
        self.access_contract_id = Some(contract_id.into());
        self
    }

    /// Overrides every network-facing timeout with a single bound.
    ///
    /// The bound is raised to [`MIN_TIMEOUT_MS`] if smaller, and the poll
    /// interval is capped at a quarter of it so at least one poll fits.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis())
            .unwrap_or(u64::MAX)
            .max(MIN_TIMEOUT_MS);
        self.network_timeout_ms = ms;
        self.signer_timeout_ms = ms;
        self.confirmation_timeout_ms = ms;
        self.poll_interval_ms = self.poll_interval_ms.min(ms / 4).max(1);
        self
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn signer_timeout(&self) -> Duration {
        Duration::from_millis(self.signer_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `true` when the account-abstraction contract is configured.
    pub fn account_abstraction_enabled(&self) -> bool {
        self.access_contract_id.is_some()
    }

    /// Rejects configurations that would make every call fail or hang.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.vault_contract_id.trim().is_empty() {
            return Err(VaultError::Configuration(
                "vault contract id must not be empty".into(),
            ));
        }
        if let Some(id) = &self.access_contract_id {
            if id.trim().is_empty() {
                return Err(VaultError::Configuration(
                    "access contract id must not be empty when set".into(),
                ));
            }
        }
        if self.network_timeout_ms == 0
            || self.signer_timeout_ms == 0
            || self.confirmation_timeout_ms == 0
        {
            return Err(VaultError::Configuration("timeouts must be non-zero".into()));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms >= self.confirmation_timeout_ms {
            return Err(VaultError::Configuration(format!(
                "poll interval {}ms must be non-zero and shorter than the confirmation timeout {}ms",
                self.poll_interval_ms, self.confirmation_timeout_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(AES_TAG_LENGTH, 16);
        assert_eq!(MIN_PAYLOAD_LENGTH, 28);
        assert_eq!(HASH_OUTPUT_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
    }

    #[test]
    fn test_pan_bounds_sanity() {
        assert!(PAN_MIN_LENGTH < PAN_MAX_LENGTH);
        assert!(VISIBLE_PAN_DIGITS < PAN_MIN_LENGTH);
    }

    #[test]
    fn test_timing_defaults_sanity() {
        assert!(DEFAULT_POLL_INTERVAL < DEFAULT_CONFIRMATION_TIMEOUT);
        assert!(DEFAULT_NETWORK_TIMEOUT <= DEFAULT_SIGNER_TIMEOUT);
    }

    #[test]
    fn test_default_config_needs_a_vault_contract() {
        let err = VaultConfig::default().validate().unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
        assert!(VaultConfig::for_vault("CVAULT").validate().is_ok());
    }

    #[test]
    fn test_poll_interval_must_be_shorter_than_confirmation() {
        let mut cfg = VaultConfig::for_vault("CVAULT");
        cfg.poll_interval_ms = cfg.confirmation_timeout_ms;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_access_contract_toggles_account_abstraction() {
        let cfg = VaultConfig::for_vault("CVAULT");
        assert!(!cfg.account_abstraction_enabled());
        let cfg = cfg.with_access_contract("CACCESS");
        assert!(cfg.account_abstraction_enabled());
    }

    #[test]
    fn test_with_timeout_overrides_all_bounds() {
        let cfg = VaultConfig::for_vault("CVAULT").with_timeout(Duration::from_secs(5));
        assert_eq!(cfg.network_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.signer_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.confirmation_timeout(), Duration::from_secs(5));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_with_timeout_keeps_poll_inside_window() {
        let cfg = VaultConfig::for_vault("CVAULT").with_timeout(Duration::from_secs(1));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert!(cfg.validate().is_ok());

        for ms in [0, 1, 2, 3, 7, 999] {
            let cfg = VaultConfig::for_vault("CVAULT").with_timeout(Duration::from_millis(ms));
            assert!(cfg.poll_interval_ms >= 1);
            assert!(cfg.poll_interval_ms < cfg.confirmation_timeout_ms, "timeout {ms}ms");
            assert!(cfg.validate().is_ok(), "timeout {ms}ms");
        }
    }

    #[test]
    fn test_with_timeout_leaves_short_poll_alone() {
        let mut cfg = VaultConfig::for_vault("CVAULT");
        cfg.poll_interval_ms = 10;
        let cfg = cfg.with_timeout(Duration::from_secs(30));
        assert_eq!(cfg.poll_interval_ms, 10);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let cfg: VaultConfig =
            serde_json::from_str(r#"{"vault_contract_id":"CVAULT"}"#).unwrap();
        assert_eq!(cfg.vault_contract_id, "CVAULT");
        assert_eq!(cfg.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(cfg.access_contract_id.is_none());
    }
}
