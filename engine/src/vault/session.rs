//! # Vault Session
//!
//! The facade over everything else. A [`VaultSession`] owns one user's
//! identity, signer and derived key, and sequences each lifecycle
//! operation:
//!
//! ```text
//! tokenize_and_store:  check capabilities -> normalize + validate card
//!                      -> derive key -> encrypt + hash -> build store_token
//!                      -> sign -> submit -> poll until confirmed
//! retrieve / lookup:   build + sign retrieve_token -> simulate
//! revoke:              build + sign revoke_token -> submit -> poll
//! decrypt_locally:     derive key -> decrypt (no network)
//! ```
//!
//! Every ledger call is bounded by the configured network timeout, every
//! delegated signature by the signer timeout, and confirmation polling by
//! the confirmation timeout.
//!
//! Store and revoke are never retried here. Resubmitting a store that may
//! already have landed risks a duplicate ledger entry, so the caller
//! decides.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::error::VaultError;
use super::token::{RevokeOutcome, TokenHash, TokenLookup, TokenMetadata, TokenRecord, TokenStatus};
use crate::card::CardData;
use crate::config::VaultConfig;
use crate::crypto::derivation::{KeyDeriver, KeyMaterial};
use crate::crypto::encryption::{decrypt, encrypt};
use crate::crypto::hash::sha256;
use crate::crypto::keys::{Address, VaultKeypair};
use crate::ledger::{LedgerClient, LedgerError, RpcLedgerClient, TxStatus};
use crate::signer::{MessageSigner, Signer, TransactionSigner};
use crate::transaction::{ContractArg, TransactionBuilder, VaultFunction};

// ---------------------------------------------------------------------------
// SessionBuilder
// ---------------------------------------------------------------------------

enum Credential {
    None,
    Secret(VaultKeypair),
    Public(Address),
}

/// Fluent constructor for [`VaultSession`].
///
/// Two credential shapes:
///
/// - [`secret`](Self::secret): a raw keypair. Signs and encrypts.
/// - [`public_identity`](Self::public_identity) plus a
///   [`transaction_signer`](Self::transaction_signer) and optionally a
///   [`message_signer`](Self::message_signer). Without the message signer
///   the session cannot encrypt or decrypt.
///
/// Without a ledger, the session talks JSON-RPC to `config.rpc_url`.
pub struct SessionBuilder {
    config: VaultConfig,
    credential: Credential,
    transaction_signer: Option<Arc<dyn TransactionSigner>>,
    message_signer: Option<Arc<dyn MessageSigner>>,
    ledger: Option<Arc<dyn LedgerClient>>,
}

impl SessionBuilder {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            credential: Credential::None,
            transaction_signer: None,
            message_signer: None,
            ledger: None,
        }
    }

    pub fn secret(mut self, keypair: VaultKeypair) -> Self {
        self.credential = Credential::Secret(keypair);
        self
    }

    /// Like [`secret`](Self::secret), from a 64-character hex seed.
    pub fn secret_hex(self, hex_secret: &str) -> Result<Self, VaultError> {
        let keypair = VaultKeypair::from_hex(hex_secret)?;
        Ok(self.secret(keypair))
    }

    pub fn public_identity(mut self, address: Address) -> Self {
        self.credential = Credential::Public(address);
        self
    }

    pub fn transaction_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.transaction_signer = Some(signer);
        self
    }

    pub fn message_signer(mut self, signer: Arc<dyn MessageSigner>) -> Self {
        self.message_signer = Some(signer);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> Result<VaultSession, VaultError> {
        self.config.validate()?;
        let signer_timeout = self.config.signer_timeout();

        let (identity, signer, material) = match self.credential {
            Credential::Secret(keypair) => {
                if self.transaction_signer.is_some() || self.message_signer.is_some() {
                    return Err(VaultError::Configuration(
                        "a secret-key session cannot also take delegated signers".into(),
                    ));
                }
                let secret = Zeroizing::new(keypair.secret_key_bytes().to_vec());
                (
                    Some(keypair.address()),
                    Some(Signer::Local(keypair)),
                    KeyMaterial::Secret(secret),
                )
            }
            Credential::Public(address) => {
                let material = match self.message_signer {
                    Some(signer) => KeyMaterial::Delegated {
                        user: address.clone(),
                        signer,
                    },
                    None => KeyMaterial::None,
                };
                (
                    Some(address),
                    self.transaction_signer.map(Signer::Delegated),
                    material,
                )
            }
            Credential::None => (None, None, KeyMaterial::None),
        };

        let ledger = match self.ledger {
            Some(ledger) => ledger,
            None => Arc::new(
                RpcLedgerClient::new(self.config.rpc_url.clone(), self.config.network_timeout())
                    .map_err(|e| VaultError::Configuration(e.to_string()))?,
            ),
        };

        Ok(VaultSession {
            identity,
            signer,
            deriver: KeyDeriver::new(material, signer_timeout),
            config: self.config,
            ledger,
        })
    }
}

// ---------------------------------------------------------------------------
// VaultSession
// ---------------------------------------------------------------------------

/// One user's handle on the vault.
///
/// Sessions are independent: several can live in one process, each with
/// its own cached key. Call [`close`](Self::close) to drop the key early,
/// otherwise it is zeroized when the session drops.
pub struct VaultSession {
    identity: Option<Address>,
    signer: Option<Signer>,
    deriver: KeyDeriver,
    config: VaultConfig,
    ledger: Arc<dyn LedgerClient>,
}

impl VaultSession {
    pub fn builder(config: VaultConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.is_some()
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    pub fn can_encrypt(&self) -> bool {
        self.deriver.can_encrypt()
    }

    pub fn address(&self) -> Option<&Address> {
        self.identity.as_ref()
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Encrypts `card` under the session key and stores it in the vault.
    ///
    /// Returns metadata only after the store is confirmed on the ledger. A
    /// vault rejection because a token already exists surfaces as
    /// [`VaultError::TokenAlreadyExists`].
    pub async fn tokenize_and_store(&self, card: &CardData) -> Result<TokenMetadata, VaultError> {
        let user = self.identity()?.clone();
        self.signer()?;
        self.require_encryption()?;

        let card = card.normalized();
        card.validate(Utc::now())?;
        let expires_at = card.expires_at()?;

        let key = self.deriver.derive().await?;
        let (encrypted_payload, token_hash) = {
            let plaintext = card.canonical_bytes()?;
            (
                encrypt(&plaintext, key.as_bytes())?,
                TokenHash::from_bytes(sha256(&plaintext)),
            )
        };
        let last4 = card.last4();
        debug!(
            user = %user,
            network = %card.network,
            last4 = %last4,
            token_hash = ?token_hash,
            "card encrypted"
        );

        let (tx_id, receipt) = self
            .invoke(
                VaultFunction::StoreToken,
                &self.config.vault_contract_id,
                vec![
                    ContractArg::Address(user.to_string()),
                    ContractArg::Bytes(encrypted_payload.clone()),
                    ContractArg::Hash32(*token_hash.as_bytes()),
                    ContractArg::String(last4.clone()),
                    ContractArg::String(card.network.as_str().to_string()),
                    ContractArg::U64(expires_at),
                ],
            )
            .await?;

        info!(user = %user, tx_id = %tx_id, network = %card.network, last4 = %last4, "card token stored");

        // The vault's record is authoritative, its clock stamps `created_at`.
        if !receipt.is_null() {
            let record: TokenRecord = serde_json::from_value(receipt)?;
            return Ok(TokenMetadata::from_record(record, Some(tx_id)));
        }
        Ok(TokenMetadata {
            user_id: user.to_string(),
            token_hash,
            encrypted_payload,
            last4_digits: last4,
            card_network: card.network,
            status: TokenStatus::Active,
            created_at: Utc::now().timestamp().max(0) as u64,
            expires_at,
            ledger_tx_id: Some(tx_id),
        })
    }

    /// Looks up the session user's token, keeping the reasons for an empty
    /// result apart.
    pub async fn lookup(&self) -> Result<TokenLookup, VaultError> {
        let user = self.identity()?.clone();
        self.signer()?;

        let value = match self
            .read(
                VaultFunction::RetrieveToken,
                &self.config.vault_contract_id,
                vec![ContractArg::Address(user.to_string())],
                true,
            )
            .await
        {
            Ok(value) => value,
            Err(VaultError::Submission(LedgerError::AccountNotFound(_))) => {
                debug!(user = %user, "no ledger account, no token");
                return Ok(TokenLookup::AccountNotFound);
            }
            Err(VaultError::Submission(LedgerError::ContractNotFound(contract))) => {
                debug!(user = %user, contract = %contract, "vault contract not found");
                return Ok(TokenLookup::ContractNotFound);
            }
            Err(e) => return Err(e),
        };

        if value.is_null() {
            return Ok(TokenLookup::NoToken);
        }
        let record: TokenRecord = serde_json::from_value(value)?;
        let mut token = TokenMetadata::from_record(record, None);
        token.evaluate_expiry(Utc::now().timestamp().max(0) as u64);
        Ok(TokenLookup::Found(token))
    }

    /// The session user's token, or `None` if there is none for any reason.
    pub async fn retrieve(&self) -> Result<Option<TokenMetadata>, VaultError> {
        Ok(self.lookup().await?.into_option())
    }

    /// Revokes the session user's token. Failures come back as
    /// [`RevokeOutcome::Failed`], never as `Err`.
    pub async fn revoke(&self) -> RevokeOutcome {
        match self.try_revoke().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "revoke failed");
                RevokeOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_revoke(&self) -> Result<RevokeOutcome, VaultError> {
        let user = self.identity()?.clone();
        self.signer()?;

        let (tx_id, value) = self
            .invoke(
                VaultFunction::RevokeToken,
                &self.config.vault_contract_id,
                vec![ContractArg::Address(user.to_string())],
            )
            .await?;

        // A vault that answers with no value has still accepted the call.
        if value == Value::Bool(false) {
            return Ok(RevokeOutcome::Failed {
                reason: "no active token to revoke".into(),
            });
        }
        info!(user = %user, tx_id = %tx_id, "card token revoked");
        Ok(RevokeOutcome::Revoked { ledger_tx_id: tx_id })
    }

    /// The status the vault holds for the user's token. Public read, no
    /// signature needed.
    pub async fn token_status(&self) -> Result<Option<TokenStatus>, VaultError> {
        let user = self.identity()?.clone();
        let value = match self
            .read(
                VaultFunction::GetTokenStatus,
                &self.config.vault_contract_id,
                vec![ContractArg::Address(user.to_string())],
                false,
            )
            .await
        {
            Ok(value) => value,
            Err(VaultError::Submission(
                LedgerError::AccountNotFound(_) | LedgerError::ContractNotFound(_),
            )) => return Ok(None),
            Err(e) => return Err(e),
        };
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.parse()?)),
            other => Err(VaultError::Serialization(format!(
                "unexpected token status value {other}"
            ))),
        }
    }

    /// Decrypts a payload produced by this user's key. Never touches the
    /// network.
    pub async fn decrypt_locally(&self, encrypted_payload: &[u8]) -> Result<CardData, VaultError> {
        self.identity()?;
        self.require_encryption()?;
        let key = self.deriver.derive().await?;
        let plaintext = Zeroizing::new(decrypt(encrypted_payload, key.as_bytes())?);
        Ok(CardData::from_canonical_bytes(&plaintext)?)
    }

    pub async fn decrypt_token(&self, token: &TokenMetadata) -> Result<CardData, VaultError> {
        self.decrypt_locally(&token.encrypted_payload).await
    }

    /// Tears the session down: zeroizes the cached key and drops the signer
    /// and identity. Every later operation fails with
    /// [`VaultError::NotInitialized`].
    pub fn close(&mut self) {
        if let Some(user) = self.identity.take() {
            debug!(user = %user, "closing vault session");
        }
        self.signer = None;
        self.deriver.clear();
    }

    // -----------------------------------------------------------------------
    // Plumbing shared with the access-mode controller
    // -----------------------------------------------------------------------

    pub(super) fn identity(&self) -> Result<&Address, VaultError> {
        self.identity.as_ref().ok_or(VaultError::NotInitialized)
    }

    fn signer(&self) -> Result<&Signer, VaultError> {
        self.signer.as_ref().ok_or_else(|| {
            VaultError::Capability(
                "signing requires a raw secret or a delegated transaction signer".into(),
            )
        })
    }

    fn require_encryption(&self) -> Result<(), VaultError> {
        if self.deriver.can_encrypt() {
            Ok(())
        } else {
            Err(VaultError::Capability(
                "encryption requires a raw secret or a delegated message signer".into(),
            ))
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, VaultError> {
        let timeout = self.config.network_timeout();
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| VaultError::timeout(operation, timeout))?
            .map_err(rejection)
    }

    /// Runs a read-only call. Signed reads are built at the next nonce and
    /// signed, so the contract can authenticate the caller.
    pub(super) async fn read(
        &self,
        function: VaultFunction,
        contract: &str,
        args: Vec<ContractArg>,
        signed: bool,
    ) -> Result<Value, VaultError> {
        let user = self.identity()?;
        let mut builder = TransactionBuilder::new(function)
            .source(user)
            .contract(contract)
            .args(args);

        let tx = if signed {
            let signer = self.signer()?;
            let sequence = self
                .bounded("account lookup", self.ledger.account_sequence(user))
                .await?;
            builder = builder.nonce(sequence + 1);
            signer.sign(builder.build(), self.config.signer_timeout()).await?
        } else {
            builder.build()
        };

        debug!(tx_id = %tx.id, function = %function, "simulating read");
        self.bounded("simulation", self.ledger.simulate(&tx)).await
    }

    /// Builds, signs, submits and confirms a state-changing call. Returns
    /// the transaction id and the contract's return value.
    pub(super) async fn invoke(
        &self,
        function: VaultFunction,
        contract: &str,
        args: Vec<ContractArg>,
    ) -> Result<(String, Value), VaultError> {
        self.try_invoke(function, contract, args)
            .await
            .map_err(|e| e.unconfirmed(function))
    }

    async fn try_invoke(
        &self,
        function: VaultFunction,
        contract: &str,
        args: Vec<ContractArg>,
    ) -> Result<(String, Value), VaultError> {
        let user = self.identity()?;
        let signer = self.signer()?;

        let sequence = self
            .bounded("account lookup", self.ledger.account_sequence(user))
            .await?;
        let tx = TransactionBuilder::new(function)
            .source(user)
            .contract(contract)
            .args(args)
            .nonce(sequence + 1)
            .build();
        debug!(tx_id = %tx.id, function = %function, nonce = tx.nonce, "transaction built");

        let signed = signer.sign(tx, self.config.signer_timeout()).await?;
        let tx_id = match self.bounded("submission", self.ledger.submit(&signed)).await {
            Ok(id) => id,
            Err(e) => {
                warn!(tx_id = %signed.id, function = %function, error = %e, "submission rejected");
                return Err(e);
            }
        };
        debug!(tx_id = %tx_id, function = %function, "transaction submitted");

        let value = self.await_confirmation(&tx_id).await?;
        Ok((tx_id, value))
    }

    /// Polls until the transaction reaches a terminal status.
    async fn await_confirmation(&self, tx_id: &str) -> Result<Value, VaultError> {
        let deadline = self.config.confirmation_timeout();
        let interval = self.config.poll_interval();

        let poll = async {
            loop {
                match self
                    .bounded("status poll", self.ledger.transaction_status(tx_id))
                    .await?
                {
                    TxStatus::Success {
                        ledger,
                        return_value,
                    } => {
                        debug!(tx_id = %tx_id, ledger, "transaction confirmed");
                        return Ok(return_value);
                    }
                    TxStatus::Failed { reason } => {
                        warn!(tx_id = %tx_id, reason = %reason, "transaction failed on ledger");
                        return Err(rejection(LedgerError::Rejected(reason)));
                    }
                    TxStatus::Pending | TxStatus::NotFound => tokio::time::sleep(interval).await,
                }
            }
        };

        tokio::time::timeout(deadline, poll)
            .await
            .map_err(|_| VaultError::timeout("confirmation", deadline))?
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("identity", &self.identity)
            .field("signer", &self.signer)
            .field("key_derived", &self.deriver.is_derived())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The vault signals a duplicate store with a contract panic; everything
/// else passes through as a submission error.
fn rejection(err: LedgerError) -> VaultError {
    match err {
        LedgerError::Rejected(reason) if reason.to_ascii_lowercase().contains("already exists") => {
            VaultError::TokenAlreadyExists
        }
        other => VaultError::Submission(other),
    }
}
