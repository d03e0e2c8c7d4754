//! In-process ledger hosting the vault and access-mode contracts.
//!
//! Enforces what a real ledger enforces at the door (known contract, funded
//! source account, valid signature, fresh nonce, unexpired validity window)
//! and then runs the contract rules:
//!
//! - `store_token` panics if a non-revoked token exists for the user, or if
//!   `expires_at` is not in the future.
//! - `retrieve_token` reads back active tokens past their expiry as
//!   `expired`, and returns nothing once a token is revoked.
//! - `revoke_token` returns `false` when there is nothing to revoke.
//! - `get_token_status` and `get_mode` are public reads. `get_mode` defaults
//!   to `standard`.
//!
//! A contract panic does not reject the transaction: it is included and
//! reported as [`TxStatus::Failed`] on poll, as on a real ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::{LedgerClient, LedgerError, TxStatus};
use crate::crypto::keys::Address;
use crate::transaction::{verify_transaction, ContractArg, Transaction, VaultFunction};
use crate::vault::access::AccessMode;
use crate::vault::token::{TokenHash, TokenRecord, TokenStatus};

#[derive(Debug)]
struct Submitted {
    status: TxStatus,
    pending_polls: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<String, u64>,
    tokens: HashMap<String, TokenRecord>,
    modes: HashMap<String, AccessMode>,
    transactions: HashMap<String, Submitted>,
    ledger_sequence: u64,
    /// Contract clock override, unix seconds.
    clock: Option<u64>,
    pending_polls: u32,
}

impl LedgerState {
    fn now(&self) -> u64 {
        self.clock
            .unwrap_or_else(|| Utc::now().timestamp().max(0) as u64)
    }
}

/// Thread-safe in-memory ledger. Share it behind an `Arc`.
#[derive(Debug)]
pub struct InMemoryLedger {
    vault_contract_id: String,
    access_contract_id: Option<String>,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(vault_contract_id: impl Into<String>) -> Self {
        Self {
            vault_contract_id: vault_contract_id.into(),
            access_contract_id: None,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Deploys the access-mode contract under `contract_id`.
    pub fn with_access_contract(mut self, contract_id: impl Into<String>) -> Self {
        self.access_contract_id = Some(contract_id.into());
        self
    }

    /// Every submitted transaction reports `PENDING` this many times before
    /// its final status.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.state.lock().pending_polls = polls;
        self
    }

    /// Creates the account with sequence 0. No-op if it already exists.
    pub fn fund(&self, address: &Address) {
        self.state
            .lock()
            .accounts
            .entry(address.to_string())
            .or_insert(0);
    }

    /// Pins the contract clock to `unix_seconds`. Transaction validity
    /// windows are still checked against the wall clock.
    pub fn set_time(&self, unix_seconds: u64) {
        self.state.lock().clock = Some(unix_seconds);
    }

    /// The raw stored record for `user`, regardless of status.
    pub fn token_record(&self, user: &Address) -> Option<TokenRecord> {
        self.state.lock().tokens.get(user.as_str()).cloned()
    }

    /// Number of transactions accepted so far.
    pub fn submitted_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    fn check_contract(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let target = match tx.function {
            VaultFunction::GetMode | VaultFunction::SetMode => self.access_contract_id.as_deref(),
            _ => Some(self.vault_contract_id.as_str()),
        };
        if target == Some(tx.contract_id.as_str()) {
            return Ok(());
        }
        let deployed = tx.contract_id == self.vault_contract_id
            || self.access_contract_id.as_deref() == Some(tx.contract_id.as_str());
        if deployed {
            Err(LedgerError::Rejected(format!(
                "contract {} has no function {}",
                tx.contract_id, tx.function
            )))
        } else {
            Err(LedgerError::ContractNotFound(tx.contract_id.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// Contract execution
// ---------------------------------------------------------------------------

fn arg<'a>(tx: &'a Transaction, index: usize) -> Result<&'a ContractArg, String> {
    tx.args
        .get(index)
        .ok_or_else(|| format!("{}: missing argument {}", tx.function, index))
}

fn user_arg(tx: &Transaction) -> Result<String, String> {
    arg(tx, 0)?
        .as_address()
        .map(str::to_string)
        .ok_or_else(|| format!("{}: argument 0 must be an address", tx.function))
}

/// Only the user may act on their own token.
fn require_auth(tx: &Transaction, user: &str) -> Result<(), String> {
    if tx.source == user && tx.is_signed() {
        Ok(())
    } else {
        Err(format!("unauthorized: {} cannot act for {}", tx.source, user))
    }
}

/// Reads the record for `user`, marking it expired if its time has passed.
fn read_token(state: &mut LedgerState, user: &str, persist: bool) -> Option<TokenRecord> {
    let now = state.now();
    let record = state.tokens.get_mut(user)?;
    if record.status == TokenStatus::Active && now > record.expires_at {
        if persist {
            record.status = TokenStatus::Expired;
        } else {
            let mut copy = record.clone();
            copy.status = TokenStatus::Expired;
            return Some(copy);
        }
    }
    Some(record.clone())
}

/// Runs one contract call. `Err` is a contract panic. Reads never persist
/// when `persist` is false.
fn execute(state: &mut LedgerState, tx: &Transaction, persist: bool) -> Result<Value, String> {
    let user = user_arg(tx)?;
    match tx.function {
        VaultFunction::StoreToken => {
            require_auth(tx, &user)?;
            let payload = arg(tx, 1)?
                .as_bytes()
                .ok_or("store_token: argument 1 must be bytes")?
                .to_vec();
            let hash = *arg(tx, 2)?
                .as_hash32()
                .ok_or("store_token: argument 2 must be a 32-byte hash")?;
            let last4 = arg(tx, 3)?
                .as_string()
                .ok_or("store_token: argument 3 must be a string")?
                .to_string();
            let network = arg(tx, 4)?
                .as_string()
                .ok_or("store_token: argument 4 must be a string")?
                .to_string();
            let expires_at = arg(tx, 5)?
                .as_u64()
                .ok_or("store_token: argument 5 must be a u64")?;

            let now = state.now();
            if let Some(existing) = state.tokens.get(&user) {
                if existing.status != TokenStatus::Revoked {
                    return Err("Token already exists for this user".into());
                }
            }
            if expires_at <= now {
                return Err("Expiration date must be in the future".into());
            }

            let record = TokenRecord {
                user: user.clone(),
                encrypted_payload: payload,
                token_hash: TokenHash::from_bytes(hash),
                last_4_digits: last4,
                card_network: network,
                status: TokenStatus::Active,
                created_at: now,
                expires_at,
            };
            let value = serde_json::to_value(&record).map_err(|e| e.to_string())?;
            if persist {
                state.tokens.insert(user, record);
            }
            Ok(value)
        }
        VaultFunction::RetrieveToken => {
            require_auth(tx, &user)?;
            match read_token(state, &user, persist) {
                Some(record) if record.status != TokenStatus::Revoked => {
                    serde_json::to_value(&record).map_err(|e| e.to_string())
                }
                _ => Ok(Value::Null),
            }
        }
        VaultFunction::RevokeToken => {
            require_auth(tx, &user)?;
            let revoked = match state.tokens.get_mut(&user) {
                Some(record) if record.status != TokenStatus::Revoked => {
                    if persist {
                        record.status = TokenStatus::Revoked;
                    }
                    true
                }
                _ => false,
            };
            Ok(Value::Bool(revoked))
        }
        VaultFunction::GetTokenStatus => Ok(read_token(state, &user, persist)
            .map(|r| Value::String(r.status.as_str().to_string()))
            .unwrap_or(Value::Null)),
        VaultFunction::GetMode => {
            let mode = state.modes.get(&user).copied().unwrap_or_default();
            Ok(Value::String(mode.as_str().to_string()))
        }
        VaultFunction::SetMode => {
            require_auth(tx, &user)?;
            let mode = arg(tx, 1)?
                .as_mode()
                .ok_or("set_mode: argument 1 must be an access mode")?;
            if persist {
                state.modes.insert(user, mode);
            }
            Ok(Value::Null)
        }
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn account_sequence(&self, address: &Address) -> Result<u64, LedgerError> {
        self.state
            .lock()
            .accounts
            .get(address.as_str())
            .copied()
            .ok_or_else(|| LedgerError::AccountNotFound(address.to_string()))
    }

    async fn simulate(&self, tx: &Transaction) -> Result<Value, LedgerError> {
        self.check_contract(tx)?;
        if tx.is_signed() {
            verify_transaction(tx).map_err(|e| LedgerError::Rejected(e.to_string()))?;
        }
        let mut state = self.state.lock();
        if tx.function == VaultFunction::RetrieveToken && !state.accounts.contains_key(&tx.source)
        {
            return Err(LedgerError::AccountNotFound(tx.source.clone()));
        }
        execute(&mut state, tx, false).map_err(LedgerError::Rejected)
    }

    async fn submit(&self, tx: &Transaction) -> Result<String, LedgerError> {
        self.check_contract(tx)?;
        verify_transaction(tx).map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        if tx.is_expired_at(now_ms) {
            return Err(LedgerError::Rejected(format!(
                "transaction {} expired at {}",
                tx.id, tx.valid_until
            )));
        }

        let mut state = self.state.lock();
        let sequence = *state
            .accounts
            .get(&tx.source)
            .ok_or_else(|| LedgerError::AccountNotFound(tx.source.clone()))?;
        if tx.nonce != sequence + 1 {
            return Err(LedgerError::Rejected(format!(
                "bad nonce: expected {}, got {}",
                sequence + 1,
                tx.nonce
            )));
        }
        state.accounts.insert(tx.source.clone(), tx.nonce);
        state.ledger_sequence += 1;
        let ledger = state.ledger_sequence;

        let status = match execute(&mut state, tx, true) {
            Ok(return_value) => TxStatus::Success {
                ledger,
                return_value,
            },
            Err(reason) => TxStatus::Failed { reason },
        };
        debug!(tx_id = %tx.id, function = %tx.function, ?status, "in-memory ledger applied transaction");

        let pending_polls = state.pending_polls;
        state.transactions.insert(
            tx.id.clone(),
            Submitted {
                status,
                pending_polls,
            },
        );
        Ok(tx.id.clone())
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<TxStatus, LedgerError> {
        let mut state = self.state.lock();
        match state.transactions.get_mut(tx_id) {
            None => Ok(TxStatus::NotFound),
            Some(entry) if entry.pending_polls > 0 => {
                entry.pending_polls -= 1;
                Ok(TxStatus::Pending)
            }
            Some(entry) => Ok(entry.status.clone()),
        }
    }
}
