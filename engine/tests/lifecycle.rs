//! Integration tests for the card token lifecycle.
//!
//! Each test drives full sessions against its own `InMemoryLedger`: raw
//! secret sessions, delegated wallet sessions, and read-only sessions,
//! through store, retrieve, decrypt, revoke and access-mode changes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use cardvault_engine::card::{CardData, CardError, CardNetwork};
use cardvault_engine::config::VaultConfig;
use cardvault_engine::crypto::{challenge, encrypt, sha256, VaultKeypair};
use cardvault_engine::ledger::InMemoryLedger;
use cardvault_engine::signer::{MessageSigner, SignerError, TransactionSigner};
use cardvault_engine::transaction::{sign_transaction, Transaction};
use cardvault_engine::vault::{
    AccessMode, RevokeOutcome, TokenLookup, TokenMetadata, TokenStatus, VaultError, VaultSession,
};

const VAULT: &str = "CVAULT";
const ACCESS: &str = "CACCESS";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn config() -> VaultConfig {
    let mut cfg = VaultConfig::for_vault(VAULT).with_access_contract(ACCESS);
    cfg.poll_interval_ms = 5;
    cfg
}

fn ledger() -> Arc<InMemoryLedger> {
    Arc::new(InMemoryLedger::new(VAULT).with_access_contract(ACCESS))
}

fn card(pan: &str) -> CardData {
    CardData::new(pan, "123", "12", "49", "Grace Hopper")
}

fn secret_session(ledger: &Arc<InMemoryLedger>, keypair: &VaultKeypair) -> VaultSession {
    ledger.fund(&keypair.address());
    VaultSession::builder(config())
        .secret(keypair.clone())
        .ledger(ledger.clone())
        .build()
        .unwrap()
}

/// A wallet that holds the key out of process and counts every prompt.
struct Wallet {
    keypair: VaultKeypair,
    message_prompts: AtomicUsize,
    transaction_prompts: AtomicUsize,
}

impl Wallet {
    fn new(keypair: VaultKeypair) -> Arc<Self> {
        Arc::new(Self {
            keypair,
            message_prompts: AtomicUsize::new(0),
            transaction_prompts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TransactionSigner for Wallet {
    async fn sign_transaction(&self, envelope: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.transaction_prompts.fetch_add(1, Ordering::SeqCst);
        self.keypair.sign_transaction(envelope).await
    }
}

#[async_trait]
impl MessageSigner for Wallet {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.message_prompts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.keypair.sign_message(message).await
    }
}

fn wallet_session(ledger: &Arc<InMemoryLedger>, wallet: &Arc<Wallet>) -> VaultSession {
    ledger.fund(&wallet.keypair.address());
    VaultSession::builder(config())
        .public_identity(wallet.keypair.address())
        .transaction_signer(wallet.clone())
        .message_signer(wallet.clone())
        .ledger(ledger.clone())
        .build()
        .unwrap()
}

/// Signs with a key other than the session's.
struct ImpostorSigner(VaultKeypair);

#[async_trait]
impl TransactionSigner for ImpostorSigner {
    async fn sign_transaction(&self, envelope: &[u8]) -> Result<Vec<u8>, SignerError> {
        let mut tx = Transaction::from_envelope(envelope)?;
        sign_transaction(&mut tx, &self.0);
        Ok(tx.to_envelope()?)
    }
}

// ---------------------------------------------------------------------------
// Raw secret sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_with_raw_secret() {
    let ledger = ledger();
    let keypair = VaultKeypair::generate();
    let session = secret_session(&ledger, &keypair);

    assert!(session.retrieve().await.unwrap().is_none());

    let token = session
        .tokenize_and_store(&card("5555 5555 5555 4444"))
        .await
        .unwrap();
    assert_eq!(token.card_network, CardNetwork::Mastercard);
    assert_eq!(token.last4_digits, "4444");
    assert_eq!(token.status, TokenStatus::Active);
    // 12/49 expires at 2050-01-01T00:00:00Z.
    assert_eq!(token.expires_at, 2_524_608_000);

    let fetched = session.retrieve().await.unwrap().unwrap();
    assert_eq!(fetched.token_hash, token.token_hash);
    let plain = session.decrypt_token(&fetched).await.unwrap();
    assert_eq!(plain.pan, "5555555555554444");
    assert_eq!(plain.network, CardNetwork::Mastercard);

    assert!(session.revoke().await.is_revoked());
    assert!(session.retrieve().await.unwrap().is_none());
    assert_eq!(
        ledger.token_record(&keypair.address()).unwrap().status,
        TokenStatus::Revoked
    );
}

#[tokio::test]
async fn payload_and_hash_follow_the_wire_contract() {
    let ledger = ledger();
    let keypair = VaultKeypair::from_seed(&[42u8; 32]);
    let session = secret_session(&ledger, &keypair);

    let input = card("378282246310005");
    let token = session.tokenize_and_store(&input).await.unwrap();

    // Key = SHA-256(seed); payload = IV(12) ‖ ct ‖ tag(16); hash over the
    // canonical plaintext.
    let key = sha256(&[42u8; 32]);
    let canonical = input.normalized().canonical_bytes().unwrap();
    assert_eq!(token.encrypted_payload.len(), 12 + canonical.len() + 16);
    assert_eq!(token.token_hash.as_bytes(), &sha256(&canonical));
    let decrypted = cardvault_engine::crypto::decrypt(&token.encrypted_payload, &key).unwrap();
    assert_eq!(decrypted, canonical.to_vec());

    // A payload sealed elsewhere with the same key opens in the session.
    let foreign = encrypt(&canonical, &key).unwrap();
    let opened = session.decrypt_locally(&foreign).await.unwrap();
    assert_eq!(opened.pan, "378282246310005");
    assert_eq!(opened.network, CardNetwork::Amex);
}

#[tokio::test]
async fn stored_metadata_matches_what_retrieve_returns() {
    let ledger = ledger();
    ledger.set_time(1_800_000_000);
    let session = secret_session(&ledger, &VaultKeypair::generate());

    let stored = session
        .tokenize_and_store(&card("4242424242424242"))
        .await
        .unwrap();
    let fetched = session.retrieve().await.unwrap().unwrap();

    assert_eq!(stored.created_at, 1_800_000_000);
    assert!(stored.ledger_tx_id.is_some());
    assert_eq!(fetched.ledger_tx_id, None);
    let stored = TokenMetadata {
        ledger_tx_id: None,
        ..stored
    };
    assert_eq!(stored, fetched);
}

#[tokio::test]
async fn duplicate_store_maps_to_typed_error() {
    let ledger = ledger();
    let session = secret_session(&ledger, &VaultKeypair::generate());
    session
        .tokenize_and_store(&card("4242424242424242"))
        .await
        .unwrap();
    let err = session
        .tokenize_and_store(&card("5555555555554444"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::TokenAlreadyExists));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn invalid_cards_never_reach_the_ledger() {
    let ledger = ledger();
    let session = secret_session(&ledger, &VaultKeypair::generate());

    let cases = [
        (CardData::new("4242424242424243", "123", "12", "49", "X"), "number"),
        (CardData::new("4242424242424242", "12", "12", "49", "X"), "cvv"),
        (CardData::new("4242424242424242", "123", "13", "49", "X"), "month"),
    ];
    for (bad, label) in cases {
        let err = session.tokenize_and_store(&bad).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidCard(_)), "{label}: {err:?}");
    }
    assert_eq!(ledger.submitted_count(), 0);

    let err = session
        .tokenize_and_store(&CardData::new("4242424242424242", "123", "01", "21", "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidCard(CardError::Expired)));
}

#[tokio::test]
async fn expired_token_reads_back_expired() {
    let ledger = ledger();
    let session = secret_session(&ledger, &VaultKeypair::generate());
    session
        .tokenize_and_store(&card("4242424242424242"))
        .await
        .unwrap();

    ledger.set_time(2_524_608_001);
    let token = session.retrieve().await.unwrap().unwrap();
    assert_eq!(token.status, TokenStatus::Expired);
    assert_eq!(session.token_status().await.unwrap(), Some(TokenStatus::Expired));
}

#[tokio::test]
async fn sessions_are_isolated_per_user() {
    let ledger = ledger();
    let alice = secret_session(&ledger, &VaultKeypair::generate());
    let bob = secret_session(&ledger, &VaultKeypair::generate());

    let token = alice
        .tokenize_and_store(&card("4242424242424242"))
        .await
        .unwrap();
    assert_eq!(bob.lookup().await.unwrap(), TokenLookup::NoToken);
    assert!(matches!(
        bob.decrypt_token(&token).await,
        Err(VaultError::Authentication)
    ));
}

// ---------------------------------------------------------------------------
// Delegated wallet sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delegated_wallet_lifecycle() {
    let ledger = ledger();
    let wallet = Wallet::new(VaultKeypair::generate());
    let session = wallet_session(&ledger, &wallet);
    assert!(session.can_sign());
    assert!(session.can_encrypt());

    let token = session
        .tokenize_and_store(&card("6011000990139424"))
        .await
        .unwrap();
    assert_eq!(token.card_network, CardNetwork::Rupay);
    let plain = session.decrypt_token(&token).await.unwrap();
    assert_eq!(plain.pan, "6011000990139424");

    // One challenge prompt for the whole session.
    assert_eq!(wallet.message_prompts.load(Ordering::SeqCst), 1);
    assert_eq!(wallet.transaction_prompts.load(Ordering::SeqCst), 1);

    assert!(session.revoke().await.is_revoked());
    assert_eq!(wallet.transaction_prompts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn delegated_key_is_stable_across_sessions() {
    let ledger = ledger();
    let keypair = VaultKeypair::generate();
    let first = wallet_session(&ledger, &Wallet::new(keypair.clone()));
    let token = first
        .tokenize_and_store(&card("4242424242424242"))
        .await
        .unwrap();

    // Key = SHA-256(signature over the challenge).
    let signature = keypair.sign(challenge(&keypair.address()).as_bytes());
    let key = sha256(signature.as_bytes());
    assert!(cardvault_engine::crypto::decrypt(&token.encrypted_payload, &key).is_ok());

    let wallet = Wallet::new(keypair);
    let second = Arc::new(wallet_session(&ledger, &wallet));
    let reads = (0..5).map(|_| {
        let session = second.clone();
        let payload = token.encrypted_payload.clone();
        async move { session.decrypt_locally(&payload).await }
    });
    for result in futures::future::join_all(reads).await {
        assert_eq!(result.unwrap().pan, "4242424242424242");
    }
    assert_eq!(wallet.message_prompts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn impostor_signature_is_refused_before_submission() {
    let ledger = ledger();
    let keypair = VaultKeypair::generate();
    ledger.fund(&keypair.address());
    let session = VaultSession::builder(config())
        .public_identity(keypair.address())
        .transaction_signer(Arc::new(ImpostorSigner(VaultKeypair::generate())))
        .message_signer(Arc::new(keypair))
        .ledger(ledger.clone())
        .build()
        .unwrap();

    let err = session
        .tokenize_and_store(&card("4242424242424242"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Signer(SignerError::InvalidResponse(_))
    ));
    assert_eq!(ledger.submitted_count(), 0);
}

#[tokio::test]
async fn read_only_session() {
    let ledger = ledger();
    let owner = VaultKeypair::generate();
    secret_session(&ledger, &owner)
        .tokenize_and_store(&card("4242424242424242"))
        .await
        .unwrap();

    let observer = VaultSession::builder(config())
        .public_identity(owner.address())
        .ledger(ledger.clone())
        .build()
        .unwrap();
    assert!(!observer.can_sign());
    assert!(!observer.can_encrypt());

    // Public reads work, anything needing a signature does not.
    assert_eq!(observer.token_status().await.unwrap(), Some(TokenStatus::Active));
    assert_eq!(observer.get_mode().await.unwrap(), AccessMode::Standard);
    assert!(matches!(
        observer.retrieve().await,
        Err(VaultError::Capability(_))
    ));
    assert!(matches!(
        observer.revoke().await,
        RevokeOutcome::Failed { .. }
    ));
}

// ---------------------------------------------------------------------------
// Access modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn access_mode_is_read_fresh_every_time() {
    let ledger = ledger();
    let keypair = VaultKeypair::generate();
    let session = secret_session(&ledger, &keypair);
    let other_device = secret_session(&ledger, &keypair);

    assert_eq!(session.get_mode().await.unwrap(), AccessMode::Standard);
    other_device.set_mode(AccessMode::Sponsored).await.unwrap();
    assert_eq!(session.get_mode().await.unwrap(), AccessMode::Sponsored);
}

#[tokio::test]
async fn set_mode_needs_account_abstraction() {
    let ledger = Arc::new(InMemoryLedger::new(VAULT));
    let keypair = VaultKeypair::generate();
    ledger.fund(&keypair.address());
    let session = VaultSession::builder(VaultConfig::for_vault(VAULT))
        .secret(keypair)
        .ledger(ledger.clone())
        .build()
        .unwrap();

    assert_eq!(session.get_mode().await.unwrap(), AccessMode::Standard);
    assert!(matches!(
        session.set_mode(AccessMode::MultiSig).await,
        Err(VaultError::Configuration(_))
    ));
    assert_eq!(ledger.submitted_count(), 0);
}
