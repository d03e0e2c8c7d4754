//! Walkthrough of the card token lifecycle against an in-process ledger.
//!
//! Tokenizes a card with a raw-secret session, reads it back, decrypts it,
//! switches access mode, revokes, and then repeats the store with a
//! delegated wallet session. Output uses ANSI colors.
//!
//! Run with:
//!   cargo run --example demo

use std::sync::Arc;
use std::time::Instant;

use cardvault_engine::card::{mask_card_number, validate_card_number, CardData};
use cardvault_engine::config::VaultConfig;
use cardvault_engine::crypto::VaultKeypair;
use cardvault_engine::ledger::InMemoryLedger;
use cardvault_engine::vault::{AccessMode, VaultError, VaultSession};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";

const VAULT: &str = "CVAULT";
const ACCESS: &str = "CACCESS";

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=================================================={RESET}");
    println!("{BOLD}  {title}{RESET}");
}

fn kv(key: &str, value: impl std::fmt::Display) {
    println!("  {DIM}{key:<18}{RESET} {value}");
}

fn ok(text: &str) {
    println!("  {GREEN}[ok]{RESET} {text}");
}

fn config() -> VaultConfig {
    let mut cfg = VaultConfig::for_vault(VAULT).with_access_contract(ACCESS);
    cfg.poll_interval_ms = 10;
    cfg
}

#[tokio::main]
async fn main() -> Result<(), VaultError> {
    let started = Instant::now();
    let ledger = Arc::new(InMemoryLedger::new(VAULT).with_access_contract(ACCESS));

    // -----------------------------------------------------------------------
    section(1, "Validate the card");
    // -----------------------------------------------------------------------
    let card = CardData::new("4242 4242 4242 4242", "123", "12", "49", "Ada Lovelace");
    kv("masked", mask_card_number(&card.pan));
    kv("luhn", validate_card_number(&card.pan));
    kv("network", card.normalized().network);

    // -----------------------------------------------------------------------
    section(2, "Open a raw-secret session");
    // -----------------------------------------------------------------------
    let alice = VaultKeypair::generate();
    ledger.fund(&alice.address());
    let session = VaultSession::builder(config())
        .secret(alice.clone())
        .ledger(ledger.clone())
        .build()?;
    kv("address", alice.address());
    kv("can sign", session.can_sign());
    kv("can encrypt", session.can_encrypt());

    // -----------------------------------------------------------------------
    section(3, "Tokenize and store");
    // -----------------------------------------------------------------------
    let token = session.tokenize_and_store(&card).await?;
    kv("token hash", token.token_hash);
    kv("payload bytes", token.encrypted_payload.len());
    kv("last4", &token.last4_digits);
    kv("expires at", token.expires_at);
    kv("ledger tx", token.ledger_tx_id.as_deref().unwrap_or("-"));
    ok("stored");

    // -----------------------------------------------------------------------
    section(4, "Retrieve and decrypt locally");
    // -----------------------------------------------------------------------
    if let Some(fetched) = session.retrieve().await? {
        let plain = session.decrypt_token(&fetched).await?;
        kv("status", fetched.status);
        kv("decrypted", mask_card_number(&plain.pan));
        ok("round trip through the vault");
    }

    // -----------------------------------------------------------------------
    section(5, "Access mode");
    // -----------------------------------------------------------------------
    kv("before", session.get_mode().await?);
    session.set_mode(AccessMode::Sponsored).await?;
    kv("after", session.get_mode().await?);

    // -----------------------------------------------------------------------
    section(6, "Duplicate store, then revoke");
    // -----------------------------------------------------------------------
    match session.tokenize_and_store(&card).await {
        Err(VaultError::TokenAlreadyExists) => ok("vault refused the second card"),
        other => println!("  {RED}unexpected: {other:?}{RESET}"),
    }
    let outcome = session.revoke().await;
    kv("revoke", format!("{outcome:?}"));
    kv("status now", format!("{:?}", session.token_status().await?));

    // -----------------------------------------------------------------------
    section(7, "Delegated wallet session");
    // -----------------------------------------------------------------------
    let wallet = Arc::new(VaultKeypair::generate());
    ledger.fund(&wallet.address());
    let delegated = VaultSession::builder(config())
        .public_identity(wallet.address())
        .transaction_signer(wallet.clone())
        .message_signer(wallet.clone())
        .ledger(ledger.clone())
        .build()?;
    let token = delegated
        .tokenize_and_store(&CardData::new("5555555555554444", "321", "06", "45", "Grace Hopper"))
        .await?;
    kv("network", token.card_network);
    kv("decrypted", mask_card_number(&delegated.decrypt_token(&token).await?.pan));
    ok("wallet never handed over its secret");

    println!();
    println!(
        "{BOLD}{GREEN}Done{RESET} in {:.1?}, {} transactions on the ledger.",
        started.elapsed(),
        ledger.submitted_count()
    );
    Ok(())
}
