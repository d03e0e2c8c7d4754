// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # CardVault — Tokenization Engine
//!
//! Turns a raw payment card into an encrypted token anchored on a ledger,
//! under a key only its owner can derive, and runs the token's lifecycle
//! (store, retrieve, revoke, access-mode changes) against a vault contract.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - **card** — Luhn check, network detection, masking, canonical card bytes.
//! - **crypto** — AES-256-GCM payloads, SHA-256, Ed25519 keys and `card1…`
//!   addresses, encryption-key derivation.
//! - **signer** — local keypair or delegated wallet, one interface.
//! - **transaction** — vault calls as signed, id-addressed transactions.
//! - **ledger** — the `LedgerClient` seam: JSON-RPC over HTTP, or in-process.
//! - **vault** — the session facade that sequences all of the above.
//! - **config** — constants and runtime settings.
//!
//! ## Quick Tour
//!
//! Against the in-process ledger from the `test-util` feature:
//!
//! ```no_run
//! use std::sync::Arc;
//! use cardvault_engine::card::CardData;
//! use cardvault_engine::config::VaultConfig;
//! use cardvault_engine::crypto::VaultKeypair;
//! use cardvault_engine::ledger::InMemoryLedger;
//! use cardvault_engine::vault::VaultSession;
//!
//! # async fn run() -> Result<(), cardvault_engine::vault::VaultError> {
//! let keypair = VaultKeypair::generate();
//! let ledger = Arc::new(InMemoryLedger::new("CVAULT"));
//! ledger.fund(&keypair.address());
//!
//! let session = VaultSession::builder(VaultConfig::for_vault("CVAULT"))
//!     .secret(keypair)
//!     .ledger(ledger)
//!     .build()?;
//!
//! let card = CardData::new("4242 4242 4242 4242", "123", "12", "49", "Ada Lovelace");
//! let token = session.tokenize_and_store(&card).await?;
//! assert_eq!(token.last4_digits, "4242");
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! 1. The payload wire format (`IV(12) ‖ ciphertext ‖ tag(16)`) is shared
//!    with a verifier in another runtime. It does not change.
//! 2. Derived keys live in memory only, inside the session, and are
//!    zeroized on teardown.
//! 3. No `unsafe`.

pub mod card;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod ledger;
pub mod signer;
pub mod transaction;
pub mod vault;

pub use card::{CardData, CardNetwork};
pub use config::VaultConfig;
pub use vault::{AccessMode, RevokeOutcome, SessionBuilder, TokenMetadata, VaultError, VaultSession};
