//! # Transaction Module
//!
//! Construction, signing and verification of ledger transactions that
//! invoke the remote token vault.
//!
//! ## Architecture
//!
//! ```text
//! builder.rs      — Transaction, VaultFunction, ContractArg, TransactionBuilder
//! signing.rs      — in-process signing with a VaultKeypair
//! verification.rs — structural and cryptographic verification
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build**: the session assembles the call with [`TransactionBuilder`].
//! 2. **Sign**: [`sign_transaction`] for local keypairs, or the JSON
//!    envelope goes out to a delegated signer and comes back signed.
//! 3. **Verify**: [`verify_transaction`] before submission, and again on
//!    the ledger side.
//!
//! Transaction IDs are `hex(sha256(signable_bytes))`, excluding the
//! signature and signer key, so an ID is known before signing.

pub mod builder;
pub mod signing;
pub mod verification;

pub use builder::{ContractArg, Transaction, TransactionBuilder, VaultFunction};
pub use signing::sign_transaction;
pub use verification::{verify_transaction, TransactionError};
