//! # Vault Module — Card Token Lifecycle
//!
//! Everything that talks to the vault contract on a user's behalf.
//!
//! ```text
//! session.rs  — VaultSession + SessionBuilder: store, retrieve, revoke, decrypt
//! access.rs   — AccessMode and the get_mode / set_mode controller
//! token.rs    — TokenRecord (wire), TokenMetadata, lookup and revoke outcomes
//! error.rs    — VaultError, the taxonomy every session call returns
//! ```
//!
//! ## Ground Rules
//!
//! 1. **Plaintext never leaves the session.** The only card data that
//!    crosses the ledger boundary is ciphertext, a hash, the last four
//!    digits and the network name.
//!
//! 2. **The vault is the source of truth.** The session does not pre-check
//!    whether a token exists or cache the access mode. It asks, or it acts
//!    and maps the vault's answer to a typed error.
//!
//! 3. **Capabilities are checked up front.** An operation the session
//!    cannot complete fails before any network call.

pub mod access;
pub mod error;
pub mod session;
pub mod token;

pub use access::AccessMode;
pub use error::VaultError;
pub use session::{SessionBuilder, VaultSession};
pub use token::{RevokeOutcome, TokenHash, TokenLookup, TokenMetadata, TokenRecord, TokenStatus};
