//! # Card Module
//!
//! The plaintext side of tokenization: the [`CardData`] a caller hands in,
//! and the pure validator functions that decide whether it is worth
//! encrypting at all.
//!
//! ```text
//! data.rs        — CardData, CardNetwork, canonical serialization, expiry math
//! validation.rs  — Luhn check, network detection, display masking
//! ```
//!
//! Nothing in here performs I/O or touches key material, so every function
//! is safe to fuzz directly.

pub mod data;
pub mod validation;

pub use data::{CardData, CardError, CardNetwork};
pub use validation::{clean_pan, detect_network, mask_card_number, validate_card_number};
