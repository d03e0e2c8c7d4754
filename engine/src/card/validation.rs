//! Card number validation, network classification and display masking.
//!
//! All three functions operate on the *cleaned* PAN: spaces and dashes are
//! stripped first, so `"4242 4242-4242 4242"` and `"4242424242424242"` are
//! treated identically.

use super::data::CardNetwork;
use crate::config::{PAN_MAX_LENGTH, PAN_MIN_LENGTH, VISIBLE_PAN_DIGITS};

/// Strips the separators people type into card fields.
pub fn clean_pan(pan: &str) -> String {
    pan.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

/// Returns `true` if `pan` is a structurally valid card number.
///
/// Rejects non-digit input and lengths outside 13..=19, then runs the Luhn
/// checksum: every second digit from the right is doubled (minus 9 when the
/// result exceeds 9), and the digit sum must be divisible by 10.
pub fn validate_card_number(pan: &str) -> bool {
    let cleaned = clean_pan(pan);
    if !(PAN_MIN_LENGTH..=PAN_MAX_LENGTH).contains(&cleaned.len()) {
        return false;
    }
    if !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    luhn_sum(&cleaned) % 10 == 0
}

fn luhn_sum(digits: &str) -> u32 {
    digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum()
}

/// Classifies a PAN by its issuer prefix. First matching rule wins.
///
/// | Prefix | Network |
/// |---|---|
/// | `4` | Visa |
/// | `51`–`55`, `2221`–`2720` | Mastercard |
/// | `60`, `6521`, `6522` | RuPay |
/// | `34`, `37` | Amex |
pub fn detect_network(pan: &str) -> CardNetwork {
    let cleaned = clean_pan(pan);
    if !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return CardNetwork::Unknown;
    }

    let prefix = |len: usize| -> Option<u32> { cleaned.get(..len)?.parse().ok() };

    if cleaned.starts_with('4') {
        return CardNetwork::Visa;
    }
    if matches!(prefix(2), Some(51..=55)) || matches!(prefix(4), Some(2221..=2720)) {
        return CardNetwork::Mastercard;
    }
    if matches!(prefix(2), Some(60)) || matches!(prefix(4), Some(6521 | 6522)) {
        return CardNetwork::Rupay;
    }
    if matches!(prefix(2), Some(34 | 37)) {
        return CardNetwork::Amex;
    }
    CardNetwork::Unknown
}

/// Masks everything but the last four cleaned digits with `*`.
///
/// Inputs shorter than four characters are masked entirely.
pub fn mask_card_number(pan: &str) -> String {
    let cleaned = clean_pan(pan);
    let len = cleaned.chars().count();
    if len < VISIBLE_PAN_DIGITS {
        return "*".repeat(len);
    }
    let visible: String = cleaned.chars().skip(len - VISIBLE_PAN_DIGITS).collect();
    format!("{}{}", "*".repeat(len - VISIBLE_PAN_DIGITS), visible)
}
