//! Fixed-point unit conversion
//!
//! Converts between base units (wei) and human decimal strings (ether).
//! Pure functions with no provider access.

use primitive_types::U256;
use thiserror::Error;

/// Decimals in one ether
pub const ETHER_DECIMALS: usize = 18;

/// Errors parsing a decimal amount
#[derive(Debug, Error, PartialEq)]
pub enum UnitError {
    #[error("Amount is empty")]
    Empty,

    #[error("Amount must not be negative: {0}")]
    Negative(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Too many decimal places in {input} (max {decimals})")]
    TooPrecise { input: String, decimals: usize },

    #[error("Amount too large: {0}")]
    Overflow(String),
}

/// Format a base-unit value with `decimals` fractional digits
///
/// Trailing zeros are trimmed but at least one fractional digit is kept,
/// so `10^18` with 18 decimals formats as `"1.0"`.
pub fn format_units(value: U256, decimals: usize) -> String {
    if decimals == 0 {
        return format!("{}.0", value);
    }

    let base = U256::exp10(decimals);
    let (whole, fraction) = value.div_mod(base);

    let padded = format!("{:0>width$}", fraction.to_string(), width = decimals);
    let trimmed = padded.trim_end_matches('0');
    let fraction_str = if trimmed.is_empty() { "0" } else { trimmed };

    format!("{}.{}", whole, fraction_str)
}

/// Parse a decimal string into base units with `decimals` fractional digits
pub fn parse_units(input: &str, decimals: usize) -> Result<U256, UnitError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(UnitError::Empty);
    }
    if text.starts_with('-') {
        return Err(UnitError::Negative(input.to_string()));
    }

    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(UnitError::InvalidNumber(input.to_string()));
    }

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(UnitError::InvalidNumber(input.to_string()));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals {
        return Err(UnitError::TooPrecise {
            input: input.to_string(),
            decimals,
        });
    }

    let whole_value = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| UnitError::Overflow(input.to_string()))?
    };

    let fraction_value = if fraction.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{:0<width$}", fraction, width = decimals);
        U256::from_dec_str(&padded).map_err(|_| UnitError::InvalidNumber(input.to_string()))?
    };

    whole_value
        .checked_mul(U256::exp10(decimals))
        .and_then(|scaled| scaled.checked_add(fraction_value))
        .ok_or_else(|| UnitError::Overflow(input.to_string()))
}

/// Wei → ether string
pub fn format_ether(wei: U256) -> String {
    format_units(wei, ETHER_DECIMALS)
}

/// Ether string → wei
pub fn parse_ether(ether: &str) -> Result<U256, UnitError> {
    parse_units(ether, ETHER_DECIMALS)
}

/// Wei → display label such as `"1.5 ETH"`
pub fn eth_label(wei: U256) -> String {
    format!("{} ETH", format_ether(wei))
}

/// Clamp a 256-bit value into a u64
pub fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.low_u64()
    }
}
