//! Money Conversion Module
//!
//! Conversion between the decimal token amounts used by the orchestration
//! layer and the minimal-unit integers used at the chain-call boundary.
//! All conversions MUST go through this module.
//!
//! ## Representation
//! - Orchestration side: `rust_decimal::Decimal` in whole-token units
//! - Chain side: `BigUint` minimal units, 18-decimal fixed point
//! - Wire side: base-10 string of minimal units
//!
//! ## Usage
//! ```rust
//! use pos_bridge::money::{to_wei_string, from_minimal_units, to_minimal_units};
//! use rust_decimal::Decimal;
//!
//! let wei = to_wei_string(Decimal::new(15, 1)).unwrap();
//! assert_eq!(wei, "1500000000000000000");
//!
//! let units = to_minimal_units(Decimal::new(15, 1)).unwrap();
//! assert_eq!(from_minimal_units(&units).unwrap(), Decimal::new(15, 1));
//! ```

use num_bigint::BigUint;
use num_integer::Integer;
use rust_decimal::Decimal;
use thiserror::Error;

/// Decimals of the bridged token (ERC20 18-decimal fixed point)
pub const TOKEN_DECIMALS: u32 = 18;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Amount must not be negative")]
    NegativeAmount,

    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount too large to represent")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl MoneyError {
    pub fn code(&self) -> &'static str {
        match self {
            MoneyError::NegativeAmount => "NEGATIVE_AMOUNT",
            MoneyError::PrecisionOverflow { .. } => "PRECISION_OVERFLOW",
            MoneyError::Overflow => "OVERFLOW",
            MoneyError::InvalidFormat(_) => "INVALID_FORMAT",
        }
    }
}

fn unit_multiplier(exp: u32) -> BigUint {
    BigUint::from(10u8).pow(exp)
}

// ============================================================================
// Decimal → Minimal units
// ============================================================================

/// Convert a decimal token amount into minimal units.
///
/// Exact: rejects amounts carrying more than [`TOKEN_DECIMALS`] fractional
/// digits instead of truncating them.
pub fn to_minimal_units(amount: Decimal) -> Result<BigUint, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::NegativeAmount);
    }

    // "1.500" and "1.5" must convert identically
    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > TOKEN_DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: scale,
            max: TOKEN_DECIMALS,
        });
    }

    let mantissa = amount.mantissa().unsigned_abs();
    Ok(BigUint::from(mantissa) * unit_multiplier(TOKEN_DECIMALS - scale))
}

/// Base-10 minimal-unit string, as sent to the chain
pub fn to_wei_string(amount: Decimal) -> Result<String, MoneyError> {
    Ok(to_minimal_units(amount)?.to_str_radix(10))
}

// ============================================================================
// Minimal units → Decimal
// ============================================================================

/// Convert minimal units back into a decimal token amount.
///
/// Keeps every fractional digit. Trailing zeros are stripped before the
/// value is packed into the 96-bit decimal mantissa, so the result is
/// bounded by `Decimal::MAX` (about 7.9 * 10^28 tokens). Anything larger,
/// or any value whose significant digits exceed 96 bits, is `Overflow`.
pub fn from_minimal_units(units: &BigUint) -> Result<Decimal, MoneyError> {
    let ten = BigUint::from(10u8);
    let mut value = units.clone();
    let mut scale = TOKEN_DECIMALS;

    while scale > 0 && value.bits() > 0 {
        let (quotient, remainder) = value.div_rem(&ten);
        if remainder.bits() != 0 {
            break;
        }
        value = quotient;
        scale -= 1;
    }

    if value.bits() == 0 {
        return Ok(Decimal::ZERO);
    }

    let mantissa = i128::try_from(&value).map_err(|_| MoneyError::Overflow)?;
    Decimal::try_from_i128_with_scale(mantissa, scale).map_err(|_| MoneyError::Overflow)
}

/// Parse a hex word (`0x`-prefixed or bare) as an unsigned integer
pub fn parse_hex_uint(hex_str: &str) -> Result<BigUint, MoneyError> {
    let digits = hex_str.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Err(MoneyError::InvalidFormat("empty hex value".into()));
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| MoneyError::InvalidFormat(format!("invalid hex value: {}", hex_str)))
}

// ============================================================================
// Unit Tests
// ============================================================================
