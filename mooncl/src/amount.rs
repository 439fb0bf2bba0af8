//! Conversion between human-entered amounts and canonical integer amounts.
//!
//! Every value that crosses a contract-call boundary is a [`U256`] in the
//! token's smallest unit. User input (`"0.5"`, a JSON number, a
//! [`Decimal`]) is converted exactly once, here, using integer arithmetic only.

use std::fmt;

use alloy_primitives::U256;
use rust_decimal::Decimal;

/// Decimals of the native currency on every supported chain (CELO, PAS).
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest supported number of decimals; `10^77` still fits in a `U256`.
pub const MAX_DECIMALS: u8 = 77;

/// Error returned when an input cannot be turned into an amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input was empty or only whitespace.
    #[error("amount is empty")]
    Empty,
    /// The input contains something other than digits and one decimal point.
    #[error("amount {0:?} is not a number")]
    NotANumber(String),
    /// The input is below zero.
    #[error("amount {0:?} is negative")]
    Negative(String),
    /// A float input was NaN or infinite.
    #[error("amount is not finite")]
    NotFinite,
    /// More fractional digits than the unit can represent.
    #[error("amount {input:?} has more than {decimals} fractional digits")]
    TooPrecise {
        /// The offending input.
        input: String,
        /// Decimals of the target unit.
        decimals: u8,
    },
    /// The value does not fit in 256 bits.
    #[error("amount {0:?} overflows 256 bits")]
    Overflow(String),
    /// The requested unit is wider than [`MAX_DECIMALS`].
    #[error("unsupported decimals {0}")]
    UnsupportedDecimals(u8),
}

/// Returns `10^decimals` as a [`U256`].
fn scale(decimals: u8) -> Result<U256, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    Ok(U256::from(10u8).pow(U256::from(decimals)))
}

fn digits(input: &str, part: &str) -> Result<U256, AmountError> {
    if part.is_empty() {
        return Ok(U256::ZERO);
    }
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::NotANumber(input.to_owned()));
    }
    U256::from_str_radix(part, 10).map_err(|_| AmountError::Overflow(input.to_owned()))
}

/// Parses a decimal string such as `"1.5"` into the smallest unit with `decimals` places.
///
/// Accepts plain decimal notation only: digits with at most one `.`, no sign,
/// no exponent. Surrounding whitespace is ignored. Trailing fractional zeros
/// beyond `decimals` are accepted; any other excess precision is rejected
/// rather than rounded.
///
/// # Errors
///
/// Returns [`AmountError`] for empty, negative, non-numeric, over-precise or
/// overflowing input.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let unit = scale(decimals)?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(trimmed.to_owned()));
    }

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::NotANumber(trimmed.to_owned()));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > usize::from(decimals) {
        return Err(AmountError::TooPrecise {
            input: trimmed.to_owned(),
            decimals,
        });
    }

    let whole = digits(trimmed, whole)?;
    let mut fraction_value = digits(trimmed, fraction)?;
    // Right-pad the fractional digits up to the unit.
    #[allow(clippy::cast_possible_truncation)]
    let padding = decimals - fraction.len() as u8;
    fraction_value *= scale(padding)?;

    whole
        .checked_mul(unit)
        .and_then(|w| w.checked_add(fraction_value))
        .ok_or_else(|| AmountError::Overflow(trimmed.to_owned()))
}

/// Parses a native-currency amount (18 decimals), like `parseEther`.
///
/// # Errors
///
/// See [`parse_units`].
pub fn parse_native(input: &str) -> Result<U256, AmountError> {
    parse_units(input, NATIVE_DECIMALS)
}

/// Converts a float coming from an external source (e.g. a JSON price) into an amount.
///
/// The float is rendered with its shortest round-trip decimal representation
/// and then parsed as text, so no binary floating-point arithmetic is applied
/// to the value. Digits beyond `decimals` are rounded half up, like
/// `parseEther` on a JavaScript number; only text input is held to
/// [`parse_units`]'s exact precision.
///
/// # Errors
///
/// Returns [`AmountError::NotFinite`] for NaN or infinities, and the
/// [`parse_units`] errors otherwise.
pub fn from_f64(value: f64, decimals: u8) -> Result<U256, AmountError> {
    if !value.is_finite() {
        return Err(AmountError::NotFinite);
    }
    if value.is_sign_negative() && value != 0.0 {
        return Err(AmountError::Negative(value.to_string()));
    }
    let text = value.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    if fraction.len() <= usize::from(decimals) {
        return parse_units(&text, decimals);
    }
    let (kept, dropped) = fraction.split_at(usize::from(decimals));
    let truncated = parse_units(&format!("{whole}.{kept}"), decimals)?;
    if dropped.starts_with(['5', '6', '7', '8', '9']) {
        truncated
            .checked_add(U256::from(1u8))
            .ok_or_else(|| AmountError::Overflow(text.clone()))
    } else {
        Ok(truncated)
    }
}

/// Converts an exact [`Decimal`] into an amount.
///
/// # Errors
///
/// Returns an [`AmountError`] if the decimal is negative, carries more
/// fractional digits than `decimals`, or overflows.
pub fn from_decimal(value: Decimal, decimals: u8) -> Result<U256, AmountError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AmountError::Negative(value.to_string()));
    }
    let normalized = value.normalize();
    let fractional = normalized.scale();
    if fractional > u32::from(decimals) {
        return Err(AmountError::TooPrecise {
            input: value.to_string(),
            decimals,
        });
    }
    let mantissa = U256::from(normalized.mantissa().unsigned_abs());
    #[allow(clippy::cast_possible_truncation)]
    let padding = decimals - fractional as u8;
    mantissa
        .checked_mul(scale(padding)?)
        .ok_or_else(|| AmountError::Overflow(value.to_string()))
}

/// Formats an amount in the smallest unit as a minimal decimal string.
///
/// `format_units(U256::from(1_500_000_000_000_000_000u128), 18)` is `"1.5"`.
/// Trailing fractional zeros are dropped and whole numbers have no point, so
/// the output is the normal form accepted back by [`parse_units`].
///
/// # Errors
///
/// Returns [`AmountError::UnsupportedDecimals`] if `decimals` exceeds [`MAX_DECIMALS`].
pub fn format_units(amount: U256, decimals: u8) -> Result<String, AmountError> {
    let unit = scale(decimals)?;
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction.is_zero() {
        return Ok(whole.to_string());
    }
    let fraction = format!("{:0>width$}", fraction.to_string(), width = usize::from(decimals));
    Ok(format!("{whole}.{}", fraction.trim_end_matches('0')))
}

/// Formats a native-currency amount (18 decimals), like `formatEther`.
#[must_use]
pub fn format_native(amount: U256) -> String {
    format_units(amount, NATIVE_DECIMALS).unwrap_or_else(|_| amount.to_string())
}

/// A native-currency amount rendered for display, e.g. `0.001 CELO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeAmount<'a> {
    /// Value in wei.
    pub amount: U256,
    /// Currency symbol.
    pub symbol: &'a str,
}

impl fmt::Display for NativeAmount<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_native(self.amount), self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_parse_native_whole_and_fraction() {
        assert_eq!(parse_native("1").unwrap(), U256::from(ONE_ETHER));
        assert_eq!(parse_native("0.001").unwrap(), U256::from(ONE_ETHER / 1000));
        assert_eq!(parse_native(" 2.5 ").unwrap(), U256::from(ONE_ETHER * 5 / 2));
        assert_eq!(parse_native(".5").unwrap(), U256::from(ONE_ETHER / 2));
        assert_eq!(parse_native("3.").unwrap(), U256::from(ONE_ETHER * 3));
    }

    #[test]
    fn test_parse_units_rejects_malformed_input() {
        assert_eq!(parse_units("", 6), Err(AmountError::Empty));
        assert_eq!(parse_units("   ", 6), Err(AmountError::Empty));
        assert!(matches!(parse_units("abc", 6), Err(AmountError::NotANumber(_))));
        assert!(matches!(parse_units("1.2.3", 6), Err(AmountError::NotANumber(_))));
        assert!(matches!(parse_units(".", 6), Err(AmountError::NotANumber(_))));
        assert!(matches!(parse_units("1e18", 6), Err(AmountError::NotANumber(_))));
        assert!(matches!(parse_units("NaN", 6), Err(AmountError::NotANumber(_))));
        assert!(matches!(parse_units("+1", 6), Err(AmountError::NotANumber(_))));
        assert!(matches!(parse_units("-1", 6), Err(AmountError::Negative(_))));
    }

    #[test]
    fn test_parse_units_precision_limits() {
        assert_eq!(parse_units("1.500000", 2).unwrap(), U256::from(150u64));
        assert!(matches!(
            parse_units("1.234", 2),
            Err(AmountError::TooPrecise { decimals: 2, .. })
        ));
        assert!(matches!(parse_units("1", 78), Err(AmountError::UnsupportedDecimals(78))));
    }

    #[test]
    fn test_parse_units_overflow() {
        let max = U256::MAX.to_string();
        assert_eq!(parse_units(&max, 0).unwrap(), U256::MAX);
        assert!(matches!(parse_units(&max, 1), Err(AmountError::Overflow(_))));
    }

    #[test]
    fn test_format_units_normal_form() {
        assert_eq!(format_units(U256::from(ONE_ETHER), 18).unwrap(), "1");
        assert_eq!(format_units(U256::from(ONE_ETHER / 1000), 18).unwrap(), "0.001");
        assert_eq!(format_units(U256::from(150u64), 2).unwrap(), "1.5");
        assert_eq!(format_units(U256::ZERO, 18).unwrap(), "0");
        assert_eq!(format_units(U256::from(7u64), 0).unwrap(), "7");
    }

    #[test]
    fn test_decimal_strings_round_trip() {
        for input in ["0", "1", "0.001", "12.5", "1000000", "0.000000000000000001"] {
            let amount = parse_native(input).unwrap();
            assert_eq!(format_native(amount), input, "round trip of {input}");
        }
        for amount in [U256::ZERO, U256::from(1u8), U256::from(ONE_ETHER + 7), U256::MAX] {
            assert_eq!(parse_native(&format_native(amount)).unwrap(), amount);
        }
    }

    #[test]
    fn test_from_f64_uses_shortest_representation() {
        assert_eq!(from_f64(0.1, 18).unwrap(), U256::from(ONE_ETHER / 10));
        assert_eq!(from_f64(12.0, 18).unwrap(), U256::from(ONE_ETHER * 12));
        assert_eq!(from_f64(-0.0, 18).unwrap(), U256::ZERO);
        assert_eq!(from_f64(f64::NAN, 18), Err(AmountError::NotFinite));
        assert_eq!(from_f64(f64::INFINITY, 18), Err(AmountError::NotFinite));
        assert!(matches!(from_f64(-1.5, 18), Err(AmountError::Negative(_))));
    }

    #[test]
    fn test_from_f64_rounds_excess_precision() {
        assert_eq!(from_f64(1e-20, 18).unwrap(), U256::ZERO);
        assert_eq!(from_f64(1.5e-18, 18).unwrap(), U256::from(2u8));
        assert_eq!(from_f64(1.4e-18, 18).unwrap(), U256::from(1u8));
        assert_eq!(from_f64(0.125, 2).unwrap(), U256::from(13u8));
        assert_eq!(from_f64(0.124, 2).unwrap(), U256::from(12u8));
        assert_eq!(from_f64(2.5, 0).unwrap(), U256::from(3u8));
    }

    #[test]
    fn test_from_decimal_is_exact() {
        let price = Decimal::from_str("0.0125").unwrap();
        assert_eq!(from_decimal(price, 18).unwrap(), U256::from(ONE_ETHER / 80));
        let trailing = Decimal::from_str("2.500").unwrap();
        assert_eq!(from_decimal(trailing, 1).unwrap(), U256::from(25u8));
        let negative = Decimal::from_str("-0.1").unwrap();
        assert!(matches!(from_decimal(negative, 18), Err(AmountError::Negative(_))));
    }

    #[test]
    fn test_native_amount_display() {
        let fee = NativeAmount {
            amount: U256::from(ONE_ETHER / 1000),
            symbol: "CELO",
        };
        assert_eq!(fee.to_string(), "0.001 CELO");
    }
}
