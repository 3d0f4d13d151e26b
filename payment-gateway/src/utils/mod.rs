//! Money and reference helpers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

/// Symbol used in user-facing amounts; falls back to the ISO code.
pub fn currency_symbol(currency: &str) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "NGN" => "₦".to_string(),
        "USD" => "$".to_string(),
        "GBP" => "£".to_string(),
        "EUR" => "€".to_string(),
        "GHS" => "GH₵".to_string(),
        "KES" => "KSh".to_string(),
        "ZAR" => "R".to_string(),
        other => format!("{} ", other),
    }
}

/// Formats `amount` as e.g. `₦1,000` or `₦1,250.50`.
///
/// Whole amounts drop the fraction; anything else shows two decimals.
pub fn format_amount(currency: &str, amount: Decimal) -> String {
    let rounded = amount
        .abs()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let whole = rounded.trunc();
    let fraction = rounded - whole;

    let digits = whole.normalize().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };

    if fraction.is_zero() {
        format!("{}{}{}", sign, currency_symbol(currency), grouped)
    } else {
        let cents = (fraction * Decimal::from(100)).trunc();
        format!(
            "{}{}{}.{:02}",
            sign,
            currency_symbol(currency),
            grouped,
            cents.to_u32().unwrap_or(0)
        )
    }
}

/// Decimal places a stored or charged amount may carry.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// True when `amount` is a whole number of minor units (kobo, cents).
pub fn has_minor_unit_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= MINOR_UNIT_SCALE
}

/// Amount in the currency's smallest unit. `None` for sub-unit fractions
/// such as `0.004`, which have no exact representation.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    if !has_minor_unit_precision(amount) {
        return None;
    }
    (amount * Decimal::from(100)).trunc().to_i64()
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2).normalize()
}

/// Unique payment reference, e.g. `WAL_1700000000000_3f2a9c1e`.
pub fn new_reference(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        &simple[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn formats_naira_with_thousands_separators() {
        assert_eq!(format_amount("NGN", dec!(1000)), "₦1,000");
        assert_eq!(format_amount("NGN", dec!(5000.00)), "₦5,000");
        assert_eq!(format_amount("NGN", dec!(1234567.5)), "₦1,234,567.50");
        assert_eq!(format_amount("NGN", dec!(999)), "₦999");
        assert_eq!(format_amount("NGN", dec!(0)), "₦0");
    }

    #[test]
    fn formats_other_currencies() {
        assert_eq!(format_amount("USD", dec!(12.345)), "$12.35");
        assert_eq!(format_amount("XOF", dec!(100)), "XOF 100");
        assert_eq!(format_amount("NGN", dec!(-250)), "-₦250");
    }

    #[test]
    fn minor_unit_conversion() {
        assert_eq!(to_minor_units(dec!(5000)), Some(500000));
        assert_eq!(to_minor_units(dec!(10.50)), Some(1050));
        assert_eq!(to_minor_units(dec!(10.005)), None);
        assert_eq!(to_minor_units(dec!(0.004)), None);
        assert!(has_minor_unit_precision(dec!(12.3400)));
        assert!(!has_minor_unit_precision(dec!(0.001)));
        assert_eq!(from_minor_units(250050), dec!(2500.5));
    }

    #[test]
    fn references_carry_prefix_and_are_unique() {
        let a = new_reference("MOCK");
        let b = new_reference("MOCK");
        assert!(a.starts_with("MOCK_"));
        assert_ne!(a, b);
    }
}
