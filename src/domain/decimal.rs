//! Fixed-point money type backed by rust_decimal.
//!
//! Provides canonical parsing from strings, formatting without exponent notation,
//! and minor-unit (2 decimal place) quantization for currency amounts.

use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Number of decimal places in a currency minor unit.
pub const MINOR_UNIT_DP: u32 = 2;

/// Lossless decimal numeric type for money arithmetic.
///
/// Backed by rust_decimal to avoid floating-point drift in financial sums.
/// Serializes to a JSON number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    /// Whole currency units (or any integer quantity).
    pub fn from_i64(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent notation).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Format with exactly two decimal places, e.g. `810.00`.
    pub fn to_minor_string(&self) -> String {
        format!("{:.2}", self.round_minor().0)
    }

    /// Quantize to minor units, truncating toward zero.
    ///
    /// Truncation guarantees a set of rounded shares never sums above the
    /// amount they were carved from.
    pub fn round_minor(&self) -> Self {
        Decimal(
            self.0
                .round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::ToZero),
        )
    }

    /// Returns true if the value carries no precision beyond minor units.
    pub fn is_minor_precise(&self) -> bool {
        self.round_minor() == *self
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// `self + rhs`, or `None` when the result is out of range.
    pub fn checked_add(&self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_add(rhs.0).map(Decimal)
    }

    /// `self * rhs`, or `None` when the result is out of range.
    pub fn checked_mul(&self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_mul(rhs.0).map(Decimal)
    }

    /// Returns the value 100.
    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    /// `self` percent of `base`, unrounded.
    pub fn percent_of(&self, base: Decimal) -> Decimal {
        Decimal(base.0 * self.0 / RustDecimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

impl<'a> Sum<&'a Decimal> for Decimal {
    fn sum<I: Iterator<Item = &'a Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + *d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_canonical_no_exponent() {
        let decimal = Decimal::from_str_canonical("1000.00").expect("parse failed");
        let formatted = decimal.to_canonical_string();
        assert!(!formatted.contains('e'));
        assert_eq!(formatted, "1000");
    }

    #[test]
    fn test_round_minor_truncates() {
        let third = Decimal::from_i64(100) / Decimal::from_i64(3);
        assert_eq!(third.round_minor().to_canonical_string(), "33.33");

        let just_under = Decimal::from_str_canonical("0.019").unwrap();
        assert_eq!(just_under.round_minor().to_canonical_string(), "0.01");
    }

    #[test]
    fn test_minor_string_pads() {
        assert_eq!(Decimal::from_i64(810).to_minor_string(), "810.00");
        assert_eq!(
            Decimal::from_str_canonical("12.5").unwrap().to_minor_string(),
            "12.50"
        );
    }

    #[test]
    fn test_is_minor_precise() {
        assert!(Decimal::from_str_canonical("10.25").unwrap().is_minor_precise());
        assert!(!Decimal::from_str_canonical("10.255").unwrap().is_minor_precise());
    }

    #[test]
    fn test_percent_of() {
        let pool = Decimal::from_i64(2700);
        let share = Decimal::from_i64(60).percent_of(pool);
        assert_eq!(share, Decimal::from_i64(1620));
    }

    #[test]
    fn test_decimal_json_serialization() {
        let decimal = Decimal::from_str_canonical("123.45").unwrap();
        let json = serde_json::to_value(decimal).unwrap();
        assert!(json.is_number());
        assert_eq!(json.to_string(), "123.45");
    }

    #[test]
    fn test_sum() {
        let values = vec![
            Decimal::from_i64(810),
            Decimal::from_i64(810),
            Decimal::from_i64(405),
        ];
        let total: Decimal = values.iter().sum();
        assert_eq!(total, Decimal::from_i64(2025));
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let max = Decimal::from(RustDecimal::MAX);
        assert_eq!(max.checked_add(Decimal::from_i64(1)), None);
        assert_eq!(max.checked_mul(Decimal::from_i64(2)), None);
        assert_eq!(
            Decimal::from_i64(2).checked_add(Decimal::from_i64(3)),
            Some(Decimal::from_i64(5))
        );
        assert_eq!(
            Decimal::from_i64(4).checked_mul(Decimal::from_i64(3)),
            Some(Decimal::from_i64(12))
        );
    }

    #[test]
    fn test_decimal_ordering() {
        let a = Decimal::from_str_canonical("10").unwrap();
        let b = Decimal::from_str_canonical("20").unwrap();
        assert!(a < b);
        assert!(b > a);
    }
}
