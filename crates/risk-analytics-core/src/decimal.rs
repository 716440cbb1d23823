//! Fixed-point decimal value type.
//!
//! Wraps [`rust_decimal::Decimal`], which already gives us arbitrary
//! fixed-point precision and a lossless text round trip. The wrapper exists
//! so division is total: `rust_decimal` panics on division by zero, and
//! every other numeric op in this crate needs to surface that as a
//! `RiskError` instead of aborting the calculation worker.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(pub rust_decimal::Decimal);

impl Decimal {
    pub const ZERO: Decimal = Decimal(rust_decimal::Decimal::ZERO);
    pub const ONE: Decimal = Decimal(rust_decimal::Decimal::ONE);

    pub fn from_i64(v: i64) -> Self {
        Decimal(rust_decimal::Decimal::from(v))
    }

    /// Lossy by construction; `rust_decimal`'s own conversion documents the
    /// same trade-off.
    pub fn from_f64(v: f64) -> Self {
        Decimal(rust_decimal::Decimal::from_f64(v).unwrap_or(rust_decimal::Decimal::ZERO))
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn parse(s: &str) -> Result<Self, RiskError> {
        rust_decimal::Decimal::from_str(s)
            .map(Decimal)
            .map_err(|e| {
                RiskError::new(RiskErrorCode::InvalidConfidence)
                    .with_message(format!("failed to parse decimal '{s}': {e}"))
            })
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn sign(self) -> i32 {
        if self.is_zero() {
            0
        } else if self.is_negative() {
            -1
        } else {
            1
        }
    }

    pub fn abs(self) -> Self {
        Decimal(self.0.abs())
    }

    pub fn neg(self) -> Self {
        Decimal(-self.0)
    }

    pub fn add(self, other: Decimal) -> Decimal {
        Decimal(self.0 + other.0)
    }

    pub fn sub(self, other: Decimal) -> Decimal {
        Decimal(self.0 - other.0)
    }

    pub fn mul(self, other: Decimal) -> Decimal {
        Decimal(self.0 * other.0)
    }

    pub fn checked_div(self, other: Decimal) -> Result<Decimal, RiskError> {
        if other.is_zero() {
            return Err(RiskError::new(RiskErrorCode::DivisionByZero).with_details(
                "decimal_div",
                "non-zero divisor",
                "0",
            ));
        }
        Ok(Decimal(self.0 / other.0))
    }

    pub fn min(self, other: Decimal) -> Decimal {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Decimal) -> Decimal {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<rust_decimal::Decimal> for Decimal {
    fn from(v: rust_decimal::Decimal) -> Self {
        Decimal(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_after_arithmetic() {
        let a = Decimal::from_f64(0.1);
        let b = Decimal::from_f64(0.2);
        let sum = a.add(b);
        let text = sum.to_string();
        let parsed = Decimal::parse(&text).unwrap();
        assert_eq!(parsed, sum);
    }

    #[test]
    fn division_by_zero_is_an_error_not_a_panic() {
        let a = Decimal::from_i64(10);
        let err = a.checked_div(Decimal::ZERO).unwrap_err();
        assert_eq!(err.code, RiskErrorCode::DivisionByZero);
    }

    #[test]
    fn sign_predicates() {
        assert!(Decimal::from_i64(-5).is_negative());
        assert!(Decimal::from_i64(5).is_positive());
        assert!(Decimal::ZERO.is_zero());
        assert_eq!(Decimal::from_i64(-5).sign(), -1);
    }

    #[test]
    fn text_form_omits_trailing_zeros() {
        let d = Decimal::from_f64(1.5).mul(Decimal::from_i64(2));
        assert_eq!(d.to_string(), "3");
    }
}
