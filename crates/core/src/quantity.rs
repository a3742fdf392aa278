//! Fixed-point stock quantities.
//!
//! Every quantity in the warehouse (purchased units, moved/returned/donated/
//! lost/lent units, stored totals) is a `Quantity`. It wraps a decimal so that
//! fractional units (e.g. 2.5 m of cable) add up exactly and survive a round
//! trip through storage unchanged.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);
    pub const MAX: Quantity = Quantity(Decimal::MAX);

    pub fn new(value: Decimal) -> Self {
        Self(value.normalize())
    }

    /// Whole units.
    pub fn units(value: i64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// `None` when the sum is out of range.
    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_add(rhs.0).map(Quantity)
    }

    /// `None` when the difference is out of range.
    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_sub(rhs.0).map(Quantity)
    }

    /// [`checked_add`](Self::checked_add) as a validation error.
    pub fn try_add(self, rhs: Quantity) -> Result<Quantity, DomainError> {
        self.checked_add(rhs)
            .ok_or_else(|| DomainError::validation(format!("quantity out of range: {self} + {rhs}")))
    }

    /// [`checked_sub`](Self::checked_sub) as a validation error.
    pub fn try_sub(self, rhs: Quantity) -> Result<Quantity, DomainError> {
        self.checked_sub(rhs)
            .ok_or_else(|| DomainError::validation(format!("quantity out of range: {self} - {rhs}")))
    }

    /// Fails with a validation error naming `field` when the quantity is below zero.
    pub fn ensure_non_negative(self, field: &str) -> Result<Self, DomainError> {
        if self.is_negative() {
            return Err(DomainError::validation(format!(
                "{field} cannot be negative (got {self})"
            )));
        }
        Ok(self)
    }
}

impl ValueObject for Quantity {}

impl From<i64> for Quantity {
    fn from(value: i64) -> Self {
        Self::units(value)
    }
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid quantity '{s}': {e}")))?;
        Ok(Self::new(value))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0.normalize(), f)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 - rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        self.0 -= rhs.0;
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Quantity {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_units_add_exactly() {
        let a: Quantity = "0.1".parse().unwrap();
        let b: Quantity = "0.2".parse().unwrap();
        assert_eq!(a + b, "0.3".parse().unwrap());
    }

    #[test]
    fn trailing_zeros_do_not_affect_equality_or_display() {
        let a: Quantity = "2.50".parse().unwrap();
        let b: Quantity = "2.5".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "2.5");
    }

    #[test]
    fn ensure_non_negative_rejects_below_zero() {
        let q = Quantity::units(3) - Quantity::units(4);
        assert!(q.is_negative());
        assert!(matches!(
            q.ensure_non_negative("lent"),
            Err(DomainError::Validation(msg)) if msg.contains("lent")
        ));
        assert!(Quantity::ZERO.ensure_non_negative("lent").is_ok());
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let max = Quantity::MAX;
        assert_eq!(max.checked_add(Quantity::units(1)), None);
        assert_eq!((-max).checked_sub(max), None);
        assert_eq!(
            Quantity::units(2).checked_sub(Quantity::units(3)),
            Some(Quantity::units(-1))
        );
        assert!(matches!(
            max.try_add(max),
            Err(DomainError::Validation(msg)) if msg.contains("out of range")
        ));
        assert_eq!(max.try_sub(max).unwrap(), Quantity::ZERO);
    }

    #[test]
    fn rejects_garbage() {
        assert!("four".parse::<Quantity>().is_err());
    }

    #[test]
    fn serializes_transparently() {
        let q = Quantity::units(7);
        let json = serde_json::to_string(&q).unwrap();
        let back: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
