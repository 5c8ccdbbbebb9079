use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An amount of money in integer minor currency units (cents, kopecks, ...).
///
/// ERP price lists and document positions carry prices in minor units, so this type never
/// deals in fractions. The ERP is sloppy about number representation and serves price
/// values as floats (`12300.0`), so deserialization accepts either form and rounds.
/// Arithmetic that could overflow an `i64` is out of scope for the magnitudes a supply
/// order can reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(i64);

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(raw.round() as i64))
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Builds an amount from whole currency units.
    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Clamps a possibly-negative amount to zero. Positions written to the ERP must never
    /// carry a negative price.
    pub fn non_negative(self) -> Self {
        Self(self.0.max(0))
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_in_major_units() {
        assert_eq!(Money::from(12_345).to_string(), "123.45");
        assert_eq!(Money::from(5).to_string(), "0.05");
        assert_eq!(Money::from(-250).to_string(), "-2.50");
    }

    #[test]
    fn sums_and_scales() {
        let total: Money = [Money::from(100), Money::from(250)].into_iter().sum();
        assert_eq!(total, Money::from(350));
        assert_eq!(Money::from(150) * 3, Money::from(450));
        assert_eq!(Money::from_major(7), Money::from(700));
    }

    #[test]
    fn deserializes_integer_and_float_wire_forms() {
        assert_eq!(serde_json::from_str::<Money>("12300").unwrap(), Money::from(12_300));
        assert_eq!(serde_json::from_str::<Money>("12300.0").unwrap(), Money::from(12_300));
        assert_eq!(serde_json::to_string(&Money::from(12_300)).unwrap(), "12300");
    }

    #[test]
    fn clamps_negative_amounts() {
        assert_eq!(Money::from(-1).non_negative(), Money::from(0));
        assert_eq!(Money::from(42).non_negative(), Money::from(42));
    }
}
