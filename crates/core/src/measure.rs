//! Physical measures used throughout procurement and stock keeping.
//!
//! Amounts are integers in the smallest unit (kilograms, metres). Quintals
//! (100 kg) are a display/reporting unit only; floats never enter the domain.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

pub const KG_PER_QUINTAL: i64 = 100;

/// A signed quantity of paddy in kilograms.
///
/// Signed because ledger arithmetic (closing = opening + received − issued)
/// can legitimately go negative when issues outrun a stale book.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub fn from_kg(kg: i64) -> Self {
        Self(kg)
    }

    pub fn from_quintals(quintals: i64) -> Self {
        Self(quintals * KG_PER_QUINTAL)
    }

    pub fn kg(&self) -> i64 {
        self.0
    }

    /// Quintals for display/reporting (2 decimal places of precision).
    pub fn as_quintals(&self) -> f64 {
        self.0 as f64 / KG_PER_QUINTAL as f64
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }
}

impl core::ops::Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl core::ops::Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 - rhs.0)
    }
}

impl core::ops::AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl core::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        Quantity(iter.map(|q| q.0).sum())
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2} q", self.as_quintals())
    }
}

impl ValueObject for Quantity {}

/// Road distance from a mandi to the mill, in metres.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Distance(u32);

impl Distance {
    pub fn from_metres(metres: u32) -> Self {
        Self(metres)
    }

    /// Parse a kilometre figure as entered on the dashboard (e.g. `12.5`).
    pub fn from_km(km: f64) -> DomainResult<Self> {
        if !km.is_finite() || km < 0.0 {
            return Err(DomainError::validation("distance must be a non-negative number"));
        }
        let metres = (km * 1000.0).round();
        if metres > u32::MAX as f64 {
            return Err(DomainError::validation("distance out of range"));
        }
        Ok(Self(metres as u32))
    }

    pub fn metres(&self) -> u32 {
        self.0
    }

    pub fn km(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl core::fmt::Display for Distance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.1} km", self.km())
    }
}

impl ValueObject for Distance {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quintal_conversion_round_trips() {
        let q = Quantity::from_quintals(25);
        assert_eq!(q.kg(), 2500);
        assert_eq!(q.as_quintals(), 25.0);
    }

    #[test]
    fn ledger_arithmetic_can_go_negative() {
        let closing = Quantity::from_kg(100) - Quantity::from_kg(250);
        assert!(closing.is_negative());
        assert_eq!(closing.kg(), -150);
    }

    #[test]
    fn distance_parses_dashboard_kilometres() {
        let d = Distance::from_km(12.5).unwrap();
        assert_eq!(d.metres(), 12_500);
        assert!(Distance::from_km(-1.0).is_err());
        assert!(Distance::from_km(f64::NAN).is_err());
    }
}
