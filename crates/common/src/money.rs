//! Currency-agnostic decimal money.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of minor units per major unit (cents per euro).
const MINOR_UNIT_SCALE: u32 = 2;

/// Errors converting between major and minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The amount has more precision than the minor unit can represent.
    #[error("Amount {0} is not a whole number of minor units")]
    FractionalMinorUnits(Decimal),

    /// The amount does not fit in a signed 64-bit minor-unit count.
    #[error("Amount {0} overflows the minor-unit range")]
    Overflow(Decimal),
}

/// Money amount in major units, held as an exact decimal.
///
/// Internal values (tier prices, quoted prices, extras) are decimals; the
/// gateway reports integer minor units. Conversions in both directions are
/// exact or fail, never rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a money amount from a decimal in major units.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates a money amount from whole major units.
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Creates a money amount from minor units (e.g. cents).
    pub fn from_minor_units(minor: i64) -> Self {
        Self(Decimal::new(minor, MINOR_UNIT_SCALE))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal amount in major units.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Converts to minor units, failing if the conversion would lose precision.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        let scaled = self
            .0
            .checked_mul(Decimal::from(10_i64.pow(MINOR_UNIT_SCALE)))
            .ok_or(MoneyError::Overflow(self.0))?;

        if !scaled.fract().is_zero() {
            return Err(MoneyError::FractionalMinorUnits(self.0));
        }

        scaled.to_i64().ok_or(MoneyError::Overflow(self.0))
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiplies by a quantity, returning `None` if the product overflows.
    pub fn multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(Decimal::from(quantity)).map(Money)
    }

    /// Divides evenly by a count, returning `None` for a zero divisor.
    pub fn divide(&self, count: u32) -> Option<Money> {
        self.0.checked_div(Decimal::from(count)).map(Money)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
