//! Fixed-point monetary amounts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Currency used when neither the price list nor the prices name one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Number of decimal places kept for the currencies in use.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// A monetary amount held as an exact decimal.
///
/// Arithmetic never goes through binary floating point, so summing thousands
/// of line totals cannot drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Wraps a decimal amount as-is.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates an amount from an integer count of minor units (cents).
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, MINOR_UNIT_SCALE))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Rounds to the currency's minor unit, midpoints away from zero.
    pub fn round_to_minor_units(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiplies by a quantity and rounds the result to minor units.
    pub fn times(&self, quantity: u32) -> Money {
        Money(self.0 * Decimal::from(quantity)).round_to_minor_units()
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

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
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

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
