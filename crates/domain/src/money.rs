//! Monetary amounts.

use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};

const SCALE: u32 = 2;

/// An amount in major currency units, always held at two decimal places.
///
/// Ledger arithmetic happens in major units. Minor units (kobo, cents) only
/// appear at the payment gateway boundary via [`Money::to_minor_units`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, SCALE));

    /// Creates an amount, rounding half away from zero to two places.
    pub fn new(amount: Decimal) -> Self {
        let mut amount = amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(SCALE);
        Self(amount)
    }

    /// Creates an amount from whole major units.
    pub fn from_major(units: i64) -> Self {
        Self::new(Decimal::from(units))
    }

    /// Creates an amount from minor units (hundredths).
    pub fn from_minor(minor: i64) -> Self {
        Self::new(Decimal::new(minor, SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns the amount in minor units, or `None` if it does not fit an `i64`.
    pub fn to_minor_units(&self) -> Option<i64> {
        self.0.checked_mul(dec!(100)).and_then(|minor| minor.to_i64())
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns `percent`% of this amount.
    pub fn percentage(&self, percent: Decimal) -> Money {
        let rate = percent / dec!(100);
        Money::new(self.0.saturating_mul(rate))
    }

    /// Multiplies by a quantity, saturating at the largest representable amount.
    pub fn times(&self, quantity: u32) -> Money {
        Money::new(self.0.saturating_mul(Decimal::from(quantity)))
    }

    pub fn checked_times(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(Decimal::from(quantity)).map(Money::new)
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money::new)
    }

    /// Sums amounts, or `None` on overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Returns zero for negative amounts.
    pub fn non_negative(self) -> Money {
        if self.is_negative() {
            Money::ZERO
        } else {
            self
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(Money::new)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money::new)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money::new(amount)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_are_kept_at_two_places() {
        assert_eq!(Money::from_major(1000).to_string(), "1000.00");
        assert_eq!(Money::new(dec!(10.005)).to_string(), "10.01");
        assert_eq!(Money::new(dec!(10.004)).to_string(), "10.00");
        assert_eq!(Money::from_minor(12345).to_string(), "123.45");
    }

    #[test]
    fn minor_units_scale_by_one_hundred() {
        assert_eq!(Money::from_major(300).to_minor_units(), Some(30_000));
        assert_eq!(Money::new(dec!(0.5)).to_minor_units(), Some(50));
    }

    #[test]
    fn percentage_rounds_to_cents() {
        assert_eq!(Money::from_major(1000).percentage(dec!(30)), Money::from_major(300));
        assert_eq!(Money::new(dec!(99.99)).percentage(dec!(30)), Money::new(dec!(30.00)));
        assert_eq!(Money::new(dec!(10.01)).percentage(dec!(50)), Money::new(dec!(5.01)));
    }

    #[test]
    fn arithmetic() {
        let total: Money = [Money::from_major(2), Money::from_minor(150)].into_iter().sum();
        assert_eq!(total, Money::new(dec!(3.50)));
        assert_eq!(Money::from_major(5).times(3), Money::from_major(15));
        assert_eq!((Money::from_major(1) - Money::from_major(3)).non_negative(), Money::ZERO);

        let mut paid = Money::ZERO;
        paid += Money::from_major(300);
        paid -= Money::from_major(100);
        assert_eq!(paid, Money::from_major(200));
    }

    #[test]
    fn serde_accepts_numbers_and_strings() {
        let from_number: Money = serde_json::from_str("1000").unwrap();
        let from_string: Money = serde_json::from_str("\"1000.5\"").unwrap();
        assert_eq!(from_number, Money::from_major(1000));
        assert_eq!(from_string.to_string(), "1000.50");
        assert_eq!(serde_json::to_string(&from_string).unwrap(), "\"1000.50\"");
    }

    #[test]
    fn zero_keeps_two_places() {
        assert_eq!(Money::ZERO.to_string(), "0.00");
        assert_eq!(Money::default().to_string(), "0.00");
        assert_eq!(serde_json::to_string(&Money::ZERO).unwrap(), "\"0.00\"");
        let settled = (Money::from_major(300) - Money::from_major(300)).non_negative();
        assert_eq!(settled.to_string(), "0.00");
        assert_eq!((Money::from_major(1) - Money::from_major(3)).non_negative().to_string(), "0.00");
    }

    #[test]
    fn overflow_is_reported_not_panicked() {
        let huge: Money = "70000000000000000000000000000".parse().unwrap();
        assert_eq!(huge.checked_times(2), None);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(Money::checked_sum([huge, huge]), None);
        assert_eq!(huge.to_minor_units(), None);

        let max: Money = "79228162514264337593543950335".parse().unwrap();
        assert_eq!(max.to_minor_units(), None);
        assert!(max.percentage(dec!(30)).is_positive());

        assert_eq!(Money::from_major(5).checked_times(3), Some(Money::from_major(15)));
        assert_eq!(
            Money::checked_sum([Money::from_major(2), Money::from_minor(150)]),
            Some(Money::new(dec!(3.50)))
        );
    }

    #[test]
    fn sign_checks() {
        assert!(Money::from_major(1).is_positive());
        assert!(Money::ZERO.is_zero());
        assert!(Money::from_major(-1).is_negative());
    }
}
