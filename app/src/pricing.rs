// storefront/src/pricing.rs

//! Membership tier discounts.
//!
//! A single percentage rule per tier, applied to display prices and cart
//! totals alike. Amounts are integer cents everywhere except
//! [`discounted_price`], which works on exact decimals.

use crate::models::user::Tier;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Fraction taken off the price for `tier`.
pub fn rate(tier: Tier) -> Decimal {
  match tier {
    Tier::Bronze => dec!(0),
    Tier::Silver => dec!(0.05),
    Tier::Gold => dec!(0.10),
    Tier::Platinum => dec!(0.15),
  }
}

/// `price * (1 - rate(tier))`, exact.
pub fn discounted_price(price: Decimal, tier: Tier) -> Decimal {
  price * (Decimal::ONE - rate(tier))
}

/// Discounted amount in cents, rounded half away from zero.
pub fn discounted_cents(price_cents: i64, tier: Tier) -> i64 {
  discounted_price(Decimal::from(price_cents), tier)
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .to_i64()
    .unwrap_or(price_cents)
}

/// Two-decimal rendering of a cent amount, e.g. `21250` -> `"212.50"`.
pub fn format_cents(cents: i64) -> String {
  Decimal::new(cents, 2).round_dp(2).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
  pub subtotal_cents: i64,
  pub discount_cents: i64,
  pub total_cents: i64,
  pub tier: Tier,
  pub discount_rate: Decimal,
}

/// Applies the tier discount once to the sum of `line_totals_cents`.
pub fn totals<I>(line_totals_cents: I, tier: Tier) -> Totals
where
  I: IntoIterator<Item = i64>,
{
  let subtotal_cents: i64 = line_totals_cents.into_iter().sum();
  let total_cents = discounted_cents(subtotal_cents, tier);
  Totals {
    subtotal_cents,
    discount_cents: subtotal_cents - total_cents,
    total_cents,
    tier,
    discount_rate: rate(tier),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const ALL_TIERS: [Tier; 4] = [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum];

  #[test]
  fn documented_examples() {
    assert_eq!(discounted_price(dec!(1000), Tier::Gold), dec!(900));
    assert_eq!(discounted_price(dec!(250), Tier::Platinum), dec!(212.5));
  }

  #[test]
  fn rates_per_tier() {
    assert_eq!(rate(Tier::Bronze), dec!(0));
    assert_eq!(rate(Tier::Silver), dec!(0.05));
    assert_eq!(rate(Tier::Gold), dec!(0.10));
    assert_eq!(rate(Tier::Platinum), dec!(0.15));
  }

  #[test]
  fn never_above_the_original_price() {
    for price in [dec!(0), dec!(0.01), dec!(1), dec!(19.99), dec!(250), dec!(1000), dec!(123456.78)] {
      for tier in ALL_TIERS {
        assert!(discounted_price(price, tier) <= price, "{} at {}", price, tier);
      }
    }
    for cents in [0_i64, 1, 3, 99, 1999, 25_000, 100_000] {
      for tier in ALL_TIERS {
        assert!(discounted_cents(cents, tier) <= cents);
      }
    }
  }

  #[test]
  fn higher_tiers_never_pay_more() {
    for cents in [1_i64, 7, 1999, 25_000] {
      let paid: Vec<i64> = ALL_TIERS.iter().map(|t| discounted_cents(cents, *t)).collect();
      assert!(paid.windows(2).all(|w| w[1] <= w[0]), "{:?}", paid);
    }
  }

  #[test]
  fn cents_round_half_away_from_zero() {
    // 0.95 * 1 = 0.95 -> 1; 0.85 * 25 = 21.25 -> 21; 0.95 * 10 = 9.5 -> 10
    assert_eq!(discounted_cents(1, Tier::Silver), 1);
    assert_eq!(discounted_cents(25, Tier::Platinum), 21);
    assert_eq!(discounted_cents(10, Tier::Silver), 10);
    assert_eq!(discounted_cents(25_000, Tier::Platinum), 21_250);
  }

  #[test]
  fn two_decimal_formatting() {
    assert_eq!(format_cents(21_250), "212.50");
    assert_eq!(format_cents(90_000), "900.00");
    assert_eq!(format_cents(5), "0.05");
    assert_eq!(format_cents(0), "0.00");
  }

  #[test]
  fn totals_apply_the_discount_once() {
    let t = totals([60_000, 40_000], Tier::Gold);
    assert_eq!(t.subtotal_cents, 100_000);
    assert_eq!(t.total_cents, 90_000);
    assert_eq!(t.discount_cents, 10_000);
    assert_eq!(t.discount_rate, dec!(0.10));

    let empty = totals(std::iter::empty(), Tier::Platinum);
    assert_eq!((empty.subtotal_cents, empty.total_cents), (0, 0));
  }
}
