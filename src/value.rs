//! # Value Types
//!
//! $$
//! w_i = \frac{q_i \cdot p_i}{\text{NAV}} \cdot 100
//! $$
//!
//! Immutable monetary amounts, bounded percentage weights and position
//! snapshots. Positions are rebuilt from the raw holdings feed on every
//! analysis run; nothing here is ever mutated in place.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;

/// Currency used when the holdings feed does not carry one.
pub const DEFAULT_CURRENCY: &str = "VND";

/// Exact-decimal monetary amount tagged with a currency code.
///
/// Arithmetic between two amounts requires equal currencies; mixing them is a
/// contract error, not a numeric approximation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
  pub amount: Decimal,
  pub currency: String,
}

impl Money {
  pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
    Self {
      amount,
      currency: currency.into(),
    }
  }

  /// Amount in the default currency.
  pub fn vnd(amount: Decimal) -> Self {
    Self::new(amount, DEFAULT_CURRENCY)
  }

  pub fn zero() -> Self {
    Self::vnd(Decimal::ZERO)
  }

  /// Sum of two amounts of the same currency.
  pub fn try_add(&self, other: &Money) -> Result<Money> {
    self.check_currency(other)?;
    Ok(Money::new(self.amount + other.amount, self.currency.clone()))
  }

  /// Difference of two amounts of the same currency.
  pub fn try_sub(&self, other: &Money) -> Result<Money> {
    self.check_currency(other)?;
    Ok(Money::new(self.amount - other.amount, self.currency.clone()))
  }

  /// Scale by a float factor, converted to exact decimal first.
  pub fn try_mul(&self, factor: f64) -> Result<Money> {
    let factor =
      Decimal::from_f64_retain(factor).ok_or(PortfolioError::NonFiniteFactor(factor))?;
    Ok(Money::new(self.amount * factor, self.currency.clone()))
  }

  /// Scale by an integer quantity.
  pub fn mul_quantity(&self, quantity: i64) -> Money {
    Money::new(self.amount * Decimal::from(quantity), self.currency.clone())
  }

  /// Validate that two amounts share a currency.
  pub fn check_currency(&self, other: &Money) -> Result<()> {
    if self.currency != other.currency {
      return Err(PortfolioError::CurrencyMismatch(
        self.currency.clone(),
        other.currency.clone(),
      ));
    }
    Ok(())
  }
}

/// Percentage weight constrained to the closed range [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Weight {
  percentage: Decimal,
}

impl Weight {
  /// Construct a weight, failing loudly outside [0, 100].
  pub fn try_new(percentage: Decimal) -> Result<Self> {
    if percentage < Decimal::ZERO || percentage > Decimal::from(100) {
      return Err(PortfolioError::WeightOutOfRange(percentage.to_string()));
    }
    Ok(Self { percentage })
  }

  pub fn zero() -> Self {
    Self {
      percentage: Decimal::ZERO,
    }
  }

  pub fn percentage(&self) -> Decimal {
    self.percentage
  }
}

/// Snapshot of a single holding, rebuilt fresh for every analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub symbol: String,
  pub quantity: i64,
  pub market_price: Money,
  pub cost_price: Money,
  pub break_even_price: Money,
  /// Weight relative to net asset value.
  pub weight: Weight,
  /// Weight relative to invested-only (stock) value.
  pub weight_over_sv: Weight,
  pub realized_profit: Option<Money>,
  pub unrealized_profit: Option<Money>,
}

impl Position {
  /// Market price times quantity.
  pub fn market_value(&self) -> Money {
    self.market_price.mul_quantity(self.quantity)
  }
}

/// Account-level cash figures consumed alongside the position list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
  pub available_cash: Money,
  pub net_asset_value: Money,
  pub stock_value: Money,
}

/// One row of the raw holdings feed, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDeal {
  pub symbol: String,
  pub accumulated_quantity: i64,
  pub market_price: Decimal,
  pub average_cost_price: Decimal,
  pub break_even_price: Decimal,
  pub realized_profit: Decimal,
  pub unrealized_profit: Decimal,
}

/// Convert the raw holdings feed into validated [`Position`]s.
///
/// Rows with a blank symbol, non-positive quantity or non-positive market
/// price are dropped. The result is sorted by NAV weight, largest first.
/// Empty input or a non-positive net asset value yields an empty list.
pub fn positions_from_deals(
  deals: &[RawDeal],
  net_asset_value: Decimal,
  stock_value: Decimal,
) -> Result<Vec<Position>> {
  let mut positions = Vec::new();

  if deals.is_empty() || net_asset_value <= Decimal::ZERO {
    return Ok(positions);
  }

  let hundred = Decimal::from(100);
  for deal in deals {
    if deal.symbol.is_empty() {
      continue;
    }
    if deal.accumulated_quantity <= 0 || deal.market_price <= Decimal::ZERO {
      continue;
    }

    let market_value = deal.market_price * Decimal::from(deal.accumulated_quantity);
    let weight = Weight::try_new(market_value / net_asset_value * hundred)?;
    let weight_over_sv = if stock_value > Decimal::ZERO {
      Weight::try_new(market_value / stock_value * hundred)?
    } else {
      Weight::zero()
    };

    positions.push(Position {
      symbol: deal.symbol.clone(),
      quantity: deal.accumulated_quantity,
      market_price: Money::vnd(deal.market_price),
      cost_price: Money::vnd(deal.average_cost_price),
      break_even_price: Money::vnd(deal.break_even_price),
      weight,
      weight_over_sv,
      realized_profit: Some(Money::vnd(deal.realized_profit)),
      unrealized_profit: Some(Money::vnd(deal.unrealized_profit)),
    });
  }

  positions.sort_by(|a, b| b.weight.cmp(&a.weight));
  Ok(positions)
}
