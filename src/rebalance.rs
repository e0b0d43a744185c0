//! # Rebalancing
//!
//! $$
//! \Delta_i = w^{\text{target}}_i - w^{\text{current}}_i
//! $$
//!
//! Diffs a target weight policy against the current positions and turns the
//! deviations into prioritized, exact-cash trade recommendations.

use std::collections::BTreeSet;
use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::value::AccountBalance;
use crate::value::Money;
use crate::value::Position;
use crate::value::Weight;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
  Buy,
  Sell,
}

/// Urgency bucket derived from the weight deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
  High,
  Medium,
  Low,
}

/// One symbol of the chosen target policy, in percentage points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWeight {
  pub symbol: String,
  /// Target weight as a percentage of net asset value.
  pub weight: Decimal,
  /// Per-share market price used to size buy orders.
  pub market_price: Decimal,
}

impl TargetWeight {
  /// Build a target record from a raw policy weight in [0, 1].
  pub fn try_from_fraction(symbol: impl Into<String>, fraction: f64, price: Decimal) -> Result<Self> {
    let weight = Decimal::from_f64_retain(fraction * 100.0)
      .ok_or(PortfolioError::NonFiniteFactor(fraction))?;
    Ok(Self {
      symbol: symbol.into(),
      weight,
      market_price: price,
    })
  }
}

/// Concrete trade instruction produced once per optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecommendation {
  pub symbol: String,
  pub action: TradeAction,
  pub current_weight: Weight,
  pub target_weight: Weight,
  /// Cash delta of the trade.
  pub amount: Money,
  pub priority: Priority,
  pub reason: String,
  pub action_price: Option<Money>,
  pub action_quantity: Option<i64>,
}

/// Diffs target weights against current positions into ordered trades.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
  /// Deviations below this many percentage points are ignored.
  weight_tolerance: Decimal,
}

impl Default for RecommendationEngine {
  fn default() -> Self {
    Self {
      weight_tolerance: Decimal::ONE,
    }
  }
}

impl RecommendationEngine {
  pub fn new(weight_tolerance: Decimal) -> Self {
    Self { weight_tolerance }
  }

  /// Convenience over [`Self::generate_recommendations`] taking the account
  /// balance snapshot as it arrives from the holdings feed.
  pub fn generate_for_account(
    &self,
    positions: &[Position],
    targets: &[TargetWeight],
    balance: &AccountBalance,
  ) -> Result<Vec<TradeRecommendation>> {
    self.generate_recommendations(
      positions,
      targets,
      &balance.available_cash,
      &balance.net_asset_value,
    )
  }

  /// Generate prioritized trade recommendations for the union of symbols in
  /// the current positions and the target policy.
  ///
  /// A non-positive net asset value yields an empty list. High-priority,
  /// large-deviation trades come first.
  pub fn generate_recommendations(
    &self,
    positions: &[Position],
    targets: &[TargetWeight],
    available_cash: &Money,
    net_asset_value: &Money,
  ) -> Result<Vec<TradeRecommendation>> {
    let mut recommendations = Vec::new();

    if net_asset_value.amount <= Decimal::ZERO {
      return Ok(recommendations);
    }
    available_cash.check_currency(net_asset_value)?;

    let current_by_symbol: HashMap<&str, &Position> =
      positions.iter().map(|p| (p.symbol.as_str(), p)).collect();
    let target_by_symbol: HashMap<&str, &TargetWeight> =
      targets.iter().map(|t| (t.symbol.as_str(), t)).collect();

    let all_symbols: BTreeSet<&str> = current_by_symbol
      .keys()
      .chain(target_by_symbol.keys())
      .copied()
      .collect();

    let hundred = Decimal::from(100);
    for symbol in all_symbols {
      let position = current_by_symbol.get(symbol).copied();
      let target = target_by_symbol.get(symbol).copied();

      let current_weight = position.map(|p| p.weight.percentage()).unwrap_or(Decimal::ZERO);
      let target_weight = target.map(|t| t.weight).unwrap_or(Decimal::ZERO);
      let weight_diff = target_weight - current_weight;

      if weight_diff.abs() < self.weight_tolerance {
        continue;
      }

      let priority = calculate_priority(weight_diff.abs());
      let current_value = position
        .map(|p| p.market_value().amount)
        .unwrap_or(Decimal::ZERO);
      let target_value = target_weight / hundred * net_asset_value.amount;

      if weight_diff > self.weight_tolerance {
        let cash_needed = target_value - current_value;
        if cash_needed <= Decimal::ZERO {
          continue;
        }

        let price = target.map(|t| t.market_price).unwrap_or(Decimal::ZERO);
        let action_quantity = if price > Decimal::ZERO {
          (cash_needed / price).floor().to_i64()
        } else {
          None
        };

        recommendations.push(TradeRecommendation {
          symbol: symbol.to_string(),
          action: TradeAction::Buy,
          current_weight: Weight::try_new(current_weight)?,
          target_weight: Weight::try_new(target_weight)?,
          amount: Money::new(cash_needed, net_asset_value.currency.clone()),
          priority,
          reason: format!(
            "Increase weight from {current_weight:.1}% to {target_weight:.1}%"
          ),
          action_price: Some(Money::new(price, net_asset_value.currency.clone())),
          action_quantity,
        });
      } else if weight_diff < -self.weight_tolerance {
        let cash_to_raise = current_value - target_value;

        // sized against the per-share price, not the position's total value
        let price = position.map(|p| p.market_price.amount).unwrap_or(Decimal::ZERO);
        let action_quantity = if price > Decimal::ZERO {
          (cash_to_raise / price).floor().to_i64()
        } else {
          None
        };

        recommendations.push(TradeRecommendation {
          symbol: symbol.to_string(),
          action: TradeAction::Sell,
          current_weight: Weight::try_new(current_weight)?,
          target_weight: Weight::try_new(target_weight)?,
          amount: Money::new(cash_to_raise, net_asset_value.currency.clone()),
          priority,
          reason: format!(
            "Reduce weight from {current_weight:.1}% to {target_weight:.1}%"
          ),
          action_price: position.map(|p| p.market_price.clone()),
          action_quantity,
        });
      }
    }

    recommendations.sort_by(|a, b| {
      let key = |r: &TradeRecommendation| {
        (
          r.priority == Priority::High,
          (r.target_weight.percentage() - r.current_weight.percentage()).abs(),
        )
      };
      key(b).cmp(&key(a))
    });

    Ok(recommendations)
  }
}

fn calculate_priority(weight_diff: Decimal) -> Priority {
  if weight_diff > Decimal::from(3) {
    Priority::High
  } else if weight_diff > Decimal::new(15, 1) {
    Priority::Medium
  } else {
    Priority::Low
  }
}
