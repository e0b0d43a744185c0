//! # Portfolio Engine
//!
//! $$
//! P \rightarrow (\mu, \Sigma) \rightarrow \mathbf{x}^\* \rightarrow
//! \{\mathbf{w}_{\text{raw}}, \mathbf{w}_{\text{mn}},
//! \mathbf{w}_{\text{cap}}, \mathbf{w}_{\text{mn,cap}}\}
//! $$
//!
//! End-to-end orchestration: price panel to the four weight policies, with a
//! per-call solve report instead of shared counters.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::panel::PricePanel;
use crate::panel::RiskModel;
use crate::solver::solve_analytical;
use crate::solver::solve_qp;
use crate::solver::SolveOutcome;
use crate::solver::SolverKind;
use crate::solver::RISK_AVERSION;
use crate::weights::neutralize_weights_exact;
use crate::weights::neutralize_weights_limit;
use crate::weights::normalize_weights_exact;
use crate::weights::normalize_weights_limit;
use crate::weights::DEFAULT_MAX_WEIGHT;

/// Algorithm tag written into flattened weight records.
pub const ALGORITHM: &str = "CEMV";

/// The four weight policies produced per optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightPolicy {
  /// Unconstrained long-only weights.
  LongOnly,
  /// Zero-sum long/short weights.
  MarketNeutral,
  /// Long-only weights with a per-position cap.
  LimitedLongOnly,
  /// Zero-sum weights with a symmetric per-position cap.
  LimitedMarketNeutral,
}

impl WeightPolicy {
  /// Parse a policy name leniently; unknown names map to [`Self::LongOnly`].
  pub fn from_str(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "market-neutral" | "marketneutral" | "neutral" => Self::MarketNeutral,
      "limited" | "limited-long-only" | "capped" => Self::LimitedLongOnly,
      "limited-market-neutral" | "neutral-limited" | "capped-neutral" => {
        Self::LimitedMarketNeutral
      }
      _ => Self::LongOnly,
    }
  }
}

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Debug, Clone)]
pub struct PortfolioEngineConfig {
  /// Risk aversion of the mean-variance objective.
  pub lambda: f64,
  /// Per-position cap used by the limited policies.
  pub max_weight: f64,
  /// EWMA span of the expected-return estimate.
  pub ewma_span: usize,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      lambda: RISK_AVERSION,
      max_weight: DEFAULT_MAX_WEIGHT,
      ewma_span: 21,
    }
  }
}

/// Per-call solve observability, returned instead of mutated global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
  /// Solver that produced the accepted weight vector.
  pub solver: SolverKind,
  /// Failure reason of the quadratic program when the fallback engaged.
  pub qp_failure: Option<String>,
}

/// Model-implied statistics of a weight vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VariantMetrics {
  pub expected_return: f64,
  pub volatility: f64,
  pub sharpe: f64,
}

/// Expected return, volatility and Sharpe of `weights` under `model`.
pub fn variant_metrics(weights: &[f64], model: &RiskModel) -> VariantMetrics {
  let n = weights.len();
  let expected_return: f64 = weights
    .iter()
    .zip(model.mu.iter())
    .map(|(&w, &m)| w * m)
    .sum();

  let mut variance = 0.0;
  for i in 0..n {
    for j in 0..n {
      variance += weights[i] * weights[j] * model.cov[[i, j]];
    }
  }
  let volatility = variance.max(0.0).sqrt();
  let sharpe = if volatility > 1e-15 {
    expected_return / volatility
  } else {
    0.0
  };

  VariantMetrics {
    expected_return,
    volatility,
    sharpe,
  }
}

/// One flattened row per symbol, shaped for a portfolio-weights store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightRecord {
  pub date: NaiveDate,
  pub symbol: String,
  pub initial_weight: f64,
  pub neutralized_weight: f64,
  pub limited_weight: f64,
  pub neutralized_limited_weight: f64,
  pub algorithm: String,
}

/// Output of a single optimization run: the four weight vectors aligned with
/// the panel's symbol ordering, plus the solve report and the model-implied
/// metrics of the long-only vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedWeights {
  pub symbols: Vec<String>,
  pub initial: Vec<f64>,
  pub neutralized: Vec<f64>,
  pub limited: Vec<f64>,
  pub neutralized_limited: Vec<f64>,
  pub report: SolveReport,
  pub metrics: VariantMetrics,
}

impl OptimizedWeights {
  /// The weight vector of a given policy.
  pub fn policy(&self, policy: WeightPolicy) -> &[f64] {
    match policy {
      WeightPolicy::LongOnly => &self.initial,
      WeightPolicy::MarketNeutral => &self.neutralized,
      WeightPolicy::LimitedLongOnly => &self.limited,
      WeightPolicy::LimitedMarketNeutral => &self.neutralized_limited,
    }
  }

  /// Flatten to one record per symbol for persistence by the caller.
  pub fn to_records(&self, date: NaiveDate) -> Vec<WeightRecord> {
    self
      .symbols
      .iter()
      .enumerate()
      .map(|(j, symbol)| WeightRecord {
        date,
        symbol: symbol.clone(),
        initial_weight: self.initial[j],
        neutralized_weight: self.neutralized[j],
        limited_weight: self.limited[j],
        neutralized_limited_weight: self.neutralized_limited[j],
        algorithm: ALGORITHM.to_string(),
      })
      .collect()
  }
}

/// Thread-safe success/fallback aggregation for callers that track solve
/// health across runs.
#[derive(Debug, Default)]
pub struct SolverTally {
  qp: AtomicU64,
  fallback: AtomicU64,
}

impl SolverTally {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&self, kind: SolverKind) {
    match kind {
      SolverKind::Qp => self.qp.fetch_add(1, Ordering::Relaxed),
      SolverKind::Fallback => self.fallback.fetch_add(1, Ordering::Relaxed),
    };
  }

  /// `(qp_count, fallback_count)` observed so far.
  pub fn counts(&self) -> (u64, u64) {
    (
      self.qp.load(Ordering::Relaxed),
      self.fallback.load(Ordering::Relaxed),
    )
  }
}

/// Single entry point from a price panel to the four weight policies.
#[derive(Debug, Clone, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Run the full pipeline: estimate, solve (with fallback), transform.
  ///
  /// Never fails: solver trouble degrades through the analytical fallback
  /// down to equal weights, and the estimates are sanitized, so every output
  /// vector is finite.
  pub fn optimize(&self, panel: &PricePanel) -> OptimizedWeights {
    let model = RiskModel::estimate(panel, self.config.ewma_span);
    let mu = model.mu.to_vec();

    let (raw, solver, qp_failure) = match solve_qp(&mu, &model.cov, self.config.lambda) {
      SolveOutcome::Solved(w) => (w, SolverKind::Qp, None),
      SolveOutcome::Failed(reason) => {
        warn!(%reason, "quadratic program failed, using analytical fallback");
        (
          solve_analytical(&mu, &model.cov, self.config.lambda),
          SolverKind::Fallback,
          Some(reason),
        )
      }
    };

    let initial = normalize_weights_exact(&raw);
    let neutralized = neutralize_weights_exact(&initial);
    let limited = normalize_weights_limit(&initial, self.config.max_weight);
    let neutralized_limited = neutralize_weights_limit(&initial, self.config.max_weight);
    let metrics = variant_metrics(&initial, &model);

    OptimizedWeights {
      symbols: panel.symbols().to_vec(),
      initial,
      neutralized,
      limited,
      neutralized_limited,
      report: SolveReport { solver, qp_failure },
      metrics,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use ndarray::Array2;

  fn test_panel(rows: usize, cols: usize) -> PricePanel {
    let dates: Vec<NaiveDate> = (0..rows)
      .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64))
      .collect();
    let symbols: Vec<String> = (0..cols).map(|j| format!("SYM{j}")).collect();
    // deterministic drifting prices, distinct per column
    let prices = Array2::from_shape_fn((rows, cols), |(i, j)| {
      100.0 + j as f64 * 10.0 + i as f64 * (0.5 + j as f64 * 0.25) + ((i * (j + 3)) % 7) as f64
    });
    PricePanel::new(dates, symbols, prices).unwrap()
  }

  #[test]
  fn optimize_produces_four_finite_policy_vectors() {
    let engine = PortfolioEngine::default();
    let out = engine.optimize(&test_panel(30, 5));

    for policy in [
      WeightPolicy::LongOnly,
      WeightPolicy::MarketNeutral,
      WeightPolicy::LimitedLongOnly,
      WeightPolicy::LimitedMarketNeutral,
    ] {
      let w = out.policy(policy);
      assert_eq!(w.len(), 5);
      assert!(w.iter().all(|x| x.is_finite()), "{policy:?} not finite");
    }

    let initial_sum: f64 = out.initial.iter().sum();
    assert!((initial_sum - 1.0).abs() <= f64::EPSILON * 8.0);

    let neutral_sum: f64 = out.neutralized.iter().sum();
    assert!(neutral_sum.abs() < 1e-9);
    assert!(out.neutralized.iter().all(|&w| (-1.0..=1.0).contains(&w)));

    let limited_sum: f64 = out.limited.iter().sum();
    assert!((limited_sum - 1.0).abs() < 1e-9);
    assert!(out.limited.iter().all(|&w| w <= 0.15 + 1e-9));

    assert!(out
      .neutralized_limited
      .iter()
      .all(|&w| (-0.15 - 1e-9..=0.15 + 1e-9).contains(&w)));

    assert!(out.metrics.expected_return.is_finite());
    assert!(out.metrics.volatility.is_finite());
  }

  #[test]
  fn records_flatten_one_row_per_symbol() {
    let engine = PortfolioEngine::default();
    let out = engine.optimize(&test_panel(25, 3));
    let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

    let records = out.to_records(date);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].symbol, "SYM0");
    assert_eq!(records[0].algorithm, ALGORITHM);
    assert_eq!(records[0].date, date);
    assert_eq!(records[1].initial_weight, out.initial[1]);
  }

  #[test]
  fn policy_parser_is_lenient() {
    assert_eq!(WeightPolicy::from_str("neutral"), WeightPolicy::MarketNeutral);
    assert_eq!(WeightPolicy::from_str("capped"), WeightPolicy::LimitedLongOnly);
    assert_eq!(
      WeightPolicy::from_str("capped-neutral"),
      WeightPolicy::LimitedMarketNeutral
    );
    assert_eq!(WeightPolicy::from_str("anything"), WeightPolicy::LongOnly);
  }

  #[test]
  fn tally_counts_by_solver_kind() {
    let tally = SolverTally::new();
    tally.record(SolverKind::Qp);
    tally.record(SolverKind::Qp);
    tally.record(SolverKind::Fallback);

    assert_eq!(tally.counts(), (2, 1));
  }

  #[test]
  #[tracing_test::traced_test]
  fn empty_universe_falls_back_to_analytical_solver() {
    let dates: Vec<NaiveDate> = (0..2)
      .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i))
      .collect();
    let panel = PricePanel::new(dates, Vec::new(), Array2::zeros((2, 0))).unwrap();

    let out = PortfolioEngine::default().optimize(&panel);
    assert_eq!(out.report.solver, SolverKind::Fallback);
    assert!(out.report.qp_failure.is_some());
    assert!(out.initial.is_empty());
    assert!(logs_contain("analytical fallback"));
  }

  #[test]
  fn weight_records_serialize_for_persistence() -> anyhow::Result<()> {
    let engine = PortfolioEngine::default();
    let out = engine.optimize(&test_panel(25, 2));
    let records = out.to_records(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());

    let json = serde_json::to_string(&records)?;
    assert!(json.contains("\"algorithm\":\"CEMV\""));
    assert!(json.contains("\"symbol\":\"SYM0\""));

    let back: Vec<WeightRecord> = serde_json::from_str(&json)?;
    assert_eq!(back.len(), 2);
    assert_eq!(back[0].initial_weight, out.initial[0]);
    Ok(())
  }

  #[test]
  fn chosen_policy_feeds_the_recommendation_engine() {
    use rust_decimal_macros::dec;

    use crate::rebalance::RecommendationEngine;
    use crate::rebalance::TargetWeight;
    use crate::value::Money;

    let engine = PortfolioEngine::default();
    let out = engine.optimize(&test_panel(30, 4));

    let targets: Vec<TargetWeight> = out
      .symbols
      .iter()
      .zip(out.policy(WeightPolicy::LimitedLongOnly).iter())
      .map(|(symbol, &w)| TargetWeight::try_from_fraction(symbol.clone(), w, dec!(100)).unwrap())
      .collect();

    let recs = RecommendationEngine::default()
      .generate_recommendations(&[], &targets, &Money::vnd(dec!(1000000)), &Money::vnd(dec!(1000000)))
      .unwrap();

    // no current holdings: every target above tolerance becomes a buy
    assert!(recs.iter().all(|r| r.action == crate::rebalance::TradeAction::Buy));
    for rec in &recs {
      assert!(rec.amount.amount > dec!(0));
    }
  }

  #[test]
  fn metrics_of_single_asset_match_model() {
    let panel = test_panel(25, 1);
    let model = RiskModel::estimate(&panel, 21);
    let metrics = variant_metrics(&[1.0], &model);

    assert!((metrics.expected_return - model.mu[0]).abs() < 1e-12);
    assert!((metrics.volatility - model.cov[[0, 0]].max(0.0).sqrt()).abs() < 1e-9);
  }
}
