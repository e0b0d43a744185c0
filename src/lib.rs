//! # rebalance-rs
//!
//! $$
//! \max_{\mathbf{x}} \ \mu^\top\mathbf{x} - \lambda\,\mathbf{x}^\top Q\mathbf{x}
//! \quad \text{s.t.} \quad \sum_i x_i = 1,\ \mathbf{x} \ge 0
//! $$
//!
//! Risk-adjusted portfolio construction and rebalancing engine. From a panel
//! of adjusted close prices it estimates expected returns and covariance,
//! solves the mean-variance program (with a closed-form fallback), and
//! produces four deterministic weight policies: long-only, market-neutral,
//! and their per-position-capped variants. A separate recommendation engine
//! diffs a chosen policy against the current positions into prioritized,
//! exact-cash trade instructions.
//!
//! The engine is a pure, synchronous computation: no I/O, no shared mutable
//! state. Price data, persistence, order execution and credentials live with
//! the callers.

pub mod engine;
pub mod error;
pub mod panel;
pub mod rebalance;
pub mod solver;
pub mod value;
pub mod weights;

pub use engine::variant_metrics;
pub use engine::OptimizedWeights;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use engine::SolveReport;
pub use engine::SolverTally;
pub use engine::VariantMetrics;
pub use engine::WeightPolicy;
pub use engine::WeightRecord;
pub use error::PortfolioError;
pub use panel::PricePanel;
pub use panel::RiskModel;
pub use rebalance::Priority;
pub use rebalance::RecommendationEngine;
pub use rebalance::TargetWeight;
pub use rebalance::TradeAction;
pub use rebalance::TradeRecommendation;
pub use solver::make_psd;
pub use solver::solve_analytical;
pub use solver::solve_qp;
pub use solver::SolveOutcome;
pub use solver::SolverKind;
pub use value::positions_from_deals;
pub use value::AccountBalance;
pub use value::Money;
pub use value::Position;
pub use value::RawDeal;
pub use value::Weight;
pub use weights::equal_weights;
pub use weights::neutralize_weights_exact;
pub use weights::neutralize_weights_limit;
pub use weights::normalize_weights_exact;
pub use weights::normalize_weights_limit;
pub use weights::DEFAULT_MAX_WEIGHT;
