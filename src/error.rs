//! # Errors
//!
//! $$
//! \text{contract violation} \Rightarrow \text{Err}
//! $$
//!
//! Typed contract errors for the value types and input validation. Solver
//! failures are not errors: they are modeled as [`crate::solver::SolveOutcome`]
//! and always recovered through the analytical fallback.

use thiserror::Error;

/// Contract errors raised by value types and input validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
  /// Arithmetic between two monetary amounts of different currencies.
  #[error("currency mismatch: {0} vs {1}")]
  CurrencyMismatch(String, String),
  /// Weight percentage outside the closed range [0, 100].
  #[error("weight must be between 0 and 100, got {0}")]
  WeightOutOfRange(String),
  /// Scalar factor that cannot be represented as an exact decimal.
  #[error("non-finite factor: {0}")]
  NonFiniteFactor(f64),
  /// Price panel whose axes do not line up or with too few rows.
  #[error("invalid price panel: {0}")]
  PanelShape(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortfolioError>;
