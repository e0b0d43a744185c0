//! # Solvers
//!
//! $$
//! \max_{\mathbf{x}} \ \mu^\top\mathbf{x} - \lambda\,\mathbf{x}^\top Q\mathbf{x}
//! \quad \text{s.t.} \quad \sum_i x_i = 1,\ \mathbf{x} \ge 0
//! $$
//!
//! The interior-point solve of the mean-variance objective and its
//! closed-form Lagrangian fallback. A failed solve is a value, not an error:
//! the engine always recovers through the fallback, which in turn degrades to
//! equal weights on degenerate systems.

use serde::Deserialize;
use serde::Serialize;

pub mod analytical;
pub mod qp;

pub use analytical::solve_analytical;
pub use qp::make_psd;
pub use qp::solve_qp;

/// Fixed risk-aversion constant of the mean-variance objective.
pub const RISK_AVERSION: f64 = 0.01;

/// Eigenvalue floor applied during PSD repair and regularization.
pub const MIN_EIGENVALUE: f64 = 1e-8;

/// Which solver produced a weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
  /// Interior-point quadratic program.
  Qp,
  /// Analytical pseudoinverse fallback.
  Fallback,
}

/// Outcome of a quadratic-program solve.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
  Solved(Vec<f64>),
  Failed(String),
}

impl SolveOutcome {
  pub fn is_solved(&self) -> bool {
    matches!(self, SolveOutcome::Solved(_))
  }
}
