//! # Quadratic Program
//!
//! $$
//! Q_{\text{psd}} = V \operatorname{diag}(\max(\lambda_i, \epsilon)) V^\top
//! $$
//!
//! PSD repair of the covariance estimate and the Clarabel solve of the
//! simplex-constrained mean-variance program.

use nalgebra::DMatrix;
use ndarray::Array2;
use tracing::debug;

use super::SolveOutcome;

fn to_dmatrix(cov: &Array2<f64>) -> DMatrix<f64> {
  let n = cov.nrows();
  let data: Vec<f64> = cov.iter().copied().collect();
  DMatrix::from_row_slice(n, n, &data)
}

/// Repair a covariance matrix into a positive-semidefinite one by flooring
/// its eigenvalues at `min_eigenvalue`. If the eigendecomposition does not
/// converge, fall back to a diagonal shift of the same magnitude.
pub fn make_psd(cov: &Array2<f64>, min_eigenvalue: f64) -> DMatrix<f64> {
  let n = cov.nrows();
  let m = to_dmatrix(cov);

  match m.clone().try_symmetric_eigen(1e-12, 0) {
    Some(eigen) => {
      let mut values = eigen.eigenvalues;
      for v in values.iter_mut() {
        *v = v.max(min_eigenvalue);
      }
      let vectors = eigen.eigenvectors;
      &vectors * DMatrix::from_diagonal(&values) * vectors.transpose()
    }
    None => m + DMatrix::identity(n, n) * min_eigenvalue,
  }
}

/// Solve `max mu'x - lambda x'Qx` over the long-only simplex.
///
/// The repaired covariance feeds a Clarabel interior-point solve with a zero
/// cone for the unit-sum constraint and a nonnegative cone for the long-only
/// bound. The solution is clipped at zero and renormalized; any infeasible,
/// degenerate or non-converged solve is reported as [`SolveOutcome::Failed`].
pub fn solve_qp(mu: &[f64], cov: &Array2<f64>, lambda: f64) -> SolveOutcome {
  use clarabel::algebra::*;
  use clarabel::solver::*;

  let n = mu.len();
  if n == 0 {
    return SolveOutcome::Failed("empty asset universe".to_string());
  }

  let q_psd = make_psd(cov, super::MIN_EIGENVALUE);

  // P = 2*lambda*Q_psd in CSC format, column by column
  let mut p_data = Vec::new();
  let mut p_indices = Vec::new();
  let mut p_indptr = vec![0];

  for j in 0..n {
    for i in 0..n {
      let val = 2.0 * lambda * q_psd[(i, j)];
      if val.abs() > 1e-10 {
        p_data.push(val);
        p_indices.push(i);
      }
    }
    p_indptr.push(p_data.len());
  }

  let p = CscMatrix::new(n, n, p_indptr, p_indices, p_data);

  // linear term of the minimized objective
  let q: Vec<f64> = mu.iter().map(|&m| -m).collect();

  // constraints: sum(x) = 1 (row 0), -x <= 0 (rows 1..=n)
  let mut a_data = Vec::new();
  let mut a_indices = Vec::new();
  let mut a_indptr = vec![0];

  for j in 0..n {
    a_data.push(1.0);
    a_indices.push(0);

    a_data.push(-1.0);
    a_indices.push(1 + j);

    a_indptr.push(a_data.len());
  }

  let a = CscMatrix::new(1 + n, n, a_indptr, a_indices, a_data);

  let mut b = vec![1.0];
  b.extend(vec![0.0; n]);

  let cones = [ZeroConeT(1), NonnegativeConeT(n)];

  let settings = match DefaultSettingsBuilder::default()
    .max_iter(100)
    .verbose(false)
    .build()
  {
    Ok(settings) => settings,
    Err(e) => return SolveOutcome::Failed(format!("failed to build settings: {e}")),
  };

  let mut solver = match DefaultSolver::new(&p, &q, &a, &b, &cones, settings) {
    Ok(solver) => solver,
    Err(e) => return SolveOutcome::Failed(format!("failed to create solver: {e:?}")),
  };

  solver.solve();

  if !matches!(solver.solution.status, SolverStatus::Solved) {
    return SolveOutcome::Failed(format!("solver status: {:?}", solver.solution.status));
  }

  let mut weights: Vec<f64> = solver.solution.x.iter().map(|&w| w.max(0.0)).collect();
  let sum: f64 = weights.iter().sum();
  if sum <= 1e-12 {
    return SolveOutcome::Failed("solution collapsed to zero".to_string());
  }
  for w in &mut weights {
    *w /= sum;
  }

  debug!(n_assets = n, "quadratic program solved");
  SolveOutcome::Solved(weights)
}

#[cfg(test)]
mod tests {
  use super::*;

  use ndarray::arr2;

  #[test]
  fn make_psd_floors_negative_eigenvalues() {
    // indefinite matrix: eigenvalues 3 and -1
    let cov = arr2(&[[1.0, 2.0], [2.0, 1.0]]);
    let repaired = make_psd(&cov, 1e-8);

    let eigen = repaired.symmetric_eigen();
    for v in eigen.eigenvalues.iter() {
      assert!(*v >= 1e-8 - 1e-12, "eigenvalue {} below floor", v);
    }
  }

  #[test]
  fn make_psd_keeps_psd_input_unchanged() {
    let cov = arr2(&[[2.0, 0.5], [0.5, 1.0]]);
    let repaired = make_psd(&cov, 1e-8);

    for i in 0..2 {
      for j in 0..2 {
        assert!((repaired[(i, j)] - cov[[i, j]]).abs() < 1e-9);
      }
    }
  }

  #[test]
  fn qp_solves_identity_covariance() {
    let mu = vec![0.01, 0.02, 0.03];
    let cov = arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    match solve_qp(&mu, &cov, 0.01) {
      SolveOutcome::Solved(w) => {
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-8);
        assert!(w.iter().all(|&x| x >= 0.0));
        let max_idx = w
          .iter()
          .enumerate()
          .max_by(|a, b| a.1.total_cmp(b.1))
          .map(|(i, _)| i);
        assert_eq!(max_idx, Some(2));
      }
      SolveOutcome::Failed(reason) => panic!("expected a solve, got: {reason}"),
    }
  }

  #[test]
  fn qp_rejects_empty_universe() {
    let cov = Array2::zeros((0, 0));
    assert!(!solve_qp(&[], &cov, 0.01).is_solved());
  }
}
