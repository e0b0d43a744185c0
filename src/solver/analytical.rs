//! # Analytical Fallback
//!
//! $$
//! \mathbf{x} = \frac{1}{2\lambda} A (\mu - \nu \mathbf{1}), \qquad
//! \nu = \frac{2\lambda(\mathbf{1}^\top A \mu - 1)}{\mathbf{1}^\top A \mathbf{1}}
//! $$
//!
//! Closed-form Lagrangian solution of the equality-constrained mean-variance
//! program, used whenever the quadratic program fails. The pseudoinverse is
//! SVD-based; degenerate systems degrade to equal weights instead of failing.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array2;

use crate::weights::equal_weights;

/// Threshold below which the regularized system counts as degenerate.
const DEGENERACY_TOLERANCE: f64 = 1e-12;

/// Closed-form solve of `max mu'x - lambda x'Qx, sum(x) = 1`, with negative
/// components clipped afterwards. Total: always returns a usable vector.
pub fn solve_analytical(mu: &[f64], cov: &Array2<f64>, lambda: f64) -> Vec<f64> {
  let n = mu.len();
  if n == 0 {
    return Vec::new();
  }
  if lambda.abs() < DEGENERACY_TOLERANCE {
    return equal_weights(n);
  }

  let data: Vec<f64> = cov.iter().copied().collect();
  let q_reg =
    DMatrix::from_row_slice(n, n, &data) + DMatrix::identity(n, n) * super::MIN_EIGENVALUE;

  let a = match q_reg.pseudo_inverse(1e-12) {
    Ok(a) => a,
    Err(_) => return equal_weights(n),
  };

  let b: f64 = a.sum();
  if b.abs() < DEGENERACY_TOLERANCE {
    return equal_weights(n);
  }

  let mu_v = DVector::from_column_slice(mu);
  let c = &a * &mu_v;
  let c_sum: f64 = c.sum();

  let nu = (2.0 * lambda * (c_sum - 1.0)) / b;
  let ones = DVector::from_element(n, 1.0);
  let x = (&a * (mu_v - ones * nu)) * (1.0 / (2.0 * lambda));

  let mut weights: Vec<f64> = x.iter().map(|&w| w.max(0.0)).collect();
  let sum: f64 = weights.iter().sum();
  if sum > DEGENERACY_TOLERANCE {
    for w in &mut weights {
      *w /= sum;
    }
    weights
  } else {
    equal_weights(n)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use ndarray::arr2;

  #[test]
  fn identity_covariance_favors_largest_expected_return() {
    let mu = vec![0.01, 0.02, 0.03];
    let cov = arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    let w = solve_analytical(&mu, &cov, 0.01);
    let sum: f64 = w.iter().sum();

    assert_eq!(w.len(), 3);
    assert!((sum - 1.0).abs() < 1e-12);
    assert!(w.iter().all(|&x| x >= 0.0));
    assert!(w[2] > w[1] && w[1] > w[0]);
  }

  #[test]
  fn zero_covariance_still_produces_weights() {
    let mu = vec![0.01, 0.02];
    let cov = Array2::zeros((2, 2));

    let w = solve_analytical(&mu, &cov, 0.01);
    let sum: f64 = w.iter().sum();
    assert!((sum - 1.0).abs() < 1e-12);
    assert!(w.iter().all(|&x| x.is_finite() && x >= 0.0));
  }

  #[test]
  fn empty_universe_yields_empty_vector() {
    let cov = Array2::zeros((0, 0));
    assert!(solve_analytical(&[], &cov, 0.01).is_empty());
  }

  #[test]
  fn negative_expected_returns_degrade_to_equal_weights() {
    // every Lagrangian component ends up negative, clipping wipes the vector
    let mu = vec![-5.0, -5.0];
    let cov = arr2(&[[1.0, 0.0], [0.0, 1.0]]);

    let w = solve_analytical(&mu, &cov, 0.01);
    let sum: f64 = w.iter().sum();
    assert!((sum - 1.0).abs() < 1e-12);
  }
}
