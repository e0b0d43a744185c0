//! # Weight Transforms
//!
//! $$
//! \sum_i w_i = 1 \ \text{(long-only)}, \qquad \sum_i w_i = 0 \ \text{(neutral)}
//! $$
//!
//! Exact normalization, market-neutral centering and the two capped variants.
//! Each transform guarantees its sum invariant under floating-point drift by
//! absorbing the residual into a single entry.

use tracing::warn;

/// Default single-position weight cap.
pub const DEFAULT_MAX_WEIGHT: f64 = 0.15;

/// Hard ceiling for the capping loops.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for the capping loops.
const CAP_TOLERANCE: f64 = 1e-10;

/// Residual tolerance for the exact transforms.
const EXACT_TOLERANCE: f64 = 1e-15;

/// Uniform 1/n allocation, the degenerate-input fallback everywhere.
pub fn equal_weights(n: usize) -> Vec<f64> {
  if n == 0 {
    return Vec::new();
  }
  vec![1.0 / n as f64; n]
}

fn argmax_by<F: Fn(usize) -> f64>(n: usize, key: F) -> usize {
  let mut best = 0;
  let mut best_val = f64::NEG_INFINITY;
  for i in 0..n {
    let v = key(i);
    if v > best_val {
      best_val = v;
      best = i;
    }
  }
  best
}

/// Long-only normalization with an exact unit sum.
///
/// Negative entries are clipped to zero; the post-division residual `1 - sum`
/// is absorbed into the largest entry. All-zero input degrades to equal
/// weights.
pub fn normalize_weights_exact(weights: &[f64]) -> Vec<f64> {
  let n = weights.len();
  if n == 0 {
    return Vec::new();
  }

  let mut out: Vec<f64> = weights.iter().map(|&w| w.max(0.0)).collect();
  let sum: f64 = out.iter().sum();

  if sum > EXACT_TOLERANCE {
    for w in &mut out {
      *w /= sum;
    }
    let residual = 1.0 - out.iter().sum::<f64>();
    if residual.abs() > EXACT_TOLERANCE {
      let max_idx = argmax_by(n, |i| out[i]);
      out[max_idx] += residual;
    }
    out
  } else {
    equal_weights(n)
  }
}

/// Market-neutral centering with a zero sum and entries in [-1, 1].
///
/// The input is centered at its mean and clipped; the residual is absorbed
/// into the entry with the largest magnitude. If that push breaches a bound
/// the entry is clamped and the overflow is spread equally across the others.
/// The spread is a single second-order correction and may itself graze the
/// bounds on pathological inputs.
pub fn neutralize_weights_exact(weights: &[f64]) -> Vec<f64> {
  let n = weights.len();
  if n == 0 {
    return Vec::new();
  }

  let mean = weights.iter().sum::<f64>() / n as f64;
  let mut out: Vec<f64> = weights.iter().map(|&w| (w - mean).clamp(-1.0, 1.0)).collect();

  let sum: f64 = out.iter().sum();
  if sum.abs() > EXACT_TOLERANCE {
    let max_abs_idx = argmax_by(n, |i| out[i].abs());
    out[max_abs_idx] -= sum;

    if out[max_abs_idx] > 1.0 && n > 1 {
      let excess = out[max_abs_idx] - 1.0;
      out[max_abs_idx] = 1.0;
      spread_excess(&mut out, max_abs_idx, excess);
    } else if out[max_abs_idx] < -1.0 && n > 1 {
      let excess = out[max_abs_idx] + 1.0;
      out[max_abs_idx] = -1.0;
      spread_excess(&mut out, max_abs_idx, excess);
    }
  }

  out
}

fn spread_excess(out: &mut [f64], skip: usize, excess: f64) {
  let share = excess / (out.len() - 1) as f64;
  for (i, w) in out.iter_mut().enumerate() {
    if i != skip {
      *w -= share;
    }
  }
}

/// Long-only cap: unit sum with every entry at most `max_weight`.
///
/// Iteratively caps the over-limit entries and redistributes the excess to
/// the rest in proportion to their remaining headroom. Stops at the
/// iteration ceiling without error; the final residual is absorbed into the
/// entry with the most headroom.
pub fn normalize_weights_limit(weights: &[f64], max_weight: f64) -> Vec<f64> {
  let n = weights.len();
  if n == 0 {
    return Vec::new();
  }

  let mut out: Vec<f64> = weights.iter().map(|&w| w.max(0.0)).collect();
  let mut converged = false;

  for _ in 0..MAX_ITERATIONS {
    let sum: f64 = out.iter().sum();
    if sum.abs() > CAP_TOLERANCE {
      for w in &mut out {
        *w /= sum;
      }
    } else {
      out = equal_weights(n);
      converged = true;
      break;
    }

    let over: Vec<usize> = (0..n).filter(|&i| out[i] > max_weight).collect();
    if over.is_empty() {
      converged = true;
      break;
    }

    let excess: f64 = over.iter().map(|&i| out[i] - max_weight).sum();
    for &i in &over {
      out[i] = max_weight;
    }

    let under: Vec<usize> = (0..n).filter(|i| !over.contains(i)).collect();
    if under.is_empty() {
      break;
    }

    let total_headroom: f64 = under.iter().map(|&i| max_weight - out[i]).sum();
    if total_headroom > CAP_TOLERANCE {
      for &i in &under {
        out[i] += excess * (max_weight - out[i]) / total_headroom;
      }
    } else {
      let share = excess / under.len() as f64;
      for &i in &under {
        out[i] += share;
      }
    }
  }

  if !converged {
    warn!(max_weight, "long-only capping stopped at the iteration ceiling");
  }

  let sum: f64 = out.iter().sum();
  if sum.abs() > CAP_TOLERANCE {
    for w in &mut out {
      *w /= sum;
    }
  } else {
    out = equal_weights(n);
  }

  let residual = 1.0 - out.iter().sum::<f64>();
  if residual.abs() > EXACT_TOLERANCE {
    let idx = argmax_by(n, |i| max_weight - out[i]);
    out[idx] += residual;
  }

  out
}

/// Market-neutral cap: zero sum with every entry inside `±max_weight`.
///
/// Centers the input, then iteratively clips to the band and pushes the sum
/// back to zero through the entries not pinned at a bound, in proportion to
/// their capacity toward the bound that corrects the imbalance. Residual
/// imbalance after the iteration ceiling is accepted.
pub fn neutralize_weights_limit(weights: &[f64], max_weight: f64) -> Vec<f64> {
  let n = weights.len();
  if n == 0 {
    return Vec::new();
  }

  let mean = weights.iter().sum::<f64>() / n as f64;
  let mut out: Vec<f64> = weights.iter().map(|&w| w - mean).collect();

  for _ in 0..MAX_ITERATIONS {
    for w in &mut out {
      *w = w.clamp(-max_weight, max_weight);
    }

    let sum: f64 = out.iter().sum();
    if sum.abs() <= CAP_TOLERANCE {
      break;
    }

    let adjustable: Vec<usize> = (0..n)
      .filter(|&i| {
        (out[i] - max_weight).abs() > CAP_TOLERANCE && (out[i] + max_weight).abs() > CAP_TOLERANCE
      })
      .collect();
    if adjustable.is_empty() {
      // perfect neutrality unattainable
      break;
    }

    // capacity toward the bound that corrects the sign of the imbalance
    let capacity: Vec<f64> = adjustable
      .iter()
      .map(|&i| {
        if sum > 0.0 {
          (out[i] + max_weight).max(0.0)
        } else {
          (max_weight - out[i]).max(0.0)
        }
      })
      .collect();

    let total_capacity: f64 = capacity.iter().sum();
    if total_capacity > CAP_TOLERANCE {
      let scale = (sum.abs() / total_capacity).min(1.0);
      for (k, &i) in adjustable.iter().enumerate() {
        out[i] -= sum.signum() * capacity[k] * scale;
      }
    } else {
      let share = sum / adjustable.len() as f64;
      for &i in &adjustable {
        out[i] -= share;
      }
    }
  }

  for w in &mut out {
    *w = w.clamp(-max_weight, max_weight);
  }

  let sum: f64 = out.iter().sum();
  if sum.abs() > CAP_TOLERANCE {
    warn!(
      residual = sum,
      max_weight, "market-neutral capping left a residual imbalance"
    );
    let idx = argmax_by(n, |i| {
      if sum > 0.0 {
        out[i] + max_weight
      } else {
        max_weight - out[i]
      }
    });
    out[idx] = (out[idx] - sum).clamp(-max_weight, max_weight);
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_sums_to(weights: &[f64], target: f64, tol: f64) {
    let sum: f64 = weights.iter().sum();
    assert!(
      (sum - target).abs() <= tol,
      "sum {} not within {} of {}",
      sum,
      tol,
      target
    );
  }

  #[test]
  fn normalize_exact_sums_to_one() {
    let out = normalize_weights_exact(&[0.3, -0.1, 0.9, 0.05]);
    assert_sums_to(&out, 1.0, f64::EPSILON);
    assert!(out.iter().all(|&w| w >= 0.0));
  }

  #[test]
  fn normalize_exact_degrades_to_equal_weights() {
    let out = normalize_weights_exact(&[-0.2, -0.5, 0.0]);
    assert_eq!(out, vec![1.0 / 3.0; 3]);
  }

  #[test]
  fn neutralize_exact_sums_to_zero_within_bounds() {
    let inputs: Vec<Vec<f64>> = vec![
      vec![0.4, 0.3, 0.2, 0.1],
      vec![1.0, 0.0, 0.0],
      vec![0.9, 0.05, 0.03, 0.02],
      vec![0.5, 0.5],
    ];

    for input in inputs {
      let out = neutralize_weights_exact(&input);
      assert_sums_to(&out, 0.0, 1e-9);
      assert!(out.iter().all(|&w| (-1.0..=1.0).contains(&w)));
    }
  }

  #[test]
  fn normalize_limit_respects_cap_and_unit_sum() {
    let out = normalize_weights_limit(&[0.9, 0.05, 0.03, 0.01, 0.005, 0.005, 0.0, 0.0], 0.15);
    assert_sums_to(&out, 1.0, 1e-9);
    assert!(out.iter().all(|&w| w <= 0.15 + 1e-9));
    assert!(out.iter().all(|&w| w >= -1e-12));
  }

  #[test]
  fn normalize_limit_is_idempotent_on_compliant_input() {
    let compliant = vec![0.15, 0.15, 0.15, 0.15, 0.15, 0.15, 0.1];
    let out = normalize_weights_limit(&compliant, 0.15);
    for (a, b) in compliant.iter().zip(out.iter()) {
      assert!((a - b).abs() < 1e-9);
    }
  }

  #[test]
  fn normalize_limit_handles_all_zero_input() {
    let out = normalize_weights_limit(&[0.0; 5], 0.15);
    assert_eq!(out, equal_weights(5));
  }

  #[test]
  fn neutralize_limit_respects_band_and_zero_sum() {
    let out = neutralize_weights_limit(&[0.8, 0.1, 0.05, 0.03, 0.01, 0.01], 0.15);
    assert!(out.iter().all(|&w| (-0.15 - 1e-9..=0.15 + 1e-9).contains(&w)));
    assert_sums_to(&out, 0.0, 1e-6);
  }

  #[test]
  fn neutralize_limit_is_stable_on_centered_input() {
    let centered = vec![0.1, -0.1, 0.05, -0.05];
    let out = neutralize_weights_limit(&centered, 0.15);
    for (a, b) in centered.iter().zip(out.iter()) {
      assert!((a - b).abs() < 1e-9);
    }
  }

  #[test]
  fn neutralize_limit_accepts_unattainable_neutrality() {
    // two assets, both pinned: the residual stays but the band holds
    let out = neutralize_weights_limit(&[10.0, 0.0], 0.15);
    assert!(out.iter().all(|&w| (-0.15 - 1e-9..=0.15 + 1e-9).contains(&w)));
  }

  #[test]
  fn empty_inputs_yield_empty_outputs() {
    assert!(normalize_weights_exact(&[]).is_empty());
    assert!(neutralize_weights_exact(&[]).is_empty());
    assert!(normalize_weights_limit(&[], 0.15).is_empty());
    assert!(neutralize_weights_limit(&[], 0.15).is_empty());
  }
}
