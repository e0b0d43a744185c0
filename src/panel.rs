//! # Price Panel & Risk Estimation
//!
//! $$
//! \mu_j = \overline{\operatorname{EWMA}_{21}(r_j)}, \qquad
//! \Sigma = \operatorname{Cov}(P)
//! $$
//!
//! Adjusted-close price panel (trading dates by symbols) and the expected
//! return / covariance estimate derived from it. Non-finite entries in the
//! estimates are sanitized before they reach the solvers.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;

use crate::error::PortfolioError;
use crate::error::Result;

/// Replacement applied to positive infinities during sanitization.
const POS_INF_CAP: f64 = 1e6;

/// Panel of adjusted close prices, one row per trading date and one column
/// per asset symbol. Weight vectors produced downstream are aligned 1:1 with
/// `symbols`.
#[derive(Debug, Clone)]
pub struct PricePanel {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  prices: Array2<f64>,
}

impl PricePanel {
  /// Build a panel, validating that the axes line up and at least two rows
  /// of history are present.
  pub fn new(dates: Vec<NaiveDate>, symbols: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    if dates.len() != prices.nrows() || symbols.len() != prices.ncols() {
      return Err(PortfolioError::PanelShape(format!(
        "{} dates x {} symbols vs {}x{} price matrix",
        dates.len(),
        symbols.len(),
        prices.nrows(),
        prices.ncols()
      )));
    }
    if prices.nrows() < 2 {
      return Err(PortfolioError::PanelShape(format!(
        "need at least 2 rows of prices, got {}",
        prices.nrows()
      )));
    }

    Ok(Self {
      dates,
      symbols,
      prices,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  pub fn n_assets(&self) -> usize {
    self.symbols.len()
  }
}

/// Expected-return vector and covariance matrix estimated from a panel.
#[derive(Debug, Clone)]
pub struct RiskModel {
  /// Expected return per asset, aligned with the panel's symbol order.
  pub mu: Array1<f64>,
  /// Sample covariance of the raw price columns.
  pub cov: Array2<f64>,
}

impl RiskModel {
  /// Estimate `(mu, cov)` from a price panel.
  ///
  /// Returns are one-lag percentage changes with the leading row filled with
  /// zero; `mu` is the column mean of their span-`span` EWMA (no bias
  /// adjustment); `cov` is the sample covariance of the price levels.
  pub fn estimate(panel: &PricePanel, span: usize) -> Self {
    let returns = pct_change(panel.prices());
    let smoothed = ewma(&returns, span);
    let mu = smoothed
      .mean_axis(Axis(0))
      .unwrap_or_else(|| Array1::zeros(panel.n_assets()));
    let cov = sample_covariance(panel.prices());

    Self {
      mu: sanitize1(mu),
      cov: sanitize2(cov),
    }
  }
}

/// One-lag percentage change per column. The leading row is zero; a zero
/// previous price produces an infinity that survives until sanitization, a
/// 0/0 produces zero.
fn pct_change(prices: &Array2<f64>) -> Array2<f64> {
  let (t, n) = prices.dim();
  let mut returns = Array2::zeros((t, n));

  for j in 0..n {
    for i in 1..t {
      let prev = prices[[i - 1, j]];
      let curr = prices[[i, j]];
      let r = curr / prev - 1.0;
      returns[[i, j]] = if r.is_nan() { 0.0 } else { r };
    }
  }

  returns
}

/// Exponentially weighted moving average with `alpha = 2 / (span + 1)`,
/// seeded at the first observation (no bias adjustment).
fn ewma(series: &Array2<f64>, span: usize) -> Array2<f64> {
  let (t, n) = series.dim();
  let alpha = 2.0 / (span as f64 + 1.0);
  let mut smoothed = Array2::zeros((t, n));

  for j in 0..n {
    let mut level = series[[0, j]];
    smoothed[[0, j]] = level;
    for i in 1..t {
      level = (1.0 - alpha) * level + alpha * series[[i, j]];
      smoothed[[i, j]] = level;
    }
  }

  smoothed
}

/// Sample covariance (ddof 1) of the matrix columns.
fn sample_covariance(prices: &Array2<f64>) -> Array2<f64> {
  let (t, n) = prices.dim();
  let mut cov = Array2::zeros((n, n));
  if t < 2 {
    return cov;
  }

  let means: Vec<f64> = (0..n)
    .map(|j| prices.column(j).sum() / t as f64)
    .collect();

  for i in 0..n {
    for j in i..n {
      let mut acc = 0.0;
      for k in 0..t {
        acc += (prices[[k, i]] - means[i]) * (prices[[k, j]] - means[j]);
      }
      let c = acc / (t - 1) as f64;
      cov[[i, j]] = c;
      cov[[j, i]] = c;
    }
  }

  cov
}

fn sanitize(x: f64) -> f64 {
  if x.is_nan() {
    0.0
  } else if x == f64::INFINITY {
    POS_INF_CAP
  } else if x == f64::NEG_INFINITY {
    -POS_INF_CAP
  } else {
    x
  }
}

fn sanitize1(mut v: Array1<f64>) -> Array1<f64> {
  v.mapv_inplace(sanitize);
  v
}

fn sanitize2(mut m: Array2<f64>) -> Array2<f64> {
  m.mapv_inplace(sanitize);
  m
}
