//! Correlation matrix and the information-ratio optimizer.
//!
//! `optimize` maximises `(w·r) / sqrt(wᵀ C w)` over the capped simplex
//! `Σw = 1, 0.1/n <= w_i <= 1` by projected gradient descent with a
//! backtracking line search. It never fails past its boundary: any internal
//! problem is logged and the equal-weight vector is returned.

use rbk_timeseries::TimeSeries;
use thiserror::Error;

pub type Matrix = Vec<Vec<f64>>;

/// Below this many series the problem is skipped and weights are equal.
pub const MIN_ASSETS: usize = 3;
pub const MAX_ITERATIONS: usize = 5;
pub const TOLERANCE: f64 = 1e-5;
/// Lower bound per weight is `LOWER_BOUND_FACTOR / n`.
pub const LOWER_BOUND_FACTOR: f64 = 0.1;
pub const UPPER_BOUND: f64 = 1.0;

const MAX_BACKTRACKS: usize = 30;
const PROJECTION_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
enum OptimizerError {
    #[error("expected {expected} returns, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("portfolio variance is degenerate ({0})")]
    DegenerateVariance(f64),

    #[error("objective is not finite")]
    NonFiniteObjective,
}

pub fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// Pairwise correlations over the common (trailing) length of all series.
///
/// Symmetric with a unit diagonal; pairs where either side has zero
/// variance are 0.0.
pub fn correlation_matrix(series: &[TimeSeries]) -> Matrix {
    let n = series.len();
    let len = series.iter().map(|s| s.len()).min().unwrap_or(0);
    let cols: Vec<Vec<f64>> = series
        .iter()
        .map(|s| s.tail(len).values().into_iter().map(|v| if v.is_nan() { 0.0 } else { v }).collect())
        .collect();
    let means: Vec<f64> = cols
        .iter()
        .map(|c| if c.is_empty() { 0.0 } else { c.iter().sum::<f64>() / c.len() as f64 })
        .collect();

    let cov = |i: usize, j: usize| -> f64 {
        if len == 0 {
            return 0.0;
        }
        cols[i]
            .iter()
            .zip(cols[j].iter())
            .map(|(a, b)| (a - means[i]) * (b - means[j]))
            .sum::<f64>()
            / len as f64
    };
    let sd: Vec<f64> = (0..n).map(|i| cov(i, i).sqrt()).collect();

    let mut m = vec![vec![0.0; n]; n];
    for i in 0..n {
        m[i][i] = 1.0;
        for j in (i + 1)..n {
            let c = if sd[i] > 0.0 && sd[j] > 0.0 {
                (cov(i, j) / (sd[i] * sd[j])).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            m[i][j] = c;
            m[j][i] = c;
        }
    }
    m
}

/// Optimal weights for `series` given expected-return proxies
/// `information_ratios`. Fewer than three series: equal weights.
pub fn optimize(series: &[TimeSeries], information_ratios: &[f64]) -> Vec<f64> {
    let n = series.len();
    let fallback = equal_weights(n);
    if n < MIN_ASSETS {
        return fallback;
    }

    let corr = correlation_matrix(series);
    match solve(&corr, information_ratios) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, assets = n, "optimizer failed; using equal weights");
            fallback
        }
    }
}

fn solve(c: &Matrix, r: &[f64]) -> Result<Vec<f64>, OptimizerError> {
    let n = c.len();
    if r.len() != n {
        return Err(OptimizerError::DimensionMismatch {
            expected: n,
            got: r.len(),
        });
    }
    let lo = LOWER_BOUND_FACTOR / n as f64;
    let hi = UPPER_BOUND;

    let mut w = equal_weights(n);
    let mut f = objective(c, r, &w)?;

    for iter in 0..MAX_ITERATIONS {
        let g = gradient(c, r, &w)?;
        let mut step = 1.0;
        let mut next: Option<(Vec<f64>, f64)> = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = w.iter().zip(g.iter()).map(|(wi, gi)| wi - step * gi).collect();
            let candidate = project_capped_simplex(&trial, lo, hi);
            let fc = objective(c, r, &candidate)?;
            if fc < f {
                next = Some((candidate, fc));
                break;
            }
            step *= 0.5;
        }

        let Some((candidate, fc)) = next else {
            tracing::debug!(iter, objective = f, "no descent direction; stopping");
            break;
        };
        let change = (f - fc).abs();
        w = candidate;
        f = fc;
        if change < TOLERANCE {
            break;
        }
    }

    let total: f64 = w.iter().sum();
    Ok(w.into_iter().map(|x| x / total).collect())
}

fn mat_vec(c: &Matrix, w: &[f64]) -> Vec<f64> {
    c.iter()
        .map(|row| row.iter().zip(w.iter()).map(|(a, b)| a * b).sum())
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `-(w·r) / sqrt(wᵀCw)`.
fn objective(c: &Matrix, r: &[f64], w: &[f64]) -> Result<f64, OptimizerError> {
    let var = dot(w, &mat_vec(c, w));
    if !(var > 1e-12) {
        return Err(OptimizerError::DegenerateVariance(var));
    }
    let f = -dot(w, r) / var.sqrt();
    if !f.is_finite() {
        return Err(OptimizerError::NonFiniteObjective);
    }
    Ok(f)
}

/// `∇f = -r/b + a·Cw/b³` with `a = w·r`, `b = sqrt(wᵀCw)`.
fn gradient(c: &Matrix, r: &[f64], w: &[f64]) -> Result<Vec<f64>, OptimizerError> {
    let cw = mat_vec(c, w);
    let var = dot(w, &cw);
    if !(var > 1e-12) {
        return Err(OptimizerError::DegenerateVariance(var));
    }
    let a = dot(w, r);
    let b = var.sqrt();
    let g: Vec<f64> = r
        .iter()
        .zip(cw.iter())
        .map(|(ri, cwi)| -ri / b + a * cwi / (b * b * b))
        .collect();
    if g.iter().any(|x| !x.is_finite()) {
        return Err(OptimizerError::NonFiniteObjective);
    }
    Ok(g)
}

/// Euclidean projection onto `{Σw = 1, lo <= w_i <= hi}` (bisection on the shift).
fn project_capped_simplex(v: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    let clamp_sum = |tau: f64| -> f64 { v.iter().map(|x| (x - tau).clamp(lo, hi)).sum() };

    let max_v = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_v = v.iter().copied().fold(f64::INFINITY, f64::min);
    // sum is non-increasing in tau: a = too small shift (sum >= 1), b = too large.
    let mut a = min_v - hi;
    let mut b = max_v - lo;
    for _ in 0..PROJECTION_STEPS {
        let mid = 0.5 * (a + b);
        if clamp_sum(mid) > 1.0 {
            a = mid;
        } else {
            b = mid;
        }
    }
    let tau = 0.5 * (a + b);
    v.iter().map(|x| (x - tau).clamp(lo, hi)).collect()
}
