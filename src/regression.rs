//! Ordinary least squares with explicit failure on degenerate designs.
//!
//! The normal equations are scaled to unit diagonal before factoring, so the
//! conditioning check is relative and independent of column units.

use nalgebra::linalg::{Cholesky, SymmetricEigen};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Include an intercept column in the design.
    pub fit_intercept: bool,
    /// Smallest eigenvalue of the scaled normal matrix, relative to the largest,
    /// below which the design counts as singular.
    pub rcond: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            rcond: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("regression needs at least one predictor")]
    NoPredictors,
    #[error("predictor {index} has {actual} rows, response has {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{rows} rows cannot identify {params} parameters")]
    Underdetermined { rows: usize, params: usize },
    #[error("design contains non-finite values")]
    NonFinite,
    #[error("design is singular (relative eigenvalue {relative_eigenvalue:e})")]
    Singular { relative_eigenvalue: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// One coefficient per predictor, in input order.
    pub coefficients: Vec<f64>,
    pub intercept: Option<f64>,
}

/// Fit `response ~ predictors` by least squares.
pub fn ols(response: &[f64], predictors: &[&[f64]], cfg: &FitConfig) -> Result<OlsFit, FitError> {
    if predictors.is_empty() {
        return Err(FitError::NoPredictors);
    }
    let n = response.len();
    for (index, col) in predictors.iter().enumerate() {
        if col.len() != n {
            return Err(FitError::LengthMismatch {
                index,
                expected: n,
                actual: col.len(),
            });
        }
    }

    let offset = usize::from(cfg.fit_intercept);
    let p = predictors.len() + offset;
    if n <= p {
        return Err(FitError::Underdetermined { rows: n, params: p });
    }
    if response.iter().any(|v| !v.is_finite())
        || predictors.iter().any(|c| c.iter().any(|v| !v.is_finite()))
    {
        return Err(FitError::NonFinite);
    }

    let column = |j: usize, row: usize| -> f64 {
        if j < offset {
            1.0
        } else {
            predictors[j - offset][row]
        }
    };

    // X^T X and X^T y, accumulated directly from the columns.
    let mut gram = DMatrix::<f64>::zeros(p, p);
    let mut rhs = DVector::<f64>::zeros(p);
    for row in 0..n {
        let y = response[row];
        for a in 0..p {
            let xa = column(a, row);
            rhs[a] += xa * y;
            for b in a..p {
                gram[(a, b)] += xa * column(b, row);
            }
        }
    }
    for a in 0..p {
        for b in 0..a {
            gram[(a, b)] = gram[(b, a)];
        }
    }
    if gram.iter().any(|v| !v.is_finite()) || rhs.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let mut scale = DVector::<f64>::zeros(p);
    for d in 0..p {
        let diag = gram[(d, d)];
        if diag <= 0.0 {
            return Err(FitError::Singular {
                relative_eigenvalue: 0.0,
            });
        }
        scale[d] = 1.0 / diag.sqrt();
    }
    let scaled = DMatrix::from_fn(p, p, |a, b| gram[(a, b)] * scale[a] * scale[b]);
    let scaled_rhs = rhs.component_mul(&scale);

    let eig = SymmetricEigen::new(scaled.clone());
    let max_eig = eig.eigenvalues.max();
    let min_eig = eig.eigenvalues.min();
    let relative = if max_eig > 0.0 { min_eig / max_eig } else { 0.0 };
    if relative.is_nan() || relative <= cfg.rcond {
        return Err(FitError::Singular {
            relative_eigenvalue: relative,
        });
    }

    let chol = Cholesky::new(scaled).ok_or(FitError::Singular {
        relative_eigenvalue: relative,
    })?;
    let beta = chol.solve(&scaled_rhs).component_mul(&scale);
    if beta.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    Ok(OlsFit {
        coefficients: beta.iter().skip(offset).copied().collect(),
        intercept: cfg.fit_intercept.then(|| beta[0]),
    })
}
