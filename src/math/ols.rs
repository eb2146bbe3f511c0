//! Least squares solvers.
//!
//! Most families in this crate reduce to small linear problems of the form:
//!
//! ```text
//! minimize ||y - X β||² + λ ||β||²
//! ```
//!
//! Implementation choices:
//! - Plain least squares goes through SVD so tall, rank-deficient designs
//!   still produce the minimum-norm solution.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Ridge goes through the regularized normal equations and a Cholesky
//!   factorization, falling back to SVD when the factorization fails.
//! - Intercepts are handled by centering, never by a column of ones, so that
//!   penalties never shrink the intercept.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances: collinear process data routinely
    // produces near-singular designs.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve `(XᵀX + λI) β = Xᵀy`.
pub fn solve_ridge(x: &DMatrix<f64>, y: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let p = x.ncols();
    let xt = x.transpose();
    let mut gram = &xt * x;
    for j in 0..p {
        gram[(j, j)] += lambda.max(0.0);
    }
    let rhs = &xt * y;

    if let Some(chol) = gram.clone().cholesky() {
        let beta = chol.solve(&rhs);
        if beta.iter().all(|v| v.is_finite()) {
            return Some(beta);
        }
    }
    solve_least_squares(&gram, &rhs)
}

/// Column means of `x`.
pub fn column_means(x: &DMatrix<f64>) -> DVector<f64> {
    let n = x.nrows().max(1) as f64;
    DVector::from_iterator(x.ncols(), x.column_iter().map(|c| c.sum() / n))
}

/// Subtract `means` from every row of `x`.
pub fn center_columns(x: &DMatrix<f64>, means: &DVector<f64>) -> DMatrix<f64> {
    let mut out = x.clone();
    for (j, mut col) in out.column_iter_mut().enumerate() {
        col.add_scalar_mut(-means[j]);
    }
    out
}

/// Linear coefficients plus intercept, fitted on centered data.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolution {
    pub intercept: f64,
    pub coefficients: DVector<f64>,
}

impl LinearSolution {
    pub fn predict(&self, x: &DMatrix<f64>) -> DVector<f64> {
        let mut out = x * &self.coefficients;
        out.add_scalar_mut(self.intercept);
        out
    }
}

/// Least squares (`lambda == 0`) or ridge with an unpenalized intercept.
pub fn fit_linear(x: &DMatrix<f64>, y: &DVector<f64>, lambda: f64) -> Option<LinearSolution> {
    if x.nrows() == 0 || x.nrows() != y.len() {
        return None;
    }
    let x_mean = column_means(x);
    let y_mean = y.mean();
    let xc = center_columns(x, &x_mean);
    let yc = y.add_scalar(-y_mean);

    let coefficients = if lambda > 0.0 {
        solve_ridge(&xc, &yc, lambda)?
    } else {
        solve_least_squares(&xc, &yc)?
    };
    let intercept = y_mean - x_mean.dot(&coefficients);
    Some(LinearSolution {
        intercept,
        coefficients,
    })
}

/// Mean squared error between two equally long vectors.
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum::<f64>()
        / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn fit_linear_recovers_intercept() {
        let x = DMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 3.0, 5.0, 7.0]);
        let sol = fit_linear(&x, &y, 0.0).unwrap();
        assert!((sol.intercept - 1.0).abs() < 1e-10);
        assert!((sol.coefficients[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn ridge_shrinks_toward_zero() {
        let x = DMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 3.0, 5.0, 7.0]);
        let ols = fit_linear(&x, &y, 0.0).unwrap();
        let ridge = fit_linear(&x, &y, 10.0).unwrap();
        assert!(ridge.coefficients[0].abs() < ols.coefficients[0].abs());
    }

    #[test]
    fn duplicated_columns_still_solve() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let y = DVector::from_row_slice(&[2.0, 4.0, 6.0]);
        let sol = fit_linear(&x, &y, 0.0).unwrap();
        let pred = sol.predict(&x);
        assert!(mse(y.as_slice(), pred.as_slice()) < 1e-12);
    }
}
