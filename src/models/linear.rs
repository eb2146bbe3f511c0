//! Linear families: plain regression, ridge and elastic net.
//!
//! All three fit on standardized predictors with an unpenalized intercept.
//! Elastic net uses cyclic coordinate descent with the penalty scaled by the
//! row count, so `alpha` means the same thing on folds of different sizes:
//!
//! ```text
//! minimize ½‖y - Xβ‖² + n·α·(ρ‖β‖₁ + ½(1-ρ)‖β‖²)
//! ```

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::domain::{HyperParams, ModelFamily};
use crate::error::AppError;
use crate::fit::grid::{descending_path, log_space};
use crate::math::{LinearSolution, center_columns, column_means, fit_linear};

use super::{FitContext, ModelArtifact, ModelFitter};

const CD_MAX_ITER: usize = 1000;
const CD_TOL: f64 = 1e-6;
/// Smallest penalty on a path, relative to the largest.
const PATH_RATIO: f64 = 1e-3;
const ZERO_COEF: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub names: Vec<String>,
}

impl LinearModel {
    pub fn from_solution(sol: LinearSolution, names: &[String]) -> Self {
        Self {
            intercept: sol.intercept,
            coefficients: sol.coefficients.iter().copied().collect(),
            names: names.to_vec(),
        }
    }

    pub fn predict(&self, frame: &Frame) -> Vec<f64> {
        predict_rows(&frame.x, self.intercept, &self.coefficients)
    }

    pub fn active(&self) -> usize {
        self.coefficients.iter().filter(|c| c.abs() > ZERO_COEF).count()
    }
}

pub(crate) fn predict_rows(x: &DMatrix<f64>, intercept: f64, coefficients: &[f64]) -> Vec<f64> {
    (0..x.nrows())
        .map(|i| {
            intercept
                + coefficients
                    .iter()
                    .enumerate()
                    .map(|(j, c)| c * x[(i, j)])
                    .sum::<f64>()
        })
        .collect()
}

fn soft_threshold(val: f64, threshold: f64) -> f64 {
    if val > threshold {
        val - threshold
    } else if val < -threshold {
        val + threshold
    } else {
        0.0
    }
}

/// Elastic net by coordinate descent; `None` on non-finite output.
pub fn elastic_net(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    alpha: f64,
    l1_ratio: f64,
) -> Option<LinearSolution> {
    let (n_samples, n_features) = x.shape();
    if n_samples == 0 || n_samples != y.len() {
        return None;
    }
    let x_mean = column_means(x);
    let y_mean = y.mean();
    let xc = center_columns(x, &x_mean);
    let yc = y.add_scalar(-y_mean);

    let col_norms: Vec<f64> = xc.column_iter().map(|c| c.norm_squared()).collect();
    let n = n_samples as f64;
    let l1_penalty = alpha * l1_ratio * n;
    let l2_penalty = alpha * (1.0 - l1_ratio) * n;

    let mut w = DVector::<f64>::zeros(n_features);
    let mut r = yc.clone();

    for _ in 0..CD_MAX_ITER {
        let mut max_delta = 0.0f64;
        for j in 0..n_features {
            let denom = col_norms[j] + l2_penalty;
            if denom < 1e-15 {
                w[j] = 0.0;
                continue;
            }
            let rho = xc.column(j).dot(&r) + col_norms[j] * w[j];
            let old = w[j];
            w[j] = soft_threshold(rho, l1_penalty) / denom;
            let delta = old - w[j];
            if delta != 0.0 {
                r.axpy(delta, &xc.column(j), 1.0);
                max_delta = max_delta.max(delta.abs());
            }
        }
        if max_delta < CD_TOL {
            break;
        }
    }

    if w.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let intercept = y_mean - x_mean.dot(&w);
    Some(LinearSolution {
        intercept,
        coefficients: w,
    })
}

/// Smallest `alpha` that zeroes every coefficient.
pub fn alpha_max(x: &DMatrix<f64>, y: &DVector<f64>, l1_ratio: f64) -> f64 {
    let n = x.nrows().max(1) as f64;
    let xc = center_columns(x, &column_means(x));
    let yc = y.add_scalar(-y.mean());
    let max_corr = xc
        .column_iter()
        .map(|c| c.dot(&yc).abs())
        .fold(0.0f64, f64::max);
    max_corr / (n * l1_ratio.max(1e-3))
}

/// `l1_ratio × alpha` points for a design, alphas descending per ratio.
pub fn elastic_net_grid(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    l1_ratios: &[f64],
    alpha_num: usize,
) -> Result<Vec<HyperParams>, AppError> {
    let mut grid = Vec::with_capacity(l1_ratios.len() * alpha_num);
    for &ratio in l1_ratios {
        for alpha in descending_path(alpha_max(x, y, ratio), PATH_RATIO, alpha_num)? {
            grid.push(
                HyperParams::new()
                    .with_float("l1_ratio", ratio)
                    .with_float("alpha", alpha),
            );
        }
    }
    Ok(grid)
}

pub struct OlsFitter;

impl ModelFitter for OlsFitter {
    fn family(&self) -> ModelFamily {
        ModelFamily::Ols
    }

    fn grid(&self, _train: &Frame, _ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        Ok(vec![HyperParams::new()])
    }

    fn fit(
        &self,
        train: &Frame,
        _params: &HyperParams,
        ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let sol = fit_linear(&train.x, &train.y, 0.0)
            .ok_or_else(|| AppError::fitting("Least squares system is singular."))?;
        Ok(ModelArtifact::Linear(LinearModel::from_solution(sol, ctx.feature_names)))
    }
}

pub struct RidgeFitter;

impl ModelFitter for RidgeFitter {
    fn family(&self) -> ModelFamily {
        ModelFamily::Ridge
    }

    fn grid(&self, _train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        let mut alphas = log_space(1e-3, 1e3, ctx.config.alpha_num)?;
        alphas.reverse();
        Ok(alphas
            .into_iter()
            .map(|a| HyperParams::new().with_float("alpha", a))
            .collect())
    }

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let alpha = params.float("alpha")?;
        let sol = fit_linear(&train.x, &train.y, alpha)
            .ok_or_else(|| AppError::fitting(format!("Ridge solve failed for alpha={alpha}.")))?;
        Ok(ModelArtifact::Linear(LinearModel::from_solution(sol, ctx.feature_names)))
    }
}

pub struct ElasticNetFitter;

impl ModelFitter for ElasticNetFitter {
    fn family(&self) -> ModelFamily {
        ModelFamily::ElasticNet
    }

    fn grid(&self, train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        elastic_net_grid(&train.x, &train.y, &ctx.config.l1_ratio, ctx.config.alpha_num)
    }

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let alpha = params.float("alpha")?;
        let l1_ratio = params.float("l1_ratio")?;
        let sol = elastic_net(&train.x, &train.y, alpha, l1_ratio)
            .ok_or_else(|| AppError::fitting("Elastic net did not converge to finite values."))?;
        Ok(ModelArtifact::Linear(LinearModel::from_solution(sol, ctx.feature_names)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (DMatrix<f64>, DVector<f64>) {
        let x = DMatrix::from_row_slice(
            6,
            2,
            &[-1.0, 0.3, -0.5, -0.2, 0.0, 0.9, 0.5, -0.7, 1.0, 0.1, 1.5, -0.4],
        );
        let y = DVector::from_fn(6, |i, _| 2.0 * x[(i, 0)] + 0.1);
        (x, y)
    }

    #[test]
    fn alpha_max_zeroes_every_coefficient() {
        let (x, y) = toy();
        let top = alpha_max(&x, &y, 1.0);
        let sol = elastic_net(&x, &y, top * 1.0001, 1.0).unwrap();
        assert!(sol.coefficients.iter().all(|c| c.abs() < 1e-12));
        assert!((sol.intercept - y.mean()).abs() < 1e-12);
    }

    #[test]
    fn tiny_penalty_matches_least_squares() {
        let (x, y) = toy();
        let sol = elastic_net(&x, &y, 1e-8, 0.5).unwrap();
        assert!((sol.coefficients[0] - 2.0).abs() < 1e-3);
        assert!(sol.coefficients[1].abs() < 1e-3);
    }

    #[test]
    fn lasso_drops_irrelevant_feature() {
        let (x, y) = toy();
        let top = alpha_max(&x, &y, 1.0);
        let sol = elastic_net(&x, &y, top * 0.2, 1.0).unwrap();
        assert!(sol.coefficients[0] > 0.0);
        assert_eq!(sol.coefficients[1], 0.0);
    }

    #[test]
    fn grid_lists_strongest_penalty_first() {
        let (x, y) = toy();
        let grid = elastic_net_grid(&x, &y, &[0.5, 0.9], 4).unwrap();
        assert_eq!(grid.len(), 8);
        let a0 = grid[0].float("alpha").unwrap();
        let a1 = grid[1].float("alpha").unwrap();
        assert!(a0 > a1);
        assert_eq!(grid[4].float("l1_ratio").unwrap(), 0.9);
    }
}
