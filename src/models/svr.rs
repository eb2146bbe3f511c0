//! Epsilon-insensitive support vector regression with an RBF kernel.
//!
//! Solved in the dual by coordinate descent on `β = α - α*`, with the bias
//! absorbed into the kernel (`K + 1`), so each coordinate update is a clipped
//! soft-threshold:
//!
//! ```text
//! minimize ½ βᵀ(K + 1)β - yᵀβ + ε‖β‖₁   subject to  -C ≤ β ≤ C
//! ```

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::domain::{HyperParams, ModelFamily};
use crate::error::AppError;
use crate::fit::grid::{cartesian, floats};

use super::{FitContext, ModelArtifact, ModelFitter};

const MAX_SWEEPS: usize = 300;
const TOL: f64 = 1e-5;
const SUPPORT_EPS: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelModel {
    pub gamma: f64,
    /// Support vectors (standardized rows).
    pub support: Vec<Vec<f64>>,
    pub dual: Vec<f64>,
}

impl KernelModel {
    pub fn predict(&self, frame: &Frame) -> Vec<f64> {
        (0..frame.n_rows())
            .map(|i| {
                let row: Vec<f64> = frame.x.row(i).iter().copied().collect();
                self.support
                    .iter()
                    .zip(&self.dual)
                    .map(|(sv, b)| b * (rbf(sv, &row, self.gamma) + 1.0))
                    .sum()
            })
            .collect()
    }
}

fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * d2).exp()
}

pub fn fit_svr(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    c: f64,
    gamma: f64,
    epsilon: f64,
) -> Result<KernelModel, AppError> {
    let n = x.nrows();
    if n == 0 {
        return Err(AppError::fitting("No rows to fit support vector regression."));
    }
    if !(c > 0.0 && gamma > 0.0 && epsilon >= 0.0) {
        return Err(AppError::config(format!(
            "Invalid SVR settings C={c}, gamma={gamma}, epsilon={epsilon}."
        )));
    }
    let rows: Vec<Vec<f64>> = (0..n).map(|i| x.row(i).iter().copied().collect()).collect();
    let q = DMatrix::from_fn(n, n, |i, j| rbf(&rows[i], &rows[j], gamma) + 1.0);

    let mut beta = DVector::<f64>::zeros(n);
    // Running value of Qβ.
    let mut q_beta = DVector::<f64>::zeros(n);

    for _ in 0..MAX_SWEEPS {
        let mut max_delta = 0.0f64;
        for i in 0..n {
            let qii = q[(i, i)];
            let g = q_beta[i] - y[i];
            let z = beta[i] - g / qii;
            let thresh = epsilon / qii;
            let shrunk = if z > thresh {
                z - thresh
            } else if z < -thresh {
                z + thresh
            } else {
                0.0
            };
            let next = shrunk.clamp(-c, c);
            let delta = next - beta[i];
            if delta != 0.0 {
                q_beta.axpy(delta, &q.column(i), 1.0);
                beta[i] = next;
                max_delta = max_delta.max(delta.abs());
            }
        }
        if max_delta < TOL {
            break;
        }
    }

    if beta.iter().any(|v| !v.is_finite()) {
        return Err(AppError::fitting("SVR dual solution is not finite."));
    }

    let (support, dual): (Vec<Vec<f64>>, Vec<f64>) = rows
        .into_iter()
        .zip(beta.iter().copied())
        .filter(|(_, b)| b.abs() > SUPPORT_EPS)
        .unzip();

    Ok(KernelModel {
        gamma,
        support,
        dual,
    })
}

pub struct SvrFitter;

impl ModelFitter for SvrFitter {
    fn family(&self) -> ModelFamily {
        ModelFamily::SupportVector
    }

    fn grid(&self, _train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        let cfg = ctx.config;
        Ok(cartesian(&[
            ("C", floats(&cfg.svr_c)),
            ("gamma", floats(&cfg.svr_gamma)),
            ("epsilon", floats(&cfg.svr_epsilon)),
        ]))
    }

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        _ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let model = fit_svr(
            &train.x,
            &train.y,
            params.float("C")?,
            params.float("gamma")?,
            params.float("epsilon")?,
        )?;
        Ok(ModelArtifact::Kernel(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_a_smooth_curve() {
        let n = 40;
        let x = DMatrix::from_fn(n, 1, |i, _| -2.0 + 4.0 * i as f64 / (n - 1) as f64);
        let y = DVector::from_fn(n, |i, _| x[(i, 0)].sin());
        let model = fit_svr(&x, &y, 10.0, 1.0, 0.01).unwrap();
        let frame = Frame {
            x: x.clone(),
            x_raw: x,
            y: y.clone(),
            groups: None,
        };
        let pred = model.predict(&frame);
        let err: f64 =
            pred.iter().zip(y.iter()).map(|(p, t)| (p - t).abs()).sum::<f64>() / n as f64;
        assert!(err < 0.05, "mean abs error {err}");
    }

    #[test]
    fn wide_tube_needs_no_support_vectors() {
        let x = DMatrix::from_row_slice(3, 1, &[0.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[0.1, -0.1, 0.05]);
        let model = fit_svr(&x, &y, 1.0, 1.0, 1.0).unwrap();
        assert!(model.support.is_empty());
    }
}
