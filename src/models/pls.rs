//! Partial least squares (PLS1, NIPALS) and its sparse variant.
//!
//! The sparse variant soft-thresholds each weight vector at
//! `eta · max|w|` before normalizing, so large `eta` keeps few predictors.
//! Both reduce to a linear map `ŷ = b₀ + X β` once fitted.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::domain::{HyperParams, ModelFamily};
use crate::error::AppError;
use crate::fit::grid::{cartesian, floats, ints};
use crate::math::{center_columns, column_means};

use super::linear::predict_rows;
use super::{FitContext, ModelArtifact, ModelFitter};

const SPARSITY_LEVELS: [f64; 5] = [0.9, 0.7, 0.5, 0.3, 0.1];
const TINY: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentModel {
    pub components: usize,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LatentModel {
    pub fn predict(&self, frame: &Frame) -> Vec<f64> {
        predict_rows(&frame.x, self.intercept, &self.coefficients)
    }

    pub fn active(&self) -> usize {
        self.coefficients.iter().filter(|c| c.abs() > TINY).count()
    }
}

/// NIPALS PLS1 with optional weight sparsity (`eta = 0` is plain PLS).
pub fn fit_pls(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    components: usize,
    eta: f64,
) -> Result<LatentModel, AppError> {
    let (n, m) = x.shape();
    if components == 0 || components > m.min(n.saturating_sub(1)) {
        return Err(AppError::fitting(format!(
            "Cannot extract {components} components from a {n}x{m} design."
        )));
    }
    let x_mean = column_means(x);
    let y_mean = y.mean();
    let mut xk = center_columns(x, &x_mean);
    let mut yk = y.add_scalar(-y_mean);

    let mut w_cols = Vec::with_capacity(components);
    let mut p_cols = Vec::with_capacity(components);
    let mut q = Vec::with_capacity(components);

    for _ in 0..components {
        let mut w = xk.transpose() * &yk;
        if eta > 0.0 {
            let cut = eta * w.amax();
            w.apply(|v| *v = v.signum() * (v.abs() - cut).max(0.0));
        }
        let norm = w.norm();
        if norm < TINY {
            break;
        }
        w /= norm;
        let t = &xk * &w;
        let tt = t.norm_squared();
        if tt < TINY {
            break;
        }
        let p = xk.transpose() * &t / tt;
        let qa = yk.dot(&t) / tt;
        xk -= &t * p.transpose();
        yk.axpy(-qa, &t, 1.0);
        w_cols.push(w);
        p_cols.push(p);
        q.push(qa);
    }

    if w_cols.is_empty() {
        return Err(AppError::fitting("PLS found no informative component."));
    }
    let a = w_cols.len();
    let w_mat = DMatrix::from_columns(&w_cols);
    let p_mat = DMatrix::from_columns(&p_cols);
    let inv = (p_mat.transpose() * &w_mat)
        .try_inverse()
        .ok_or_else(|| AppError::fitting("PLS loading matrix is singular."))?;
    let beta = w_mat * inv * DVector::from_vec(q);
    let intercept = y_mean - x_mean.dot(&beta);

    Ok(LatentModel {
        components: a,
        intercept,
        coefficients: beta.iter().copied().collect(),
    })
}

fn component_range(train: &Frame, ctx: &FitContext<'_>) -> Vec<usize> {
    let cap = ctx
        .config
        .pls_max_components
        .min(train.n_features())
        .min(train.n_rows().saturating_sub(1))
        .max(1);
    (1..=cap).collect()
}

pub struct PlsFitter;

impl ModelFitter for PlsFitter {
    fn family(&self) -> ModelFamily {
        ModelFamily::PartialLeastSquares
    }

    fn grid(&self, train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        Ok(cartesian(&[("components", ints(&component_range(train, ctx)))]))
    }

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        _ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let components = params.usize("components")?;
        Ok(ModelArtifact::Latent(fit_pls(&train.x, &train.y, components, 0.0)?))
    }
}

pub struct SparsePlsFitter;

impl ModelFitter for SparsePlsFitter {
    fn family(&self) -> ModelFamily {
        ModelFamily::SparsePartialLeastSquares
    }

    fn grid(&self, train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        Ok(cartesian(&[
            ("components", ints(&component_range(train, ctx))),
            ("eta", floats(&SPARSITY_LEVELS)),
        ]))
    }

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        _ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let components = params.usize("components")?;
        let eta = params.float("eta")?;
        Ok(ModelArtifact::Latent(fit_pls(&train.x, &train.y, components, eta)?))
    }
}
