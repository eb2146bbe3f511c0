//! Column-wise standardization.
//!
//! A scaler is fit once on training rows and then reapplied, unchanged, to
//! every other partition (validation, test, outer-validation). Zero-variance
//! columns keep a unit scale so they transform to zero instead of NaN.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Below this a column is treated as constant.
const MIN_SCALE: f64 = 1e-12;

impl StandardScaler {
    /// Fit per-column mean and (population) standard deviation.
    pub fn fit(x: &DMatrix<f64>) -> Result<Self, AppError> {
        if x.nrows() == 0 {
            return Err(AppError::data("Cannot standardize an empty table."));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AppError::data("Data contains non-finite values."));
        }
        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for col in x.column_iter() {
            let mu = col.sum() / n;
            let var = col.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / n;
            let sd = var.sqrt();
            mean.push(mu);
            scale.push(if sd > MIN_SCALE { sd } else { 1.0 });
        }
        Ok(Self { mean, scale })
    }

    /// Fit a single-column scaler for a response vector.
    pub fn fit_vector(y: &DVector<f64>) -> Result<Self, AppError> {
        Self::fit(&DMatrix::from_column_slice(y.len(), 1, y.as_slice()))
    }

    pub fn n_columns(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = x.clone();
        for (j, mut col) in out.column_iter_mut().enumerate() {
            let (mu, sd) = (self.mean[j], self.scale[j]);
            col.apply(|v| *v = (*v - mu) / sd);
        }
        out
    }

    pub fn inverse_transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = x.clone();
        for (j, mut col) in out.column_iter_mut().enumerate() {
            let (mu, sd) = (self.mean[j], self.scale[j]);
            col.apply(|v| *v = *v * sd + mu);
        }
        out
    }

    /// Transform a response vector with the first column's parameters.
    pub fn transform_vector(&self, y: &DVector<f64>) -> DVector<f64> {
        y.map(|v| (v - self.mean[0]) / self.scale[0])
    }

    pub fn inverse_values(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| v * self.scale[0] + self.mean[0]).collect()
    }
}
