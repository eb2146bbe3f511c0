//! Synthetic process datasets with known structure.
//!
//! Used by `spa synth`, demos and the test suite. Every generator is seeded so
//! the same `(kind, rows, seed)` always yields the same table.

use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SyntheticKind {
    /// `y = 1.5 x1 - 2 x2 + 0.5 x3 + e`.
    Linear,
    /// Linear, with `x2` an almost exact copy of `x1`.
    Collinear,
    /// Strong quadratic dependence on `x1`.
    Quadratic,
    /// First-order linear state-space system driven by one input.
    Dynamic,
    /// Linear, with rows split evenly into five groups.
    Grouped,
}

/// Noise standard deviation shared by the static generators.
pub const NOISE_SD: f64 = 0.5;

pub fn generate(kind: SyntheticKind, rows: usize, seed: u64) -> Result<Dataset, AppError> {
    if rows < 10 {
        return Err(AppError::config("Synthetic datasets need at least 10 rows."));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let unit = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::data(format!("Noise distribution error: {e}")))?;
    let noise = Normal::new(0.0, NOISE_SD)
        .map_err(|e| AppError::data(format!("Noise distribution error: {e}")))?;

    match kind {
        SyntheticKind::Dynamic => dynamic(rows, &mut rng, unit),
        _ => {
            let mut x = DMatrix::<f64>::zeros(rows, 3);
            for v in x.iter_mut() {
                *v = unit.sample(&mut rng);
            }
            if kind == SyntheticKind::Collinear {
                for i in 0..rows {
                    x[(i, 1)] = x[(i, 0)] + 0.01 * unit.sample(&mut rng);
                }
            }
            let y = DVector::from_fn(rows, |i, _| {
                let (a, b, c) = (x[(i, 0)], x[(i, 1)], x[(i, 2)]);
                match kind {
                    SyntheticKind::Quadratic => 2.0 * a * a + 0.5 * b + 0.25 * c,
                    _ => 1.5 * a - 2.0 * b + 0.5 * c,
                }
            });
            let y = y.map(|v| v + noise.sample(&mut rng));
            let names = vec!["x1".to_string(), "x2".to_string(), "x3".to_string()];
            let ds = Dataset::new(x, y, names, "y")?;
            if kind == SyntheticKind::Grouped {
                let per = rows.div_ceil(5);
                let groups = (0..rows).map(|i| (i / per) as i64 + 1).collect();
                return ds.with_groups(groups);
            }
            Ok(ds)
        }
    }
}

// s(t+1) = 0.8 s(t) + 0.5 u(t); y(t) = s(t) + 0.005 u(t)^2 + e(t).
fn dynamic(rows: usize, rng: &mut StdRng, unit: Normal<f64>) -> Result<Dataset, AppError> {
    let measurement = Normal::new(0.0, 0.1)
        .map_err(|e| AppError::data(format!("Noise distribution error: {e}")))?;
    let mut x = DMatrix::<f64>::zeros(rows, 1);
    let mut y = DVector::<f64>::zeros(rows);
    let mut state = 0.0;
    for t in 0..rows {
        let u = unit.sample(rng);
        x[(t, 0)] = u;
        y[t] = state + 0.005 * u * u + measurement.sample(rng);
        state = 0.8 * state + 0.5 * u;
    }
    Dataset::new(x, y, vec!["u".to_string()], "y")
}
