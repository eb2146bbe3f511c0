//! Regression-based characterization tests.
//!
//! - Nonlinearity: per predictor, cubic vs linear fit. Flagged when the
//!   partial F statistic beats the critical value AND the polynomial terms
//!   remove at least `nonlinearity_difference` of the residual variance.
//! - Collinearity: largest variance-inflation factor above `vif_threshold`.
//! - Dynamic nonlinearity: squares and cubes appended to the lagged design
//!   `[y(t-1..t-L), x(t..t-L)]`, same two-part rule.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::RunConfig;
use crate::error::AppError;
use crate::math::{chi2_quantile, fit_linear, lagged_design};

use super::DatasetCharacterizer;

#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalCharacterizer;

fn sse(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<f64, AppError> {
    let solution = fit_linear(x, y, 0.0)
        .ok_or_else(|| AppError::data("Characterization regression is singular."))?;
    let resid = y - solution.predict(x);
    Ok(resid.norm_squared())
}

/// Outcome of comparing a restricted fit with an extended one.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Extension {
    f_stat: f64,
    removed_share: f64,
}

fn compare(
    base: &DMatrix<f64>,
    extended: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<Option<Extension>, AppError> {
    let n = y.len();
    let added = extended.ncols() - base.ncols();
    if added == 0 || n <= extended.ncols() + 1 {
        return Ok(None);
    }
    let sse_base = sse(base, y)?;
    let sse_ext = sse(extended, y)?.min(sse_base);
    if sse_base <= f64::EPSILON {
        return Ok(None);
    }
    let dof = (n - extended.ncols() - 1) as f64;
    let f_stat = if sse_ext <= f64::EPSILON {
        f64::INFINITY
    } else {
        ((sse_base - sse_ext) / added as f64) / (sse_ext / dof)
    };
    Ok(Some(Extension {
        f_stat,
        removed_share: (sse_base - sse_ext) / sse_base,
    }))
}

fn with_powers(base: &DMatrix<f64>, columns: &[usize]) -> DMatrix<f64> {
    let n = base.nrows();
    let mut out = DMatrix::<f64>::zeros(n, base.ncols() + 2 * columns.len());
    out.columns_mut(0, base.ncols()).copy_from(base);
    for (k, &c) in columns.iter().enumerate() {
        for i in 0..n {
            let v = base[(i, c)];
            out[(i, base.ncols() + 2 * k)] = v * v;
            out[(i, base.ncols() + 2 * k + 1)] = v * v * v;
        }
    }
    out
}

fn is_categorical(cfg: &RunConfig, column: usize) -> bool {
    cfg.categorical.get(column).copied().unwrap_or(false)
}

impl DatasetCharacterizer for StatisticalCharacterizer {
    fn nonlinearity(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        cfg: &RunConfig,
    ) -> Result<bool, AppError> {
        let critical = -cfg.alpha.ln();
        for j in 0..x.ncols() {
            if is_categorical(cfg, j) {
                continue;
            }
            let base = x.columns(j, 1).into_owned();
            let Some(ext) = compare(&base, &with_powers(&base, &[0]), y)? else {
                continue;
            };
            debug!(predictor = j, f = ext.f_stat, share = ext.removed_share, "nonlinearity test");
            if ext.f_stat > critical && ext.removed_share >= cfg.nonlinearity_difference {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn collinearity(&self, x: &DMatrix<f64>, cfg: &RunConfig) -> Result<bool, AppError> {
        let m = x.ncols();
        if m < 2 {
            return Ok(false);
        }
        let mut worst = 0.0_f64;
        for j in 0..m {
            let target = x.column(j).into_owned();
            let others: Vec<usize> = (0..m).filter(|&k| k != j).collect();
            let rest = x.select_columns(&others);
            let mu = target.mean();
            let total: f64 = target.iter().map(|v| (v - mu).powi(2)).sum();
            if total <= f64::EPSILON {
                continue;
            }
            let r2 = 1.0 - sse(&rest, &target)? / total;
            let vif = if r2 >= 1.0 - 1e-12 { f64::INFINITY } else { 1.0 / (1.0 - r2) };
            worst = worst.max(vif);
        }
        debug!(max_vif = worst, "collinearity test");
        Ok(worst > cfg.vif_threshold)
    }

    fn dynamic_nonlinearity(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        cfg: &RunConfig,
    ) -> Result<bool, AppError> {
        let lag = cfg.max_lag();
        let m = x.ncols();
        let (design, target) = lagged_design(x, y.as_slice(), lag);
        let columns: Vec<usize> = (0..design.ncols())
            .filter(|&c| c < lag || !is_categorical(cfg, (c - lag) % m))
            .collect();
        let Some(ext) = compare(&design, &with_powers(&design, &columns), &target)? else {
            return Ok(false);
        };
        let q = 2 * columns.len();
        let critical = chi2_quantile(1.0 - cfg.alpha, q) / q as f64;
        debug!(
            lag,
            f = ext.f_stat,
            critical,
            share = ext.removed_share,
            "dynamic nonlinearity test"
        );
        Ok(ext.f_stat > critical && ext.removed_share >= cfg.nonlinearity_difference)
    }
}
