//! Sparse nonlinear regression over an expanded feature library.
//!
//! Static variant: raw predictors are expanded with [`FeatureSpec`], the
//! expanded columns are standardized, screened by univariate significance
//! (`p < select_value`, keeping at least the strongest column) and then
//! fit with elastic net.
//!
//! Dynamic variants do the same on the lagged design
//! `[y(t-1..t-L), x(t..t-L)]`. Lagged outputs stay linear unless the
//! full-nonlinear variant is requested.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::domain::{HyperParams, ModelFamily};
use crate::error::AppError;
use crate::math::{
    FeatureSpec, StandardScaler, correlation, lagged_design, lagged_names, two_sided_p,
};

use super::linear::{elastic_net, elastic_net_grid, predict_rows};
use super::{FitContext, ModelArtifact, ModelFitter};

const ZERO_COEF: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseModel {
    /// 0 for the static family.
    pub lag: usize,
    pub spec: FeatureSpec,
    pub scaler: StandardScaler,
    /// Indices into `spec` kept by screening.
    pub selected: Vec<usize>,
    pub intercept: f64,
    /// One coefficient per entry of `selected`.
    pub coefficients: Vec<f64>,
}

impl SparseModel {
    pub fn predict(&self, frame: &Frame) -> Vec<f64> {
        let base = base_design(frame, self.lag).0;
        let expanded = self.scaler.transform(&self.spec.apply(&base));
        let z = expanded.select_columns(&self.selected);
        predict_rows(&z, self.intercept, &self.coefficients)
    }

    pub fn active(&self) -> usize {
        self.coefficients.iter().filter(|c| c.abs() > ZERO_COEF).count()
    }

    /// Names and coefficients of the features that survived selection.
    pub fn retained(&self) -> (Vec<String>, Vec<f64>) {
        self.selected
            .iter()
            .zip(&self.coefficients)
            .filter(|(_, c)| c.abs() > ZERO_COEF)
            .map(|(&k, &c)| (self.spec.names[k].clone(), c))
            .unzip()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseVariant {
    Static,
    Dynamic,
    DynamicFull,
}

pub struct SparseNonlinearFitter {
    variant: SparseVariant,
}

impl SparseNonlinearFitter {
    pub fn new(variant: SparseVariant) -> Self {
        Self { variant }
    }

    fn lags(&self, ctx: &FitContext<'_>) -> Vec<usize> {
        if self.variant == SparseVariant::Static {
            return vec![0];
        }
        let mut lags: Vec<usize> = ctx.config.lag.iter().map(|l| (*l).max(1)).collect();
        lags.sort_unstable();
        lags.dedup();
        lags
    }

    /// Expanded, standardized, screened design for one `(lag, degree)` pair.
    fn prepare(
        &self,
        frame: &Frame,
        lag: usize,
        degree: usize,
        ctx: &FitContext<'_>,
    ) -> Result<Prepared, AppError> {
        let (base, target) = base_design(frame, lag);
        if base.nrows() < 3 {
            return Err(AppError::data(format!(
                "Too few rows ({}) for a lag-{lag} sparse nonlinear fit.",
                base.nrows()
            )));
        }
        let names = if lag == 0 {
            ctx.feature_names.to_vec()
        } else {
            lagged_names(ctx.feature_names, ctx.response_name, lag)
        };
        let flags = self.linear_only_flags(lag, ctx);
        let spec = FeatureSpec::build(&base, &names, degree, ctx.config.trans_type, &flags);
        let expanded = spec.apply(&base);
        let scaler = StandardScaler::fit(&expanded)?;
        let z = scaler.transform(&expanded);
        let selected = screen(&z, &target, ctx.config.select_value);
        Ok(Prepared {
            spec,
            scaler,
            z: z.select_columns(&selected),
            selected,
            target,
        })
    }

    /// Columns excluded from nonlinear terms: categorical predictors and,
    /// unless fully nonlinear, lagged outputs.
    fn linear_only_flags(&self, lag: usize, ctx: &FitContext<'_>) -> Vec<bool> {
        let categorical = &ctx.config.categorical;
        let m = ctx.feature_names.len();
        let x_flags = (0..m).map(|j| categorical.get(j).copied().unwrap_or(false));
        if lag == 0 {
            return x_flags.collect();
        }
        let y_linear = self.variant != SparseVariant::DynamicFull;
        let mut flags = vec![y_linear; lag];
        for _ in 0..=lag {
            flags.extend((0..m).map(|j| categorical.get(j).copied().unwrap_or(false)));
        }
        flags
    }
}

struct Prepared {
    spec: FeatureSpec,
    scaler: StandardScaler,
    selected: Vec<usize>,
    z: DMatrix<f64>,
    target: DVector<f64>,
}

fn base_design(frame: &Frame, lag: usize) -> (DMatrix<f64>, DVector<f64>) {
    if lag == 0 {
        (frame.x_raw.clone(), frame.y.clone())
    } else {
        lagged_design(&frame.x_raw, frame.y.as_slice(), lag)
    }
}

/// Keep columns whose correlation with the target is significant at `level`.
fn screen(z: &DMatrix<f64>, target: &DVector<f64>, level: f64) -> Vec<usize> {
    let n = z.nrows() as f64;
    let t: Vec<f64> = target.iter().copied().collect();
    let mut best = (0usize, -1.0f64);
    let mut kept = Vec::new();
    for (j, col) in z.column_iter().enumerate() {
        let c: Vec<f64> = col.iter().copied().collect();
        let r = correlation(&c, &t);
        if r.abs() > best.1 {
            best = (j, r.abs());
        }
        let denom = (1.0 - r * r).max(1e-12);
        let stat = r * ((n - 2.0).max(1.0) / denom).sqrt();
        if two_sided_p(stat) < level {
            kept.push(j);
        }
    }
    if kept.is_empty() {
        kept.push(best.0);
    }
    kept
}

impl ModelFitter for SparseNonlinearFitter {
    fn family(&self) -> ModelFamily {
        match self.variant {
            SparseVariant::Static => ModelFamily::SparseNonlinearStatic,
            SparseVariant::Dynamic => ModelFamily::SparseNonlinearDynamic,
            SparseVariant::DynamicFull => ModelFamily::SparseNonlinearDynamicFull,
        }
    }

    fn grid(&self, train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        let mut grid = Vec::new();
        for lag in self.lags(ctx) {
            for &degree in &ctx.config.degree {
                let prepared = self.prepare(train, lag, degree, ctx)?;
                for point in elastic_net_grid(
                    &prepared.z,
                    &prepared.target,
                    &ctx.config.l1_ratio,
                    ctx.config.alpha_num,
                )? {
                    let point = point.with_int("degree", degree as i64);
                    grid.push(if self.variant == SparseVariant::Static {
                        point
                    } else {
                        point.with_int("lag", lag as i64)
                    });
                }
            }
        }
        Ok(grid)
    }

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let lag = match self.variant {
            SparseVariant::Static => 0,
            _ => params.usize("lag")?,
        };
        let degree = params.usize("degree")?;
        let alpha = params.float("alpha")?;
        let l1_ratio = params.float("l1_ratio")?;

        let prepared = self.prepare(train, lag, degree, ctx)?;
        let sol = elastic_net(&prepared.z, &prepared.target, alpha, l1_ratio)
            .ok_or_else(|| AppError::fitting("Sparse nonlinear fit produced non-finite values."))?;

        Ok(ModelArtifact::Sparse(SparseModel {
            lag,
            spec: prepared.spec,
            scaler: prepared.scaler,
            selected: prepared.selected,
            intercept: sol.intercept,
            coefficients: sol.coefficients.iter().copied().collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunConfig, TransformKind};

    fn quadratic_frame(n: usize) -> Frame {
        let x = DMatrix::from_fn(n, 1, |i, _| -2.0 + 4.0 * i as f64 / (n - 1) as f64);
        let y = DVector::from_fn(n, |i, _| x[(i, 0)] * x[(i, 0)] - 1.0);
        Frame {
            x: x.clone(),
            x_raw: x,
            y,
            groups: None,
        }
    }

    #[test]
    fn static_fit_finds_square_term() {
        let config = RunConfig {
            trans_type: TransformKind::Poly,
            ..RunConfig::default()
        };
        let names = vec!["u".to_string()];
        let ctx = FitContext {
            config: &config,
            feature_names: &names,
            response_name: "y",
        };
        let frame = quadratic_frame(40);
        let fitter = SparseNonlinearFitter::new(SparseVariant::Static);
        let params = HyperParams::new()
            .with_int("degree", 2)
            .with_float("alpha", 1e-4)
            .with_float("l1_ratio", 0.5);
        let artifact = fitter.fit(&frame, &params, &ctx).unwrap();
        let ModelArtifact::Sparse(model) = &artifact else {
            panic!("expected sparse artifact");
        };
        let (names, _) = model.retained();
        assert!(names.contains(&"u^2".to_string()));
        let (_, mse) = artifact.score(&frame).unwrap();
        assert!(mse < 1e-3, "mse={mse}");
    }

    #[test]
    fn dynamic_fit_consumes_lag_rows() {
        let config = RunConfig {
            lag: vec![2],
            degree: vec![1],
            l1_ratio: vec![0.5],
            alpha_num: 3,
            ..RunConfig::default()
        };
        let names = vec!["u".to_string()];
        let ctx = FitContext {
            config: &config,
            feature_names: &names,
            response_name: "y",
        };
        let frame = quadratic_frame(30);
        let fitter = SparseNonlinearFitter::new(SparseVariant::Dynamic);
        let grid = fitter.grid(&frame, &ctx).unwrap();
        assert_eq!(grid.len(), 3);
        let artifact = fitter.fit(&frame, &grid[2], &ctx).unwrap();
        assert_eq!(artifact.offset(), 2);
        assert_eq!(artifact.predict(&frame).unwrap().len(), 28);
    }

    #[test]
    fn lagged_outputs_stay_linear_unless_full() {
        let config = RunConfig::default();
        let names = vec!["u".to_string()];
        let ctx = FitContext {
            config: &config,
            feature_names: &names,
            response_name: "y",
        };
        let partial =
            SparseNonlinearFitter::new(SparseVariant::Dynamic).linear_only_flags(1, &ctx);
        let full =
            SparseNonlinearFitter::new(SparseVariant::DynamicFull).linear_only_flags(1, &ctx);
        assert_eq!(partial, vec![true, false, false]);
        assert_eq!(full, vec![false, false, false]);
    }
}
