//! State-space family: ARX identification realized in observer form.
//!
//! For each order `p` in `1..=maxorder` an ARX model
//!
//! ```text
//! y(t) = c + Σᵢ aᵢ y(t-i) + Σₗ bₗ·x(t-l)     i = 1..p, l = 0..p
//! ```
//!
//! is fit by least squares on a common sample (rows `maxorder..`), and the
//! order with the lowest AIC wins. The ARX polynomials are equivalent to an
//! observer-canonical state-space system (see [`StateSpaceModel::realization`]).
//! Predictions are recursive `k_steps`-ahead forecasts.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Frame;
use crate::domain::{
    FittingResult, HyperParams, InformationCriterion, ModelFamily, ValidationScore,
};
use crate::error::AppError;
use crate::fit::cv::{ResultParts, assemble_result};
use crate::math::{fit_linear, lagged_design, mse};

use super::{DynamicEstimator, FitContext, ModelArtifact};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSpaceModel {
    pub order: usize,
    pub k_steps: usize,
    pub intercept: f64,
    /// Output polynomial `a₁..a_p`.
    pub a: Vec<f64>,
    /// Input coefficients per lag `0..=p`, each of length `m`.
    pub b: Vec<Vec<f64>>,
}

/// Observer-form matrices; the last input column is the constant 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Realization {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DVector<f64>,
    pub d: DVector<f64>,
}

impl StateSpaceModel {
    pub fn offset(&self) -> usize {
        self.order + self.k_steps.max(1) - 1
    }

    pub fn parameter_count(&self) -> usize {
        self.a.len() + self.b.iter().map(Vec::len).sum::<usize>() + 1
    }

    fn one_step(&self, x: &DMatrix<f64>, t: usize, y_at: impl Fn(usize) -> f64) -> f64 {
        let mut v = self.intercept;
        for (i, a) in self.a.iter().enumerate() {
            v += a * y_at(t - i - 1);
        }
        for (l, bl) in self.b.iter().enumerate() {
            for (j, b) in bl.iter().enumerate() {
                v += b * x[(t - l, j)];
            }
        }
        v
    }

    /// Recursive `k_steps`-ahead predictions for rows `offset()..`.
    pub fn predict(&self, frame: &Frame) -> Vec<f64> {
        let k = self.k_steps.max(1);
        let y = frame.y.as_slice();
        let n = frame.n_rows();
        let mut out = Vec::with_capacity(n.saturating_sub(self.offset()));
        for t in self.offset()..n {
            let start = t + 1 - k;
            let mut preds: Vec<f64> = Vec::with_capacity(k);
            for j in start..=t {
                let v = self.one_step(&frame.x, j, |idx| {
                    if idx < start { y[idx] } else { preds[idx - start] }
                });
                preds.push(v);
            }
            out.push(preds[k - 1]);
        }
        out
    }

    /// Free-run simulation from zero initial conditions.
    pub fn simulate(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let p = self.order;
        let mut y: Vec<f64> = Vec::with_capacity(x.nrows());
        for t in 0..x.nrows() {
            let mut v = self.intercept;
            for (i, a) in self.a.iter().enumerate() {
                if t > i {
                    v += a * y[t - i - 1];
                }
            }
            for (l, bl) in self.b.iter().enumerate().take(p + 1) {
                if t >= l {
                    for (j, b) in bl.iter().enumerate() {
                        v += b * x[(t - l, j)];
                    }
                }
            }
            y.push(v);
        }
        y
    }

    /// Observer-canonical `(A, B, C, D)`:
    /// `s(t+1) = A s(t) + B [x(t); 1]`, `y(t) = C·s(t) + D·[x(t); 1]`.
    pub fn realization(&self) -> Realization {
        let p = self.order;
        let m = self.b.first().map_or(0, Vec::len);
        let mut b0 = self.b[0].clone();
        b0.push(self.intercept);

        let mut a = DMatrix::<f64>::zeros(p, p);
        let mut b = DMatrix::<f64>::zeros(p, m + 1);
        for i in 0..p {
            a[(i, 0)] = self.a[i];
            if i + 1 < p {
                a[(i, i + 1)] = 1.0;
            }
            for j in 0..=m {
                let bi = if j < m { self.b[i + 1][j] } else { 0.0 };
                b[(i, j)] = bi + self.a[i] * b0[j];
            }
        }
        let mut c = DVector::<f64>::zeros(p);
        c[0] = 1.0;
        Realization {
            a,
            b,
            c,
            d: DVector::from_vec(b0),
        }
    }
}

/// Least squares ARX fit on rows `skip..` of the order-`p` lagged design.
fn fit_arx(
    frame: &Frame,
    order: usize,
    max_order: usize,
    k_steps: usize,
) -> Option<(StateSpaceModel, f64, usize)> {
    let (design, target) = lagged_design(&frame.x, frame.y.as_slice(), order);
    let skip = max_order - order;
    if design.nrows() <= skip {
        return None;
    }
    let idx: Vec<usize> = (skip..design.nrows()).collect();
    let design = design.select_rows(&idx);
    let target = target.select_rows(&idx);

    let sol = fit_linear(&design, &target, 0.0)?;
    let m = frame.n_features();
    let coef: Vec<f64> = sol.coefficients.iter().copied().collect();
    let a = coef[..order].to_vec();
    let b = (0..=order)
        .map(|l| coef[order + l * m..order + (l + 1) * m].to_vec())
        .collect();
    let fitted = sol.predict(&design);
    let err = mse(target.as_slice(), fitted.as_slice());
    let model = StateSpaceModel {
        order,
        k_steps,
        intercept: sol.intercept,
        a,
        b,
    };
    Some((model, err, idx.len()))
}

pub struct StateSpaceEstimator;

impl DynamicEstimator for StateSpaceEstimator {
    fn family(&self) -> ModelFamily {
        ModelFamily::StateSpace
    }

    fn estimate(
        &self,
        train: &Frame,
        test: &Frame,
        ctx: &FitContext<'_>,
    ) -> Result<FittingResult, AppError> {
        let m = train.n_features();
        let k_steps = ctx.config.k_steps.max(1);
        // Largest order that still leaves more rows than parameters.
        let feasible = (1..=ctx.config.maxorder)
            .take_while(|&p| {
                let params = p + (p + 1) * m + 1;
                train.n_rows() > p + params + 1
            })
            .last()
            .ok_or_else(|| {
                AppError::data(format!(
                    "Too few rows ({}) to identify a state-space model.",
                    train.n_rows()
                ))
            })?;

        let fits: Vec<Option<(StateSpaceModel, f64)>> = (1..=feasible)
            .into_par_iter()
            .map(|order| {
                let (model, err, n) = fit_arx(train, order, feasible, k_steps)?;
                let k = model.parameter_count() as f64;
                let aic = InformationCriterion::Aic.evaluate(n, err, k)?;
                Some((model, aic))
            })
            .collect();

        let grid_scores: Vec<Option<f64>> =
            fits.iter().map(|f| f.as_ref().map(|(_, a)| *a)).collect();
        let (model, aic) = fits
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(StateSpaceModel, f64)>, (model, aic)| match acc {
                Some((_, best)) if best <= aic => acc,
                _ => Some((model, aic)),
            })
            .ok_or_else(|| AppError::fitting("Every state-space order failed to fit."))?;
        debug!(order = model.order, aic, "state-space order selected");

        assemble_result(
            ResultParts {
                family: ModelFamily::StateSpace,
                strategy: None,
                hyperparams: HyperParams::new().with_int("order", model.order as i64),
                artifact: ModelArtifact::StateSpace(model),
                yhat_val: None,
                validation: Some(ValidationScore::Criterion {
                    kind: InformationCriterion::Aic,
                    value: aic,
                }),
                grid_scores,
            },
            train,
            test,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunConfig;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn second_order(n: usize) -> Frame {
        let mut rng = StdRng::seed_from_u64(11);
        let u: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut y = vec![0.0; n];
        for t in 2..n {
            let noise = 0.01 * rng.gen_range(-1.0..1.0);
            y[t] = 1.2 * y[t - 1] - 0.5 * y[t - 2] + 0.7 * u[t - 1] + noise;
        }
        let x = DMatrix::from_column_slice(n, 1, &u);
        Frame {
            x: x.clone(),
            x_raw: x,
            y: DVector::from_vec(y),
            groups: None,
        }
    }

    #[test]
    fn aic_recovers_second_order_dynamics() {
        let config = RunConfig {
            maxorder: 5,
            ..RunConfig::default()
        };
        let names = vec!["u".to_string()];
        let ctx = FitContext {
            config: &config,
            feature_names: &names,
            response_name: "y",
        };
        let frame = second_order(300);
        let result = StateSpaceEstimator.estimate(&frame, &frame, &ctx).unwrap();
        let ModelArtifact::StateSpace(model) = &result.artifact else {
            panic!("expected state-space artifact");
        };
        assert!(model.order >= 2);
        assert!((model.a[0] - 1.2).abs() < 0.1);
        assert!(result.mse_train < 1e-3);
    }

    #[test]
    fn multi_step_prediction_shifts_offset() {
        let model = StateSpaceModel {
            order: 1,
            k_steps: 3,
            intercept: 0.0,
            a: vec![0.5],
            b: vec![vec![0.0], vec![1.0]],
        };
        let frame = second_order(10);
        assert_eq!(model.offset(), 3);
        assert_eq!(model.predict(&frame).len(), 7);
    }

    #[test]
    fn observer_form_reproduces_arx_simulation() {
        let model = StateSpaceModel {
            order: 2,
            k_steps: 1,
            intercept: 0.3,
            a: vec![0.9, -0.2],
            b: vec![vec![0.4], vec![1.0], vec![-0.5]],
        };
        let x = DMatrix::from_fn(15, 1, |i, _| ((i * 7) % 5) as f64 - 2.0);
        let arx = model.simulate(&x);

        let r = model.realization();
        let mut state = DVector::<f64>::zeros(2);
        for t in 0..15 {
            let input = DVector::from_vec(vec![x[(t, 0)], 1.0]);
            let y = r.c.dot(&state) + r.d.dot(&input);
            assert!((y - arx[t]).abs() < 1e-9, "t={t}: {y} vs {}", arx[t]);
            state = &r.a * &state + &r.b * &input;
        }
    }
}
