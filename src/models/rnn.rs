//! Recurrent-sequence family as an echo-state network.
//!
//! Reservoir weights are random (seeded) and fixed; only a ridge readout over
//! the reservoir states is trained. Layers are stacked: layer 0 reads the
//! standardized inputs, layer `l` reads the state of layer `l - 1`. The
//! `cell` setting chooses the state update: `basic` replaces the state each
//! step, `gru` / `lstm` use a leaky integrator so older inputs persist.
//!
//! The first `washout` rows of any sequence only warm the reservoir up and
//! are never predicted.

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Frame;
use crate::domain::{
    CvStrategy, FittingResult, HyperParams, ModelFamily, ParamValue, ValidationScore,
};
use crate::error::AppError;
use crate::fit::cv::{ResultParts, assemble_result};
use crate::fit::grid::cartesian;
use crate::math::{fit_linear, mse};

use super::{DynamicEstimator, FitContext, ModelArtifact};

/// Bound on the reservoir's recurrent row-sum norm (keeps the echo-state property).
const RECURRENT_NORM: f64 = 0.9;
const LEAKY_RATE: f64 = 0.5;
/// Share of post-washout training rows used to fit the readout during selection.
const TRAIN_SHARE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    Linear,
}

impl Activation {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "linear" => Ok(Activation::Linear),
            other => Err(AppError::config(format!("Unknown recurrent activation '{other}'."))),
        }
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Activation::Relu => v.max(0.0),
            Activation::Tanh => v.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::Linear => v,
        }
    }
}

fn leak_for_cell(raw: &str) -> Result<f64, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "basic" => Ok(1.0),
        "gru" | "lstm" => Ok(LEAKY_RATE),
        other => Err(AppError::config(format!("Unknown recurrent cell '{other}'."))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirLayer {
    pub units: usize,
    pub input_dim: usize,
    /// Row-major `units × input_dim`.
    pub w_in: Vec<f64>,
    /// Row-major `units × units`.
    pub w_rec: Vec<f64>,
    pub bias: Vec<f64>,
}

impl ReservoirLayer {
    fn random(units: usize, input_dim: usize, rng: &mut StdRng) -> Self {
        let scale_in = 1.0 / (input_dim.max(1) as f64).sqrt();
        let w_in = (0..units * input_dim)
            .map(|_| rng.gen_range(-1.0..1.0) * scale_in)
            .collect();
        let mut w_rec: Vec<f64> = (0..units * units).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let max_row = (0..units)
            .map(|i| w_rec[i * units..(i + 1) * units].iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0f64, f64::max);
        if max_row > 0.0 {
            let s = RECURRENT_NORM / max_row;
            w_rec.iter_mut().for_each(|v| *v *= s);
        }
        let bias = (0..units).map(|_| rng.gen_range(-0.1..0.1)).collect();
        Self {
            units,
            input_dim,
            w_in,
            w_rec,
            bias,
        }
    }

    fn step(&self, input: &[f64], state: &mut [f64], activation: Activation, leak: f64) {
        let prev = state.to_vec();
        for (i, s) in state.iter_mut().enumerate() {
            let mut pre = self.bias[i];
            let w_in = &self.w_in[i * self.input_dim..(i + 1) * self.input_dim];
            pre += w_in.iter().zip(input).map(|(w, u)| w * u).sum::<f64>();
            let w_rec = &self.w_rec[i * self.units..(i + 1) * self.units];
            pre += w_rec.iter().zip(&prev).map(|(w, h)| w * h).sum::<f64>();
            *s = (1.0 - leak) * prev[i] + leak * activation.apply(pre);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirModel {
    pub layers: Vec<ReservoirLayer>,
    pub activation: Activation,
    pub leak: f64,
    pub washout: usize,
    pub intercept: f64,
    /// Weights over `[layer states..., x(t)]`.
    pub readout: Vec<f64>,
}

impl ReservoirModel {
    /// Features per row: concatenated layer states followed by the inputs.
    fn features(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let total: usize = self.layers.iter().map(|l| l.units).sum::<usize>() + x.ncols();
        let mut out = DMatrix::<f64>::zeros(x.nrows(), total);
        let mut states: Vec<Vec<f64>> = self.layers.iter().map(|l| vec![0.0; l.units]).collect();
        for t in 0..x.nrows() {
            let input: Vec<f64> = x.row(t).iter().copied().collect();
            let mut col = 0;
            for l in 0..self.layers.len() {
                let layer_input = if l == 0 { input.clone() } else { states[l - 1].clone() };
                self.layers[l].step(&layer_input, &mut states[l], self.activation, self.leak);
                for v in &states[l] {
                    out[(t, col)] = *v;
                    col += 1;
                }
            }
            for v in &input {
                out[(t, col)] = *v;
                col += 1;
            }
        }
        out
    }

    pub fn predict(&self, frame: &Frame) -> Vec<f64> {
        let feats = self.features(&frame.x);
        (self.washout..feats.nrows())
            .map(|t| {
                self.intercept
                    + self
                        .readout
                        .iter()
                        .enumerate()
                        .map(|(j, w)| w * feats[(t, j)])
                        .sum::<f64>()
            })
            .collect()
    }
}

/// Fit a readout on rows `rows` of precomputed features.
fn fit_readout(
    feats: &DMatrix<f64>,
    y: &DVector<f64>,
    rows: std::ops::Range<usize>,
    lambda: f64,
) -> Option<(f64, Vec<f64>)> {
    let idx: Vec<usize> = rows.collect();
    let x = feats.select_rows(&idx);
    let target = y.select_rows(&idx);
    let sol = fit_linear(&x, &target, lambda * idx.len() as f64)?;
    Some((sol.intercept, sol.coefficients.iter().copied().collect()))
}

pub struct ReservoirEstimator;

impl ReservoirEstimator {
    fn grid(&self, n_features: usize, ctx: &FitContext<'_>) -> Vec<HyperParams> {
        let cfg = ctx.config;
        let layers = cfg
            .rnn_layers
            .clone()
            .unwrap_or_else(|| vec![vec![n_features.max(16)]]);
        let text = |v: &[String]| v.iter().map(|s| ParamValue::Text(s.clone())).collect();
        cartesian(&[
            ("activation", text(&cfg.rnn_activation)),
            ("layers", layers.into_iter().map(ParamValue::Sizes).collect()),
            ("cell", text(&cfg.rnn_cell)),
        ])
    }

    fn build(
        &self,
        params: &HyperParams,
        n_features: usize,
        ctx: &FitContext<'_>,
    ) -> Result<ReservoirModel, AppError> {
        let activation = Activation::parse(params.text("activation")?)?;
        let leak = leak_for_cell(params.text("cell")?)?;
        let sizes = params.sizes("layers")?;
        if sizes.is_empty() || sizes.contains(&0) {
            return Err(AppError::config("Recurrent layers need at least one unit each."));
        }
        let mut rng = StdRng::seed_from_u64(ctx.config.seed);
        let mut input_dim = n_features;
        let mut layers = Vec::with_capacity(sizes.len());
        for &units in sizes {
            layers.push(ReservoirLayer::random(units, input_dim, &mut rng));
            input_dim = units;
        }
        Ok(ReservoirModel {
            layers,
            activation,
            leak,
            washout: ctx.config.rnn_past_steps,
            intercept: 0.0,
            readout: Vec::new(),
        })
    }
}

impl DynamicEstimator for ReservoirEstimator {
    fn family(&self) -> ModelFamily {
        ModelFamily::RecurrentSequence
    }

    fn estimate(
        &self,
        train: &Frame,
        test: &Frame,
        ctx: &FitContext<'_>,
    ) -> Result<FittingResult, AppError> {
        let n = train.n_rows();
        let washout = ctx.config.rnn_past_steps;
        let usable = n.saturating_sub(washout);
        let split = washout + (usable as f64 * TRAIN_SHARE).round() as usize;
        if usable < 5 || split >= n {
            return Err(AppError::data(format!(
                "Recurrent model needs more than {} training rows (washout {washout}).",
                washout + 4
            )));
        }
        for name in &ctx.config.rnn_activation {
            Activation::parse(name)?;
        }
        for name in &ctx.config.rnn_cell {
            leak_for_cell(name)?;
        }
        let lambda = ctx.config.rnn_lambda_l2_reg;
        let grid = self.grid(train.n_features(), ctx);

        let scores: Vec<Option<f64>> = grid
            .par_iter()
            .map(|params| {
                let model = self.build(params, train.n_features(), ctx).ok()?;
                let feats = model.features(&train.x);
                let (b0, w) = fit_readout(&feats, &train.y, washout..split, lambda)?;
                let pred: Vec<f64> = (split..n)
                    .map(|t| b0 + w.iter().enumerate().map(|(j, c)| c * feats[(t, j)]).sum::<f64>())
                    .collect();
                let score = mse(&train.y.as_slice()[split..], &pred);
                score.is_finite().then_some(score)
            })
            .collect();

        let (best_idx, best_score) = scores
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|v| (i, v)))
            .fold(None, |acc: Option<(usize, f64)>, (i, v)| match acc {
                Some((_, b)) if b <= v => acc,
                _ => Some((i, v)),
            })
            .ok_or_else(|| AppError::fitting("Every recurrent configuration failed to fit."))?;
        let params = grid[best_idx].clone();
        debug!(%params, score = best_score, "recurrent configuration selected");

        let mut model = self.build(&params, train.n_features(), ctx)?;
        let feats = model.features(&train.x);

        // Readout from the selection split, for validation predictions.
        let (b0, w) = fit_readout(&feats, &train.y, washout..split, lambda)
            .ok_or_else(|| AppError::fitting("Recurrent readout is singular."))?;
        let yhat_val: Vec<f64> = (split..n)
            .map(|t| b0 + w.iter().enumerate().map(|(j, c)| c * feats[(t, j)]).sum::<f64>())
            .collect();

        let (intercept, readout) = fit_readout(&feats, &train.y, washout..n, lambda)
            .ok_or_else(|| AppError::fitting("Recurrent readout is singular."))?;
        model.intercept = intercept;
        model.readout = readout;

        assemble_result(
            ResultParts {
                family: ModelFamily::RecurrentSequence,
                strategy: Some(CvStrategy::SingleOrdered),
                hyperparams: params,
                artifact: ModelArtifact::Reservoir(model),
                yhat_val: Some(yhat_val),
                validation: Some(ValidationScore::Mse(best_score)),
                grid_scores: scores,
            },
            train,
            test,
        )
    }
}
