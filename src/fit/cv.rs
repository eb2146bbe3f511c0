//! Cross-validation protocol.
//!
//! Given a family, a standardized training frame and a strategy, the
//! protocol:
//!
//! - builds the family's grid from the training frame only
//! - scores every grid point (parallel over points) either by averaged
//!   held-out MSE across the strategy's folds, or by an information
//!   criterion computed in-sample
//! - picks the minimum (lowest grid index on ties; with `robust_priority`
//!   the first point within one standard error of the minimum)
//! - refits the chosen point on the whole training frame and predicts the
//!   training and test frames
//!
//! Grid points and folds never share mutable state; scores are collected by
//! index so the outcome does not depend on scheduling.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::data::Frame;
use crate::domain::{
    CvStrategy, FittingPathway, FittingResult, HyperParams, ModelFamily, ValidationScore,
};
use crate::error::AppError;
use crate::fit::folds::{SplitSettings, make_splits};
use crate::math::mse;
use crate::models::{FitContext, FitterRegistry, ModelArtifact, ModelFitter};

/// Everything needed to finish a [`FittingResult`] besides the predictions.
pub struct ResultParts {
    pub family: ModelFamily,
    pub strategy: Option<CvStrategy>,
    pub hyperparams: HyperParams,
    pub artifact: ModelArtifact,
    pub yhat_val: Option<Vec<f64>>,
    pub validation: Option<ValidationScore>,
    pub grid_scores: Vec<Option<f64>>,
}

/// Predict train/test with a final artifact and package the result.
pub fn assemble_result(
    parts: ResultParts,
    train: &Frame,
    test: &Frame,
) -> Result<FittingResult, AppError> {
    let (yhat_train, mse_train) = parts.artifact.score(train)?;
    let (yhat_test, mse_test) = parts.artifact.score(test)?;
    Ok(FittingResult {
        family: parts.family,
        strategy: parts.strategy,
        hyperparams: parts.hyperparams,
        details: parts.artifact.details(),
        offset: parts.artifact.offset(),
        artifact: parts.artifact,
        yhat_train,
        yhat_val: parts.yhat_val,
        yhat_test,
        mse_train,
        validation: parts.validation,
        mse_test,
        grid_scores: parts.grid_scores,
        post_fit: None,
    })
}

/// Averaged score of one grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PointScore {
    mean: f64,
    std_err: f64,
}

pub struct CrossValidationProtocol<'a> {
    registry: &'a FitterRegistry,
    ctx: FitContext<'a>,
}

impl<'a> CrossValidationProtocol<'a> {
    pub fn new(registry: &'a FitterRegistry, ctx: FitContext<'a>) -> Self {
        Self { registry, ctx }
    }

    pub fn context(&self) -> &FitContext<'a> {
        &self.ctx
    }

    /// Fit `family` on `train` under `strategy` and predict `test`.
    ///
    /// `strategy` is ignored by the direct and driver pathways.
    pub fn evaluate(
        &self,
        family: ModelFamily,
        train: &Frame,
        test: &Frame,
        strategy: Option<CvStrategy>,
    ) -> Result<FittingResult, AppError> {
        match family.pathway() {
            FittingPathway::Driver => {
                let estimator = self.registry.estimator(family).ok_or_else(|| {
                    AppError::config(format!("No estimator registered for {family}."))
                })?;
                estimator.estimate(train, test, &self.ctx)
            }
            FittingPathway::Direct => {
                let fitter = self.fitter(family)?;
                let params = HyperParams::new();
                let artifact = fitter.fit(train, &params, &self.ctx)?;
                assemble_result(
                    ResultParts {
                        family,
                        strategy,
                        hyperparams: params,
                        artifact,
                        yhat_val: None,
                        validation: None,
                        grid_scores: Vec::new(),
                    },
                    train,
                    test,
                )
            }
            FittingPathway::StaticGrid | FittingPathway::DynamicGrid => {
                let strategy = strategy.ok_or_else(|| {
                    AppError::config(format!("{family} needs a cross-validation strategy."))
                })?;
                self.grid_search(family, train, test, strategy)
            }
        }
    }

    fn fitter(&self, family: ModelFamily) -> Result<&'a dyn ModelFitter, AppError> {
        self.registry
            .fitter(family)
            .ok_or_else(|| AppError::config(format!("No fitter registered for {family}.")))
    }

    fn grid_search(
        &self,
        family: ModelFamily,
        train: &Frame,
        test: &Frame,
        strategy: CvStrategy,
    ) -> Result<FittingResult, AppError> {
        let fitter = self.fitter(family)?;
        let grid = fitter.grid(train, &self.ctx)?;
        if grid.is_empty() {
            return Err(AppError::fitting(format!("{family} produced an empty grid.")));
        }

        let cfg = self.ctx.config;
        let (scores, splits) = match strategy.information_criterion() {
            Some(criterion) => {
                let scores: Vec<Option<PointScore>> = grid
                    .par_iter()
                    .map(|params| {
                        let artifact = fitter.fit(train, params, &self.ctx).ok()?;
                        let (_, err) = artifact.score(train).ok()?;
                        let n = train.n_rows() - artifact.offset();
                        let k = artifact.effective_params() as f64;
                        let value = criterion.evaluate(n, err, k)?;
                        Some(PointScore {
                            mean: value,
                            std_err: 0.0,
                        })
                    })
                    .collect();
                (scores, Vec::new())
            }
            None => {
                let settings = SplitSettings {
                    k_fold: cfg.k_fold,
                    repeats: cfg.nr,
                    seed: cfg.seed,
                };
                let splits =
                    make_splits(strategy, train.n_rows(), train.groups.as_deref(), settings)?;
                let folds: Vec<(Frame, Frame)> = splits
                    .iter()
                    .map(|s| (train.rows(&s.train), train.rows(&s.validation)))
                    .collect();
                let scores: Vec<Option<PointScore>> = grid
                    .par_iter()
                    .map(|params| score_held_out(fitter, params, &folds, &self.ctx))
                    .collect();
                (scores, splits)
            }
        };

        let robust = cfg.robust_priority && strategy.information_criterion().is_none();
        let best = choose(&scores, robust).ok_or_else(|| {
            AppError::fitting(format!(
                "Every one of {} grid points failed to fit for {family}.",
                grid.len()
            ))
        })?;
        let failed = scores.iter().filter(|s| s.is_none()).count();
        if failed > 0 {
            warn!(%family, failed, total = grid.len(), "some grid points failed to fit");
        }
        let params = grid[best].clone();
        let best_score = scores[best].map(|s| s.mean).unwrap_or(f64::NAN);
        debug!(
            %family,
            %strategy,
            index = best,
            %params,
            score = best_score,
            "grid point selected"
        );

        let artifact = fitter.fit(train, &params, &self.ctx)?;

        let yhat_val = match splits.as_slice() {
            [only] if strategy.is_single_split() => {
                let part = fitter.fit(&train.rows(&only.train), &params, &self.ctx)?;
                Some(part.predict(&train.rows(&only.validation))?)
            }
            _ => None,
        };

        let validation = match strategy.information_criterion() {
            Some(kind) => ValidationScore::Criterion {
                kind,
                value: best_score,
            },
            None => ValidationScore::Mse(best_score),
        };

        assemble_result(
            ResultParts {
                family,
                strategy: Some(strategy),
                hyperparams: params,
                artifact,
                yhat_val,
                validation: Some(validation),
                grid_scores: scores.iter().map(|s| s.map(|p| p.mean)).collect(),
            },
            train,
            test,
        )
    }
}

fn score_held_out(
    fitter: &dyn ModelFitter,
    params: &HyperParams,
    folds: &[(Frame, Frame)],
    ctx: &FitContext<'_>,
) -> Option<PointScore> {
    let mut errors = Vec::with_capacity(folds.len());
    for (fit_rows, val_rows) in folds {
        let artifact = fitter.fit(fit_rows, params, ctx).ok()?;
        let yhat = artifact.predict(val_rows).ok()?;
        let err = mse(&val_rows.y.as_slice()[artifact.offset()..], &yhat);
        if !err.is_finite() {
            return None;
        }
        errors.push(err);
    }
    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let std_err = if errors.len() > 1 {
        let var = errors.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / (n - 1.0);
        (var / n).sqrt()
    } else {
        0.0
    };
    Some(PointScore { mean, std_err })
}

/// Index of the winning grid point.
///
/// Minimum mean, lowest index on ties. In robust mode, the first point whose
/// mean is within one standard error of the minimum.
fn choose(scores: &[Option<PointScore>], robust: bool) -> Option<usize> {
    let mut best: Option<(usize, PointScore)> = None;
    for (idx, score) in scores.iter().enumerate() {
        let Some(score) = score else { continue };
        if best.is_none_or(|(_, b)| score.mean < b.mean) {
            best = Some((idx, *score));
        }
    }
    let (best_idx, best_score) = best?;
    if !robust {
        return Some(best_idx);
    }
    let threshold = best_score.mean + best_score.std_err;
    scores
        .iter()
        .position(|s| s.is_some_and(|s| s.mean <= threshold))
        .or(Some(best_idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ps(mean: f64, std_err: f64) -> Option<PointScore> {
        Some(PointScore { mean, std_err })
    }

    #[test]
    fn choose_breaks_ties_by_lowest_index() {
        let scores = vec![None, ps(2.0, 0.0), ps(1.0, 0.0), ps(1.0, 0.0)];
        assert_eq!(choose(&scores, false), Some(2));
    }

    #[test]
    fn choose_one_standard_error_prefers_earlier_points() {
        let scores = vec![ps(1.3, 0.1), ps(1.15, 0.1), ps(1.0, 0.2)];
        assert_eq!(choose(&scores, false), Some(2));
        assert_eq!(choose(&scores, true), Some(1));
    }

    #[test]
    fn choose_returns_none_when_everything_failed() {
        assert_eq!(choose(&[None, None], false), None);
    }
}
