//! Nested cross-validation.
//!
//! The outer loop holds out either a random share of rows (`num_outer`
//! times) or, when group labels exist, exactly one group at a time. Each
//! outer-training partition is standardized on its own and handed to the
//! cross-validation protocol per family; the outer-validation rows only ever
//! score the model the inner loop already chose.
//!
//! Outer iterations run in parallel and are collected by index, so the MSE
//! matrix is identical for a fixed seed regardless of scheduling.

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::data::{Dataset, prepare};
use crate::domain::{CvStrategy, HyperParams, ModelFamily, NestedSummary, RunConfig};
use crate::error::AppError;
use crate::fit::cv::CrossValidationProtocol;
use crate::math::nan_mean;
use crate::models::{FitContext, FitterRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuterSplit {
    pub label: String,
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Family plus the inner strategy it is evaluated with.
pub type Candidate = (ModelFamily, Option<CvStrategy>);

/// Outer train/validation partitions.
///
/// Ungrouped data gets `num_outer` seeded random holdouts of `n / k_fold`
/// rows; when any candidate is dynamic the holdout is one contiguous block so
/// the validation rows keep their time order. Grouped data gets one split per
/// distinct group (leave-one-group-out).
pub fn outer_splits(
    dataset: &Dataset,
    dynamic: bool,
    cfg: &RunConfig,
) -> Result<Vec<OuterSplit>, AppError> {
    let n = dataset.n_rows();
    if let Some(groups) = &dataset.groups {
        let labels = dataset.unique_groups();
        if labels.len() < 2 {
            return Err(AppError::data(
                "Leave-one-group-out needs at least two distinct groups.",
            ));
        }
        return Ok(labels
            .iter()
            .map(|g| {
                let (validation, train): (Vec<usize>, Vec<usize>) =
                    (0..n).partition(|&i| groups[i] == *g);
                OuterSplit {
                    label: format!("group-{g}"),
                    train,
                    validation,
                }
            })
            .collect());
    }

    let n_val = (n / cfg.k_fold.max(2)).max(1);
    if n_val >= n {
        return Err(AppError::data(format!(
            "Nested cross-validation needs more rows than {n}."
        )));
    }
    Ok((0..cfg.num_outer)
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(i as u64));
            let mut validation: Vec<usize> = if dynamic {
                let start = rng.gen_range(0..=n - n_val);
                (start..start + n_val).collect()
            } else {
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut rng);
                order.truncate(n_val);
                order
            };
            validation.sort_unstable();
            let train = (0..n).filter(|i| validation.binary_search(i).is_err()).collect();
            OuterSplit {
                label: format!("split-{}", i + 1),
                train,
                validation,
            }
        })
        .collect())
}

/// Per-family outcome of one outer iteration: outer-validation MSE in
/// original response units plus the inner-chosen hyperparameters, or the
/// reason the fit failed.
pub type IterationScore = Result<(f64, HyperParams), String>;

/// Run every candidate's inner protocol on one outer split.
pub fn evaluate_iteration(
    registry: &FitterRegistry,
    dataset: &Dataset,
    split: &OuterSplit,
    candidates: &[Candidate],
    cfg: &RunConfig,
) -> Result<Vec<IterationScore>, AppError> {
    let outer_train = dataset.select_rows(&split.train);
    let outer_val = dataset.select_rows(&split.validation);
    let prepared = prepare(&outer_train, Some(&outer_val))?;
    let y_scale = prepared.y_scaler.scale.first().copied().unwrap_or(1.0);

    let ctx = FitContext {
        config: cfg,
        feature_names: &prepared.feature_names,
        response_name: &prepared.response_name,
    };
    let protocol = CrossValidationProtocol::new(registry, ctx);

    Ok(candidates
        .iter()
        .map(|&(family, strategy)| {
            match protocol.evaluate(family, &prepared.train, &prepared.test, strategy) {
                Ok(result) => Ok((result.mse_test * y_scale * y_scale, result.hyperparams)),
                Err(err) => {
                    warn!(
                        %family,
                        split = %split.label,
                        error = %err,
                        "outer iteration fit failed"
                    );
                    Err(err.message().to_string())
                }
            }
        })
        .collect())
}

/// Build the (family × outer iteration) MSE matrix and pick the family with
/// the lowest mean.
pub fn run_nested(
    registry: &FitterRegistry,
    dataset: &Dataset,
    candidates: &[Candidate],
    cfg: &RunConfig,
) -> Result<NestedSummary, AppError> {
    let dynamic = candidates.iter().any(|(f, _)| f.is_dynamic());
    let splits = outer_splits(dataset, dynamic, cfg)?;
    info!(
        outer = splits.len(),
        families = candidates.len(),
        grouped = dataset.groups.is_some(),
        "running nested cross-validation"
    );

    let per_split: Vec<Result<Vec<IterationScore>, AppError>> = splits
        .par_iter()
        .map(|split| evaluate_iteration(registry, dataset, split, candidates, cfg))
        .collect();
    let per_split = per_split.into_iter().collect::<Result<Vec<_>, _>>()?;

    let families: Vec<ModelFamily> = candidates.iter().map(|(f, _)| *f).collect();
    let mut mse = vec![vec![f64::NAN; splits.len()]; families.len()];
    let mut inner_params = vec![vec![None; splits.len()]; families.len()];
    let mut errors = vec![vec![None; splits.len()]; families.len()];
    for (i, scores) in per_split.into_iter().enumerate() {
        for (f, score) in scores.into_iter().enumerate() {
            match score {
                Ok((value, params)) => {
                    mse[f][i] = value;
                    inner_params[f][i] = Some(params);
                }
                Err(reason) => errors[f][i] = Some(reason),
            }
        }
    }
    let mean_mse: Vec<f64> = mse.iter().map(|row| nan_mean(row)).collect();

    let mut best: Option<(usize, f64)> = None;
    for (idx, value) in mean_mse.iter().enumerate() {
        if value.is_finite() && best.is_none_or(|(_, b)| *value < b) {
            best = Some((idx, *value));
        }
    }
    let (best_idx, best_mean) = best.ok_or_else(|| {
        let reasons: Vec<String> = families
            .iter()
            .zip(&errors)
            .filter_map(|(family, row)| {
                row.iter().flatten().next().map(|r| format!("{family} ({r})"))
            })
            .collect();
        AppError::fitting(format!(
            "Nested cross-validation: no family produced a finite outer score: {}",
            reasons.join("; ")
        ))
    })?;
    info!(family = %families[best_idx], mean_mse = best_mean, "nested cross-validation winner");

    Ok(NestedSummary {
        outer_labels: splits.into_iter().map(|s| s.label).collect(),
        selected: families[best_idx],
        families,
        mse,
        mean_mse,
        inner_params,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{SyntheticKind, generate};

    fn small_cfg() -> RunConfig {
        RunConfig {
            num_outer: 4,
            k_fold: 4,
            seed: 3,
            ..RunConfig::default()
        }
    }

    #[test]
    fn random_outer_splits_are_disjoint_and_seeded() {
        let ds = generate(SyntheticKind::Linear, 40, 1).unwrap();
        let a = outer_splits(&ds, false, &small_cfg()).unwrap();
        let b = outer_splits(&ds, false, &small_cfg()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        for s in &a {
            assert_eq!(s.validation.len(), 10);
            assert_eq!(s.train.len() + s.validation.len(), 40);
            assert!(s.validation.iter().all(|v| !s.train.contains(v)));
        }
    }

    #[test]
    fn dynamic_outer_splits_hold_out_a_block() {
        let ds = generate(SyntheticKind::Dynamic, 40, 1).unwrap();
        for s in outer_splits(&ds, true, &small_cfg()).unwrap() {
            let first = s.validation[0];
            assert_eq!(s.validation, (first..first + 10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn grouped_data_leaves_one_group_out() {
        let ds = generate(SyntheticKind::Grouped, 50, 2).unwrap();
        let splits = outer_splits(&ds, false, &small_cfg()).unwrap();
        assert_eq!(splits.len(), 5);
        let groups = ds.groups.clone().unwrap();
        for s in &splits {
            let held: Vec<i64> = s.validation.iter().map(|&i| groups[i]).collect();
            assert!(held.windows(2).all(|w| w[0] == w[1]));
            assert!(s.train.iter().all(|&i| groups[i] != held[0]));
        }
        assert_eq!(splits[0].label, "group-1");
    }

    #[test]
    fn nested_matrix_is_filled_for_successful_families() {
        let ds = generate(SyntheticKind::Linear, 60, 4).unwrap();
        let cfg = RunConfig {
            alpha_num: 4,
            ..small_cfg()
        };
        let candidates = vec![
            (ModelFamily::Ridge, Some(CvStrategy::KFold)),
            (ModelFamily::PartialLeastSquares, Some(CvStrategy::KFold)),
        ];
        let summary = run_nested(&FitterRegistry::default(), &ds, &candidates, &cfg).unwrap();
        assert_eq!(summary.mse.len(), 2);
        assert!(summary.mse.iter().flatten().all(|v| v.is_finite()));
        assert!(summary.inner_params.iter().flatten().all(|p| p.is_some()));
        assert!(candidates.iter().any(|(f, _)| *f == summary.selected));
    }
}
