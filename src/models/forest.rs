//! Bagged regression trees.
//!
//! Each tree is grown on a bootstrap sample drawn from its own seeded RNG
//! (`seed + tree index`), so forests are reproducible regardless of how rayon
//! schedules the trees.

use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::domain::{HyperParams, ModelFamily};
use crate::error::AppError;
use crate::fit::grid::{cartesian, ints};

use super::{FitContext, ModelArtifact, ModelFitter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if row[*feature_idx] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }

    fn leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.leaves() + right.leaves(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub trees: Vec<TreeNode>,
}

impl ForestModel {
    pub fn predict(&self, frame: &Frame) -> Vec<f64> {
        let k = self.trees.len().max(1) as f64;
        (0..frame.n_rows())
            .map(|i| {
                let row: Vec<f64> = frame.x.row(i).iter().copied().collect();
                self.trees.iter().map(|t| t.predict(&row)).sum::<f64>() / k
            })
            .collect()
    }

    pub fn mean_leaves(&self) -> usize {
        if self.trees.is_empty() {
            return 0;
        }
        self.trees.iter().map(TreeNode::leaves).sum::<usize>() / self.trees.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeSettings {
    max_depth: usize,
    min_samples_leaf: usize,
}

fn build_tree(
    x: &DMatrix<f64>,
    y: &[f64],
    indices: &[usize],
    depth: usize,
    settings: TreeSettings,
) -> TreeNode {
    let n_samples = indices.len();
    let value = indices.iter().map(|&i| y[i]).sum::<f64>() / n_samples.max(1) as f64;

    let should_stop = depth >= settings.max_depth || n_samples < 2 * settings.min_samples_leaf;
    if should_stop {
        return TreeNode::Leaf { value, n_samples };
    }

    let Some((feature_idx, threshold)) = find_best_split(x, y, indices, settings.min_samples_leaf)
    else {
        return TreeNode::Leaf { value, n_samples };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| x[(i, feature_idx)] <= threshold);

    TreeNode::Split {
        feature_idx,
        threshold,
        left: Box::new(build_tree(x, y, &left_idx, depth + 1, settings)),
        right: Box::new(build_tree(x, y, &right_idx, depth + 1, settings)),
    }
}

/// Best variance-reducing split, scanning sorted values with prefix sums.
fn find_best_split(
    x: &DMatrix<f64>,
    y: &[f64],
    indices: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let base = total * total / n as f64;
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..x.ncols() {
        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| x[(a, feature)].total_cmp(&x[(b, feature)]));

        let mut left_sum = 0.0;
        for k in 1..n {
            left_sum += y[order[k - 1]];
            let (lo, hi) = (x[(order[k - 1], feature)], x[(order[k], feature)]);
            if k < min_leaf || n - k < min_leaf || lo >= hi {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / k as f64
                + right_sum * right_sum / (n - k) as f64
                - base;
            if gain > 1e-12 && best.is_none_or(|(_, _, g)| gain > g) {
                best = Some((feature, 0.5 * (lo + hi), gain));
            }
        }
    }

    best.map(|(f, t, _)| (f, t))
}

pub fn fit_forest(
    x: &DMatrix<f64>,
    y: &[f64],
    n_trees: usize,
    max_depth: usize,
    min_samples_leaf: usize,
    seed: u64,
) -> Result<ForestModel, AppError> {
    let n = x.nrows();
    if n == 0 || n_trees == 0 {
        return Err(AppError::fitting("Random forest needs rows and at least one tree."));
    }
    let settings = TreeSettings {
        max_depth,
        min_samples_leaf: min_samples_leaf.max(1),
    };
    let trees = (0..n_trees)
        .into_par_iter()
        .map(|tree_idx| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(tree_idx as u64));
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            build_tree(x, y, &sample, 0, settings)
        })
        .collect();
    Ok(ForestModel { trees })
}

pub struct ForestFitter;

impl ModelFitter for ForestFitter {
    fn family(&self) -> ModelFamily {
        ModelFamily::RandomForest
    }

    fn grid(&self, _train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError> {
        let cfg = ctx.config;
        Ok(cartesian(&[
            ("max_depth", ints(&cfg.rf_max_depth)),
            ("n_estimators", ints(&cfg.rf_n_estimators)),
            ("min_samples_leaf", ints(&cfg.rf_min_samples_leaf)),
        ]))
    }

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError> {
        let model = fit_forest(
            &train.x,
            train.y.as_slice(),
            params.usize("n_estimators")?,
            params.usize("max_depth")?,
            params.usize("min_samples_leaf")?,
            ctx.config.seed,
        )?;
        Ok(ModelArtifact::Forest(model))
    }
}
