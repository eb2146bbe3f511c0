//! Train/validation row partitions for each CV strategy.
//!
//! All shuffling uses a seeded `StdRng`, so a strategy applied twice to the
//! same row count (and groups) yields identical splits. Index lists are kept
//! sorted so ordered families see rows in time order.

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::domain::CvStrategy;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct SplitSettings {
    pub k_fold: usize,
    pub repeats: usize,
    pub seed: u64,
}

/// Build the partitions for a held-out strategy.
///
/// Information-criterion strategies have no partitions and are rejected here.
pub fn make_splits(
    strategy: CvStrategy,
    n: usize,
    groups: Option<&[i64]>,
    settings: SplitSettings,
) -> Result<Vec<Split>, AppError> {
    let k = settings.k_fold.max(2);
    let seed = settings.seed;
    let splits = match strategy {
        CvStrategy::Single => vec![shuffled_holdout(n, k, seed)],
        CvStrategy::MonteCarlo => (0..settings.repeats.max(1))
            .map(|r| shuffled_holdout(n, k, seed.wrapping_add(r as u64)))
            .collect(),
        CvStrategy::KFold => k_fold(n, k, seed),
        CvStrategy::RepeatedKFold => (0..settings.repeats.max(1))
            .flat_map(|r| k_fold(n, k, seed.wrapping_add(r as u64)))
            .collect(),
        CvStrategy::SingleOrdered => {
            let n_val = (n / k).max(1);
            vec![Split {
                train: (0..n - n_val.min(n)).collect(),
                validation: (n - n_val.min(n)..n).collect(),
            }]
        }
        CvStrategy::TimeSeries => time_series(n, k),
        CvStrategy::SingleGroup => {
            let groups = require_groups(strategy, groups, n)?;
            vec![group_holdout(groups, k, seed)?]
        }
        CvStrategy::GroupShuffleSplit => {
            let groups = require_groups(strategy, groups, n)?;
            (0..settings.repeats.max(1))
                .map(|r| group_holdout(groups, k, seed.wrapping_add(r as u64)))
                .collect::<Result<_, _>>()?
        }
        CvStrategy::GroupKFold => {
            let groups = require_groups(strategy, groups, n)?;
            group_k_fold(groups, k)?
        }
        CvStrategy::Aic | CvStrategy::Aicc | CvStrategy::Bic => {
            return Err(AppError::config(format!(
                "Strategy {strategy} scores in-sample and has no validation folds."
            )));
        }
    };

    if let Some(bad) = splits
        .iter()
        .find(|s| s.train.is_empty() || s.validation.is_empty())
    {
        return Err(AppError::data(format!(
            "{strategy} produced an empty partition on {n} rows (train {}, validation {}).",
            bad.train.len(),
            bad.validation.len()
        )));
    }
    Ok(splits)
}

fn require_groups<'a>(
    strategy: CvStrategy,
    groups: Option<&'a [i64]>,
    n: usize,
) -> Result<&'a [i64], AppError> {
    match groups {
        Some(g) if g.len() == n => Ok(g),
        Some(g) => Err(AppError::data(format!(
            "{strategy} needs one group label per row ({} labels, {n} rows).",
            g.len()
        ))),
        None => Err(AppError::data(format!("{strategy} needs group labels."))),
    }
}

fn complement(n: usize, validation: &[usize]) -> Vec<usize> {
    let mut held = vec![false; n];
    for &i in validation {
        held[i] = true;
    }
    (0..n).filter(|&i| !held[i]).collect()
}

/// One random holdout of `n / k` rows.
fn shuffled_holdout(n: usize, k: usize, seed: u64) -> Split {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let n_val = (n / k).max(1).min(n);
    let mut validation = order[..n_val].to_vec();
    validation.sort_unstable();
    Split {
        train: complement(n, &validation),
        validation,
    }
}

/// Shuffled K-fold; the first `n % k` folds take one extra row.
fn k_fold(n: usize, k: usize, seed: u64) -> Vec<Split> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);

    let k = k.min(n.max(1));
    let base = n / k;
    let remainder = n % k;
    let mut out = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < remainder);
        let mut validation = order[start..start + size].to_vec();
        validation.sort_unstable();
        start += size;
        out.push(Split {
            train: complement(n, &validation),
            validation,
        });
    }
    out
}

/// Expanding window: fold `i` trains on chunks `0..=i` and validates chunk `i + 1`.
fn time_series(n: usize, k: usize) -> Vec<Split> {
    let chunk = n / (k + 1);
    if chunk == 0 {
        return vec![Split {
            train: Vec::new(),
            validation: Vec::new(),
        }];
    }
    let first = n - k * chunk;
    (0..k)
        .map(|i| {
            let end = first + i * chunk;
            Split {
                train: (0..end).collect(),
                validation: (end..end + chunk).collect(),
            }
        })
        .collect()
}

fn distinct(groups: &[i64]) -> Vec<i64> {
    let mut out = groups.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

fn rows_in(groups: &[i64], held: &[i64]) -> Vec<usize> {
    (0..groups.len())
        .filter(|&i| held.binary_search(&groups[i]).is_ok())
        .collect()
}

/// Hold out a random `1/k` share of the groups (at least one, never all).
fn group_holdout(groups: &[i64], k: usize, seed: u64) -> Result<Split, AppError> {
    let mut labels = distinct(groups);
    if labels.len() < 2 {
        return Err(AppError::data("Grouped validation needs at least two groups."));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    labels.shuffle(&mut rng);
    let n_val = (labels.len() / k).clamp(1, labels.len() - 1);
    let mut held = labels[..n_val].to_vec();
    held.sort_unstable();
    let validation = rows_in(groups, &held);
    Ok(Split {
        train: complement(groups.len(), &validation),
        validation,
    })
}

/// Group K-fold with `min(k, groups)` folds, largest groups placed first
/// into the currently smallest fold.
fn group_k_fold(groups: &[i64], k: usize) -> Result<Vec<Split>, AppError> {
    let labels = distinct(groups);
    if labels.len() < 2 {
        return Err(AppError::data("Group K-fold needs at least two groups."));
    }
    let folds = k.min(labels.len());
    let mut sized: Vec<(i64, usize)> = labels
        .iter()
        .map(|&g| (g, groups.iter().filter(|&&v| v == g).count()))
        .collect();
    sized.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut members: Vec<Vec<i64>> = vec![Vec::new(); folds];
    let mut load = vec![0usize; folds];
    for (g, size) in sized {
        let target = (0..folds).min_by_key(|&f| (load[f], f)).unwrap_or(0);
        members[target].push(g);
        load[target] += size;
    }

    Ok(members
        .into_iter()
        .map(|mut held| {
            held.sort_unstable();
            let validation = rows_in(groups, &held);
            Split {
                train: complement(groups.len(), &validation),
                validation,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SplitSettings {
        SplitSettings {
            k_fold: 5,
            repeats: 3,
            seed: 0,
        }
    }

    #[test]
    fn k_fold_covers_every_row_once() {
        let splits = make_splits(CvStrategy::KFold, 23, None, settings()).unwrap();
        assert_eq!(splits.len(), 5);
        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.validation.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
        assert_eq!(splits[0].validation.len(), 5);
        assert_eq!(splits[4].validation.len(), 4);
    }

    #[test]
    fn repeated_k_fold_multiplies_folds() {
        let splits = make_splits(CvStrategy::RepeatedKFold, 30, None, settings()).unwrap();
        assert_eq!(splits.len(), 15);
    }

    #[test]
    fn same_seed_same_splits() {
        let a = make_splits(CvStrategy::MonteCarlo, 40, None, settings()).unwrap();
        let b = make_splits(CvStrategy::MonteCarlo, 40, None, settings()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ordered_split_holds_out_the_tail() {
        let splits = make_splits(CvStrategy::SingleOrdered, 20, None, settings()).unwrap();
        assert_eq!(splits[0].validation, vec![16, 17, 18, 19]);
        assert_eq!(splits[0].train, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn time_series_windows_expand() {
        let splits = make_splits(CvStrategy::TimeSeries, 60, None, settings()).unwrap();
        assert_eq!(splits.len(), 5);
        assert!(splits.windows(2).all(|w| w[0].train.len() < w[1].train.len()));
        for s in &splits {
            assert!(s.train.iter().max() < s.validation.iter().min());
        }
    }

    #[test]
    fn group_k_fold_never_splits_a_group() {
        let groups: Vec<i64> = (0..30).map(|i| (i % 3) as i64).collect();
        let splits = make_splits(CvStrategy::GroupKFold, 30, Some(&groups), settings()).unwrap();
        assert_eq!(splits.len(), 3);
        for s in &splits {
            let labels: Vec<i64> = s.validation.iter().map(|&i| groups[i]).collect();
            let held = distinct(&labels);
            assert_eq!(held.len(), 1);
            assert!(s.train.iter().all(|&i| groups[i] != held[0]));
        }
    }

    #[test]
    fn grouped_strategy_without_groups_is_a_data_error() {
        let err = make_splits(CvStrategy::GroupKFold, 10, None, settings()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn information_criteria_have_no_folds() {
        assert!(make_splits(CvStrategy::Bic, 10, None, settings()).is_err());
    }
}
