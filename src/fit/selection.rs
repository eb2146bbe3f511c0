//! Winner selection across fitted families.
//!
//! Rules, applied in order:
//!
//! 1. Lowest held-out validation MSE among families that have one.
//! 2. Otherwise, lowest information criterion (only when every scored family
//!    used the same criterion).
//! 3. Otherwise, plain-regression if it was fit (it has no validation score
//!    and only ever wins as the fallback).
//! 4. Otherwise, the first successful family in canonical order.
//!
//! Ties go to the family that sorts first, so the result never depends on the
//! order in which results were produced.

use std::collections::BTreeMap;

use crate::domain::{FittingResult, ModelFamily, ValidationScore};

pub fn select_winner(results: &BTreeMap<ModelFamily, FittingResult>) -> Option<ModelFamily> {
    let scored = |want_mse: bool| {
        results
            .iter()
            .filter(|(family, _)| **family != ModelFamily::Ols)
            .filter_map(|(family, result)| {
                let score = result.validation?;
                let matches = matches!(score, ValidationScore::Mse(_)) == want_mse;
                (matches && score.value().is_finite()).then_some((*family, score))
            })
            .collect::<Vec<_>>()
    };

    if let Some(family) = argmin(&scored(true)) {
        return Some(family);
    }

    let criteria = scored(false);
    if let Some((_, first)) = criteria.first() {
        if criteria.iter().all(|(_, s)| s.comparable_with(first)) {
            if let Some(family) = argmin(&criteria) {
                return Some(family);
            }
        }
    }

    if results.contains_key(&ModelFamily::Ols) {
        return Some(ModelFamily::Ols);
    }
    results.keys().next().copied()
}

fn argmin(scored: &[(ModelFamily, ValidationScore)]) -> Option<ModelFamily> {
    let mut best: Option<(ModelFamily, f64)> = None;
    for (family, score) in scored {
        if best.is_none_or(|(_, b)| score.value() < b) {
            best = Some((*family, score.value()));
        }
    }
    best.map(|(family, _)| family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FamilyDetails, HyperParams, InformationCriterion};
    use crate::models::ModelArtifact;
    use crate::models::linear::LinearModel;

    fn result(family: ModelFamily, validation: Option<ValidationScore>) -> FittingResult {
        FittingResult {
            family,
            strategy: None,
            hyperparams: HyperParams::new(),
            artifact: ModelArtifact::Linear(LinearModel {
                intercept: 0.0,
                coefficients: vec![1.0],
                names: vec!["x1".into()],
            }),
            details: FamilyDetails::None,
            offset: 0,
            yhat_train: vec![],
            yhat_val: None,
            yhat_test: vec![],
            mse_train: 0.0,
            validation,
            mse_test: 0.0,
            grid_scores: vec![],
            post_fit: None,
        }
    }

    fn collect(items: Vec<FittingResult>) -> BTreeMap<ModelFamily, FittingResult> {
        items.into_iter().map(|r| (r.family, r)).collect()
    }

    #[test]
    fn lowest_validation_mse_wins() {
        let results = collect(vec![
            result(ModelFamily::Ridge, Some(ValidationScore::Mse(0.4))),
            result(ModelFamily::ElasticNet, Some(ValidationScore::Mse(0.3))),
            result(ModelFamily::PartialLeastSquares, Some(ValidationScore::Mse(0.5))),
        ]);
        assert_eq!(select_winner(&results), Some(ModelFamily::ElasticNet));
    }

    #[test]
    fn plain_regression_never_competes_on_score() {
        let results = collect(vec![
            result(ModelFamily::Ols, None),
            result(ModelFamily::Ridge, Some(ValidationScore::Mse(10.0))),
        ]);
        assert_eq!(select_winner(&results), Some(ModelFamily::Ridge));
    }

    #[test]
    fn plain_regression_is_the_fallback() {
        let results = collect(vec![result(ModelFamily::Ols, None)]);
        assert_eq!(select_winner(&results), Some(ModelFamily::Ols));
        assert_eq!(select_winner(&BTreeMap::new()), None);
    }

    #[test]
    fn ties_go_to_the_family_that_sorts_first() {
        let results = collect(vec![
            result(ModelFamily::Ridge, Some(ValidationScore::Mse(0.3))),
            result(ModelFamily::ElasticNet, Some(ValidationScore::Mse(0.3))),
        ]);
        assert_eq!(select_winner(&results), Some(ModelFamily::ElasticNet));
    }

    #[test]
    fn criteria_are_used_when_no_mse_exists() {
        let aic = |value| {
            Some(ValidationScore::Criterion {
                kind: InformationCriterion::Aic,
                value,
            })
        };
        let results = collect(vec![
            result(ModelFamily::SparseNonlinearDynamic, aic(-20.0)),
            result(ModelFamily::StateSpace, aic(-35.0)),
        ]);
        assert_eq!(select_winner(&results), Some(ModelFamily::StateSpace));
    }

    #[test]
    fn mse_scores_take_precedence_over_criteria() {
        let results = collect(vec![
            result(
                ModelFamily::StateSpace,
                Some(ValidationScore::Criterion { kind: InformationCriterion::Aic, value: -100.0 }),
            ),
            result(ModelFamily::RecurrentSequence, Some(ValidationScore::Mse(0.2))),
        ]);
        assert_eq!(select_winner(&results), Some(ModelFamily::RecurrentSequence));
    }
}
