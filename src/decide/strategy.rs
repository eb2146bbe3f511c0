//! CV strategy selection.

use crate::domain::{CvStrategy, ModelFamily};

use super::Decision;

/// Below this many rows per predictor, dynamic models are compared by AICc.
pub const AICC_ROWS_PER_FEATURE: usize = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyInputs {
    pub dynamic: bool,
    pub enough_data: bool,
    pub nested_cv: bool,
    pub robust_priority: bool,
    pub groups_present: bool,
    /// Every candidate family is the state-space driver.
    pub state_space_only: bool,
    pub n_rows: usize,
    pub n_features: usize,
}

impl StrategyInputs {
    fn rows_per_feature(&self) -> usize {
        self.n_rows / self.n_features.max(1)
    }
}

pub struct StrategyRule {
    pub applies: fn(&StrategyInputs) -> bool,
    pub strategy: Option<CvStrategy>,
    pub rationale: &'static str,
}

pub const STRATEGY_RULES: [StrategyRule; 10] = [
    StrategyRule {
        applies: |i| !i.dynamic && i.enough_data && i.groups_present,
        strategy: Some(CvStrategy::SingleGroup),
        rationale: "Enough grouped data: validating on a single held-out set of groups.",
    },
    StrategyRule {
        applies: |i| !i.dynamic && i.enough_data,
        strategy: Some(CvStrategy::Single),
        rationale: "Enough data: validating on a single random held-out split.",
    },
    StrategyRule {
        applies: |i| !i.dynamic && !i.groups_present,
        strategy: Some(CvStrategy::RepeatedKFold),
        rationale: "Limited data: using repeated k-fold cross-validation.",
    },
    StrategyRule {
        applies: |i| !i.dynamic,
        strategy: Some(CvStrategy::GroupKFold),
        rationale: "Limited grouped data: using group k-fold cross-validation.",
    },
    StrategyRule {
        applies: |i| i.state_space_only,
        strategy: None,
        rationale: "State-space model selects its order internally; no cross-validation strategy needed.",
    },
    StrategyRule {
        applies: |i| i.enough_data,
        strategy: Some(CvStrategy::SingleOrdered),
        rationale: "Enough dynamic data: validating on the final block of rows.",
    },
    StrategyRule {
        applies: |i| i.nested_cv,
        strategy: Some(CvStrategy::TimeSeries),
        rationale: "Nested validation of dynamic data: using time-series cross-validation.",
    },
    StrategyRule {
        applies: |i| i.robust_priority,
        strategy: Some(CvStrategy::Bic),
        rationale: "Robustness prioritized for dynamic data: selecting hyperparameters by BIC.",
    },
    StrategyRule {
        applies: |i| i.rows_per_feature() < AICC_ROWS_PER_FEATURE,
        strategy: Some(CvStrategy::Aicc),
        rationale: "Few rows per predictor for dynamic data: selecting hyperparameters by AICc.",
    },
    StrategyRule {
        applies: |_| true,
        strategy: Some(CvStrategy::Aic),
        rationale: "Dynamic data: selecting hyperparameters by AIC.",
    },
];

pub fn select_strategy(inputs: &StrategyInputs) -> Decision<Option<CvStrategy>> {
    let rule = STRATEGY_RULES
        .iter()
        .find(|rule| (rule.applies)(inputs))
        .unwrap_or(&STRATEGY_RULES[STRATEGY_RULES.len() - 1]);
    Decision {
        outcome: rule.strategy,
        rationale: rule.rationale.to_string(),
    }
}

/// Strategy actually used for `family`, plus a warning when it had to change.
///
/// Lagged grid families cannot be validated on shuffled rows, so unordered
/// strategies are replaced with the ordered single split. The recurrent
/// driver always validates on the final block of rows. Other direct and
/// driver families ignore the strategy and get it back unchanged.
pub fn strategy_for_family(
    family: ModelFamily,
    strategy: Option<CvStrategy>,
) -> (Option<CvStrategy>, Option<String>) {
    use crate::domain::FittingPathway::*;
    match (family.pathway(), strategy) {
        (Driver, Some(s))
            if family == ModelFamily::RecurrentSequence && s != CvStrategy::SingleOrdered =>
        {
            (
                Some(CvStrategy::SingleOrdered),
                Some(format!(
                    "{family} validates on the final block of rows; {s} is not used."
                )),
            )
        }
        (Driver, None) if family == ModelFamily::RecurrentSequence => {
            (Some(CvStrategy::SingleOrdered), None)
        }
        (Direct | Driver, s) => (s, None),
        (DynamicGrid, Some(s)) if !s.preserves_order() => (
            Some(CvStrategy::SingleOrdered),
            Some(format!(
                "{family} needs ordered validation; using {} instead of {s}.",
                CvStrategy::SingleOrdered
            )),
        ),
        (DynamicGrid, None) => (
            Some(CvStrategy::SingleOrdered),
            Some(format!(
                "No CV strategy was selected for {family}; using {}.",
                CvStrategy::SingleOrdered
            )),
        ),
        (StaticGrid, None) => (
            Some(CvStrategy::RepeatedKFold),
            Some(format!(
                "No CV strategy was selected for {family}; using {}.",
                CvStrategy::RepeatedKFold
            )),
        ),
        (_, s) => (s, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use CvStrategy::*;

    #[test]
    fn lagged_families_are_coerced_to_ordered_validation() {
        let (s, warning) = strategy_for_family(ModelFamily::SparseNonlinearDynamic, Some(KFold));
        assert_eq!(s, Some(SingleOrdered));
        assert!(warning.is_some());

        let (s, warning) = strategy_for_family(ModelFamily::SparseNonlinearDynamic, Some(Bic));
        assert_eq!(s, Some(Bic));
        assert!(warning.is_none());
    }

    #[test]
    fn drivers_keep_whatever_they_were_given() {
        assert_eq!(strategy_for_family(ModelFamily::StateSpace, None), (None, None));
        assert_eq!(
            strategy_for_family(ModelFamily::Ridge, Some(KFold)),
            (Some(KFold), None)
        );
    }

    #[test]
    fn recurrent_driver_reports_an_overridden_strategy() {
        let (s, warning) = strategy_for_family(ModelFamily::RecurrentSequence, Some(TimeSeries));
        assert_eq!(s, Some(SingleOrdered));
        assert!(warning.unwrap().contains("time-series"));

        assert_eq!(
            strategy_for_family(ModelFamily::RecurrentSequence, Some(SingleOrdered)),
            (Some(SingleOrdered), None)
        );
        assert_eq!(
            strategy_for_family(ModelFamily::RecurrentSequence, None),
            (Some(SingleOrdered), None)
        );
    }

    #[test]
    fn rows_per_feature_uses_integer_division() {
        let i = StrategyInputs {
            dynamic: true,
            n_rows: 79,
            n_features: 2,
            ..StrategyInputs::default()
        };
        assert_eq!(select_strategy(&i).outcome, Some(Aicc));
        let i = StrategyInputs { n_rows: 80, ..i };
        assert_eq!(select_strategy(&i).outcome, Some(Aic));
    }

    #[test]
    fn strategy_rules_table() {
        // (dynamic, enough_data, nested_cv, robust_priority, groups, state_space_only, n_rows)
        type Row = (bool, bool, bool, bool, bool, bool, usize, Option<CvStrategy>);
        let rows: [Row; 16] = [
            (false, true, false, false, true, false, 500, Some(SingleGroup)),
            (false, true, false, false, false, false, 500, Some(Single)),
            (false, false, false, false, false, false, 500, Some(RepeatedKFold)),
            (false, false, false, false, true, false, 500, Some(GroupKFold)),
            (true, false, false, false, false, true, 500, None),
            (true, true, false, false, false, false, 500, Some(SingleOrdered)),
            (true, false, true, false, false, false, 500, Some(TimeSeries)),
            (true, false, false, true, false, false, 500, Some(Bic)),
            (true, false, false, false, false, false, 50, Some(Aicc)),
            (true, false, false, false, false, false, 500, Some(Aic)),
            // Priorities between rows.
            (false, true, true, true, false, true, 50, Some(Single)),
            (false, false, true, true, true, false, 50, Some(GroupKFold)),
            (true, true, true, true, true, true, 50, None),
            (true, true, true, true, true, false, 50, Some(SingleOrdered)),
            (true, false, true, true, false, false, 50, Some(TimeSeries)),
            (true, false, false, true, false, false, 50, Some(Bic)),
        ];
        for (dynamic, enough_data, nested_cv, robust_priority, groups, ss_only, n_rows, expected) in
            rows
        {
            let inputs = StrategyInputs {
                dynamic,
                enough_data,
                nested_cv,
                robust_priority,
                groups_present: groups,
                state_space_only: ss_only,
                n_rows,
                n_features: 2,
            };
            let decision = select_strategy(&inputs);
            assert_eq!(decision.outcome, expected, "{inputs:?}");
            assert!(!decision.rationale.is_empty());
        }
    }
}
