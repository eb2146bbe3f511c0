//! Candidate family selection.

use crate::domain::ModelFamily;

use super::Decision;

use ModelFamily::{
    ElasticNet, Ols, PartialLeastSquares, RandomForest, RecurrentSequence, Ridge,
    SparseNonlinearDynamic, SparseNonlinearStatic, SparsePartialLeastSquares, StateSpace,
    SupportVector,
};

/// Dataset properties and user constraints the family rules look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilyInputs {
    pub nonlinear: bool,
    pub collinear: bool,
    pub dynamic: bool,
    pub enough_data: bool,
    pub interpretable: bool,
    pub continuity: bool,
    pub spectral_data: bool,
}

pub struct FamilyRule {
    pub applies: fn(&FamilyInputs) -> bool,
    pub families: &'static [ModelFamily],
    pub rationale: &'static str,
}

pub const FAMILY_RULES: [FamilyRule; 10] = [
    FamilyRule {
        applies: |i| i.nonlinear && !i.dynamic && (!i.enough_data || i.interpretable),
        families: &[SparseNonlinearStatic],
        rationale: "Nonlinear static data with limited samples or an interpretability requirement: using the sparse nonlinear regression only.",
    },
    FamilyRule {
        applies: |i| i.nonlinear && !i.dynamic && i.continuity,
        families: &[SparseNonlinearStatic, SupportVector],
        rationale: "Nonlinear static data where predictions must be continuous: comparing sparse nonlinear regression and support vector regression.",
    },
    FamilyRule {
        applies: |i| i.nonlinear && !i.dynamic,
        families: &[SparseNonlinearStatic, SupportVector, RandomForest],
        rationale: "Nonlinear static data with enough samples: comparing sparse nonlinear regression, support vector regression and random forest.",
    },
    FamilyRule {
        applies: |i| i.nonlinear && i.dynamic && (!i.enough_data || i.interpretable),
        families: &[SparseNonlinearDynamic],
        rationale: "Nonlinear dynamic data with limited samples or an interpretability requirement: using the lagged sparse nonlinear regression.",
    },
    FamilyRule {
        applies: |i| i.nonlinear && i.dynamic,
        families: &[RecurrentSequence],
        rationale: "Nonlinear dynamic data with enough samples: using the recurrent sequence model.",
    },
    FamilyRule {
        applies: |i| !i.nonlinear && !i.dynamic && !i.collinear,
        families: &[Ols],
        rationale: "Linear static data without multicollinearity: ordinary least squares is sufficient.",
    },
    FamilyRule {
        applies: |i| !i.nonlinear && !i.dynamic && i.spectral_data,
        families: &[Ridge, PartialLeastSquares],
        rationale: "Collinear spectral data: comparing ridge regression and partial least squares.",
    },
    FamilyRule {
        applies: |i| !i.nonlinear && !i.dynamic && i.interpretable,
        families: &[ElasticNet, SparsePartialLeastSquares],
        rationale: "Collinear data with an interpretability requirement: comparing elastic net and sparse PLS.",
    },
    FamilyRule {
        applies: |i| !i.nonlinear && !i.dynamic,
        families: &[ElasticNet, SparsePartialLeastSquares, Ridge, PartialLeastSquares],
        rationale: "Collinear data: comparing elastic net, sparse PLS, ridge regression and PLS.",
    },
    FamilyRule {
        applies: |i| !i.nonlinear && i.dynamic,
        families: &[StateSpace],
        rationale: "Linear dynamic data: using a state-space model.",
    },
];

/// First matching rule of [`FAMILY_RULES`].
pub fn select_families(inputs: &FamilyInputs) -> Decision<Vec<ModelFamily>> {
    FAMILY_RULES
        .iter()
        .find(|rule| (rule.applies)(inputs))
        .map(|rule| Decision {
            outcome: rule.families.to_vec(),
            rationale: rule.rationale.to_string(),
        })
        // The last two rows cover every linear case, so this is unreachable.
        .unwrap_or_else(|| Decision {
            outcome: vec![Ols],
            rationale: "No family rule applied; falling back to ordinary least squares.".to_string(),
        })
}
