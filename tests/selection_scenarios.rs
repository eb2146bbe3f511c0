//! End-to-end selection runs on synthetic process data.

use smart_process_analytics::data::sample::{SyntheticKind, generate};
use smart_process_analytics::decide::{FamilyInputs, select_families};
use smart_process_analytics::domain::{CvStrategy, ModelFamily, RunConfig};
use smart_process_analytics::orchestrator::Orchestrator;

use ModelFamily::*;

#[test]
fn linear_data_with_enough_rows_selects_plain_regression() {
    let train = generate(SyntheticKind::Linear, 200, 11).unwrap();
    let test = generate(SyntheticKind::Linear, 200, 12).unwrap();
    let cfg = RunConfig {
        enough_data: true,
        ..RunConfig::default()
    };

    let outcome = Orchestrator::default().run(&train, Some(&test), &cfg).unwrap();

    assert_eq!(outcome.candidates, vec![Ols]);
    assert_eq!(outcome.strategy, Some(CvStrategy::Single));
    assert_eq!(outcome.selected, Ols);
    assert_eq!(
        serde_json::to_value(outcome.selected).unwrap(),
        serde_json::json!("plain-regression")
    );
    let stats = outcome.winner().unwrap().post_fit.as_ref().unwrap();
    assert_eq!(stats.yhat_test_nontrans.len(), 200);
    assert!(
        (0.15..0.40).contains(&stats.mse_test_nontrans),
        "mse_test={}",
        stats.mse_test_nontrans
    );
}

#[test]
fn collinear_data_compares_the_four_linear_families() {
    let train = generate(SyntheticKind::Collinear, 200, 11).unwrap();
    let plan = Orchestrator::default().plan(&train, &RunConfig::default()).unwrap();
    assert!(plan.characterization.collinear);
    assert_eq!(
        plan.families,
        vec![ElasticNet, SparsePartialLeastSquares, Ridge, PartialLeastSquares]
    );
    assert_eq!(plan.strategy, Some(CvStrategy::RepeatedKFold));
}

#[test]
fn linear_dynamics_route_to_the_state_space_model() {
    let train = generate(SyntheticKind::Dynamic, 300, 5).unwrap();
    let cfg = RunConfig {
        dynamic_model: true,
        lag: vec![1],
        ..RunConfig::default()
    };
    let plan = Orchestrator::default().plan(&train, &cfg).unwrap();
    assert_eq!(plan.characterization.dynamic_nonlinear, Some(false));
    assert_eq!(plan.families, vec![StateSpace]);
    assert_eq!(plan.strategy, None);
    assert_eq!(plan.candidates, vec![(StateSpace, None)]);
}

#[test]
fn grouped_nested_run_fills_one_column_per_group() {
    let train = generate(SyntheticKind::Grouped, 100, 2).unwrap();
    let cfg = RunConfig {
        nested_cv: true,
        model_name: Some(vec!["RR".into(), "PLS".into()]),
        cv_method: Some("KFold".into()),
        k_fold: 4,
        alpha_num: 4,
        ..RunConfig::default()
    };

    let outcome = Orchestrator::default().run(&train, None, &cfg).unwrap();
    let nested = outcome.nested.as_ref().unwrap();

    assert_eq!(nested.families, vec![Ridge, PartialLeastSquares]);
    assert_eq!(
        nested.outer_labels,
        vec!["group-1", "group-2", "group-3", "group-4", "group-5"]
    );
    for row in &nested.mse {
        assert_eq!(row.len(), 5);
        assert!(row.iter().all(|v| v.is_finite() && *v >= 0.0));
    }
    assert_eq!(outcome.selected, nested.selected);
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.winner().unwrap().post_fit.is_some());
}

#[test]
fn cross_validation_is_deterministic_for_a_fixed_seed() {
    let train = generate(SyntheticKind::Collinear, 80, 4).unwrap();
    let cfg = RunConfig {
        model_name: Some(vec!["RR".into()]),
        cv_method: Some("Re_KFold".into()),
        nr: 2,
        alpha_num: 6,
        seed: 9,
        ..RunConfig::default()
    };
    let a = Orchestrator::default().run(&train, None, &cfg).unwrap();
    let b = Orchestrator::default().run(&train, None, &cfg).unwrap();
    let (ra, rb) = (a.winner().unwrap(), b.winner().unwrap());
    assert_eq!(ra.hyperparams, rb.hyperparams);
    assert_eq!(ra.grid_scores, rb.grid_scores);
    assert_eq!(ra.mse_test.to_bits(), rb.mse_test.to_bits());
}

#[test]
fn family_rules_table() {
    fn inputs(flags: &str) -> FamilyInputs {
        let on = |name: &str| flags.split_whitespace().any(|f| f == name);
        FamilyInputs {
            nonlinear: on("nonlinear"),
            collinear: on("collinear"),
            dynamic: on("dynamic"),
            enough_data: on("enough"),
            interpretable: on("interpretable"),
            continuity: on("continuity"),
            spectral_data: on("spectral"),
        }
    }
    let rows: Vec<(&str, Vec<ModelFamily>)> = vec![
        ("nonlinear", vec![SparseNonlinearStatic]),
        ("nonlinear enough continuity", vec![SparseNonlinearStatic, SupportVector]),
        (
            "nonlinear collinear enough",
            vec![SparseNonlinearStatic, SupportVector, RandomForest],
        ),
        ("nonlinear dynamic enough interpretable", vec![SparseNonlinearDynamic]),
        ("nonlinear dynamic enough", vec![RecurrentSequence]),
        ("enough interpretable", vec![Ols]),
        ("collinear spectral", vec![Ridge, PartialLeastSquares]),
        ("collinear spectral interpretable", vec![Ridge, PartialLeastSquares]),
        ("collinear interpretable", vec![ElasticNet, SparsePartialLeastSquares]),
        (
            "collinear enough",
            vec![ElasticNet, SparsePartialLeastSquares, Ridge, PartialLeastSquares],
        ),
        ("collinear dynamic", vec![StateSpace]),
    ];
    for (flags, expected) in rows {
        let inputs = inputs(flags);
        assert_eq!(select_families(&inputs).outcome, expected, "{flags}");
    }
}
