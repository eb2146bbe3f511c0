//! Top-level run driver.
//!
//! A run walks a fixed sequence of states:
//!
//! `Characterizing → SelectingFamilyAndStrategy → FittingCandidates →
//! SelectingWinner → RefittingIfNeeded → DiagnosingResiduals → Packaging → Done`
//!
//! Collaborators (characterizer, residual diagnostics, fitter registry) are
//! injected so tests can replace any of them. Rationale messages, warnings and
//! advisories are logged as they happen and kept verbatim in the outcome.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::characterize::{
    DatasetCharacterizer, LjungBoxDiagnostics, MIN_RESIDUALS, ResidualDiagnostics,
    StatisticalCharacterizer, characterize,
};
use crate::data::{Dataset, Prepared, prepare};
use crate::decide::{
    FamilyInputs, StrategyInputs, select_families, select_strategy, strategy_for_family,
};
use crate::domain::{
    Characterization, CvStrategy, FamilyFailure, FittingResult, ModelFamily, NestedSummary,
    PostFitStats, RunConfig, SelectionOutcome,
};
use crate::error::AppError;
use crate::fit::{Candidate, CrossValidationProtocol, run_nested, select_winner};
use crate::math::{mean, mse, sample_stdev};
use crate::models::{FitContext, FitterRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Characterizing,
    SelectingFamilyAndStrategy,
    FittingCandidates,
    SelectingWinner,
    RefittingIfNeeded,
    DiagnosingResiduals,
    Packaging,
    Done,
}

/// What a run would do, decided before any model is fit.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub characterization: Characterization,
    pub families: Vec<ModelFamily>,
    pub strategy: Option<CvStrategy>,
    /// Each family with the strategy it will actually be evaluated under.
    pub candidates: Vec<Candidate>,
    pub rationale: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunPlan {
    pub fn uses_nested(&self, cfg: &RunConfig) -> bool {
        cfg.nested_cv && self.candidates.len() > 1
    }
}

pub struct Orchestrator {
    characterizer: Box<dyn DatasetCharacterizer>,
    diagnostics: Box<dyn ResidualDiagnostics>,
    registry: FitterRegistry,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self {
            characterizer: Box::new(StatisticalCharacterizer),
            diagnostics: Box::new(LjungBoxDiagnostics),
            registry: FitterRegistry::default(),
        }
    }
}

fn enter(state: RunState) {
    debug!(?state, "run state");
}

impl Orchestrator {
    pub fn with_characterizer(mut self, characterizer: Box<dyn DatasetCharacterizer>) -> Self {
        self.characterizer = characterizer;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Box<dyn ResidualDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_registry(mut self, registry: FitterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &FitterRegistry {
        &self.registry
    }

    /// Characterize `train` and choose families and a CV strategy.
    pub fn plan(&self, train: &Dataset, cfg: &RunConfig) -> Result<RunPlan, AppError> {
        cfg.validate()?;
        if !cfg.categorical.is_empty() && cfg.categorical.len() != train.n_features() {
            return Err(AppError::config(format!(
                "categorical has {} flags but the data has {} predictors.",
                cfg.categorical.len(),
                train.n_features()
            )));
        }

        let mut rationale = Vec::new();
        let mut warnings = Vec::new();

        enter(RunState::Characterizing);
        let scaled = prepare(train, None)?;
        // Explicit families do not depend on the characterization.
        let characterization =
            match characterize(self.characterizer.as_ref(), &scaled.train.x, &scaled.train.y, cfg)
            {
                Ok(c) => c,
                Err(err) if cfg.model_name.is_some() => {
                    warnings.push(format!(
                        "Characterization failed ({err}); continuing with the requested families."
                    ));
                    Characterization {
                        nonlinear: false,
                        collinear: false,
                        dynamic_nonlinear: None,
                    }
                }
                Err(err) => return Err(err),
            };

        enter(RunState::SelectingFamilyAndStrategy);

        let families = match &cfg.model_name {
            Some(names) => {
                let mut families = Vec::new();
                for name in names {
                    match ModelFamily::parse(name) {
                        Some(f) if !families.contains(&f) => families.push(f),
                        Some(_) => {}
                        None => warnings.push(format!("Unknown model family '{name}' dropped.")),
                    }
                }
                if families.is_empty() {
                    return Err(AppError::config(format!(
                        "No valid model family left from {names:?}."
                    )));
                }
                rationale.push(format!(
                    "Using the requested families: {}.",
                    join_families(&families)
                ));
                families
            }
            None => {
                let decision = select_families(&FamilyInputs {
                    nonlinear: characterization.effective_nonlinear(),
                    collinear: characterization.collinear,
                    dynamic: cfg.dynamic_model,
                    enough_data: cfg.enough_data,
                    interpretable: cfg.interpretable,
                    continuity: cfg.continuity,
                    spectral_data: cfg.spectral_data,
                });
                rationale.push(decision.rationale);
                decision.outcome
            }
        };

        let strategy = match &cfg.cv_method {
            Some(raw) => {
                let strategy = CvStrategy::parse(raw)
                    .ok_or_else(|| AppError::config(format!("Unknown cv_method '{raw}'.")))?;
                rationale.push(format!("Using the requested CV strategy: {strategy}."));
                Some(strategy)
            }
            None => {
                let decision = select_strategy(&StrategyInputs {
                    dynamic: cfg.dynamic_model,
                    enough_data: cfg.enough_data,
                    nested_cv: cfg.nested_cv,
                    robust_priority: cfg.robust_priority,
                    groups_present: train.groups.is_some(),
                    state_space_only: families.iter().all(|f| *f == ModelFamily::StateSpace),
                    n_rows: train.n_rows(),
                    n_features: train.n_features(),
                });
                rationale.push(decision.rationale);
                decision.outcome
            }
        };
        if let Some(s) = strategy {
            if s.requires_groups() && train.groups.is_none() {
                return Err(AppError::config(format!(
                    "CV strategy {s} needs group labels (--groups)."
                )));
            }
        }

        let candidates: Vec<Candidate> = families
            .iter()
            .map(|&family| {
                let (s, warning) = strategy_for_family(family, strategy);
                warnings.extend(warning);
                (family, s)
            })
            .collect();

        for line in &rationale {
            info!("{line}");
        }
        for line in &warnings {
            warn!("{line}");
        }

        Ok(RunPlan {
            characterization,
            families,
            strategy,
            candidates,
            rationale,
            warnings,
        })
    }

    /// Full run: plan, fit, select, diagnose and package.
    ///
    /// Without `test`, the training data doubles as the test data.
    pub fn run(
        &self,
        train: &Dataset,
        test: Option<&Dataset>,
        cfg: &RunConfig,
    ) -> Result<SelectionOutcome, AppError> {
        let plan = self.plan(train, cfg)?;
        let mut warnings = plan.warnings.clone();
        let mut advisories = Vec::new();

        let prepared = prepare(train, test)?;
        let ctx = FitContext {
            config: cfg,
            feature_names: &prepared.feature_names,
            response_name: &prepared.response_name,
        };
        let protocol = CrossValidationProtocol::new(&self.registry, ctx);

        enter(RunState::FittingCandidates);
        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        let nested = if plan.uses_nested(cfg) {
            let summary = run_nested(&self.registry, train, &plan.candidates, cfg)?;
            record_nested_failures(&summary, &mut failures, &mut warnings);
            Some(summary)
        } else {
            for &(family, strategy) in &plan.candidates {
                match protocol.evaluate(family, &prepared.train, &prepared.test, strategy) {
                    Ok(result) => {
                        info!(
                            %family,
                            hyperparams = %result.hyperparams,
                            mse_train = result.mse_train,
                            mse_test = result.mse_test,
                            "family fitted"
                        );
                        results.insert(family, result);
                    }
                    Err(err) => {
                        record_failure(&mut failures, &mut warnings, family, err.message())
                    }
                }
            }
            None
        };

        enter(RunState::SelectingWinner);
        let selected = match &nested {
            Some(summary) => summary.selected,
            None => select_winner(&results).ok_or_else(|| {
                AppError::fitting(format!(
                    "No model family could be fit: {}",
                    failures
                        .iter()
                        .map(|f: &FamilyFailure| format!("{} ({})", f.family, f.reason))
                        .collect::<Vec<_>>()
                        .join("; ")
                ))
            })?,
        };
        info!(family = %selected, "selected model");

        enter(RunState::RefittingIfNeeded);
        if nested.is_some() {
            let strategy = plan
                .candidates
                .iter()
                .find(|(f, _)| *f == selected)
                .and_then(|(_, s)| *s);
            let result = protocol.evaluate(selected, &prepared.train, &prepared.test, strategy)?;
            results.insert(selected, result);
        }

        enter(RunState::DiagnosingResiduals);
        let alpha = cfg.alpha;
        if let Some(winner) = results.get_mut(&selected) {
            let stats = post_fit(winner, &prepared, train, test, |residuals| {
                if residuals.len() < MIN_RESIDUALS {
                    debug!(n = residuals.len(), "too few residuals; diagnostics skipped");
                    return None;
                }
                self.diagnostics.diagnose(residuals, alpha)
            });
            if stats.residuals.as_ref().is_some_and(|r| r.dynamics_detected)
                && !selected.is_dynamic()
            {
                advisories.push(format!(
                    "Residuals of {selected} show leftover dynamics; consider rerunning with dynamic_model enabled."
                ));
            }
            winner.post_fit = Some(stats);
        }
        if cfg.robust_priority
            && plan.candidates.iter().any(|(f, s)| {
                f.is_dynamic() && matches!(s, Some(CvStrategy::Aic | CvStrategy::Aicc))
            })
        {
            advisories.push(
                "robust_priority is set but a dynamic family is selected by AIC/AICc; BIC is recommended for robustness."
                    .to_string(),
            );
        }
        for line in &advisories {
            warn!("{line}");
        }

        enter(RunState::Packaging);
        let outcome = SelectionOutcome {
            selected,
            results,
            failures,
            candidates: plan.families,
            strategy: plan.strategy,
            characterization: plan.characterization,
            nested,
            rationale: plan.rationale,
            warnings,
            advisories,
            created_at: chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string(),
        };

        if let Some(dir) = &cfg.output_dir {
            let saved = crate::io::export::write_outcome(dir, &outcome)?;
            info!(binary = %saved.binary.display(), json = %saved.json.display(), "results saved");
            if let (Some(summary), true) = (&outcome.nested, cfg.plot) {
                let path = dir.join(format!("MSE_distribution_{}.txt", outcome.created_at));
                let plot = crate::plot::render_nested_distribution(summary);
                crate::io::export::write_text(&path, &plot)?;
            }
        }

        enter(RunState::Done);
        Ok(outcome)
    }
}

fn join_families(families: &[ModelFamily]) -> String {
    families
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn record_failure(
    failures: &mut Vec<FamilyFailure>,
    warnings: &mut Vec<String>,
    family: ModelFamily,
    reason: &str,
) {
    warn!(%family, error = reason, "family failed to fit");
    warnings.push(format!("{family} failed to fit: {reason}"));
    failures.push(FamilyFailure {
        family,
        reason: reason.to_string(),
    });
}

/// A family that failed every outer iteration is a failure; one that failed
/// only some of them gets a warning.
fn record_nested_failures(
    summary: &NestedSummary,
    failures: &mut Vec<FamilyFailure>,
    warnings: &mut Vec<String>,
) {
    for (family, row) in summary.families.iter().zip(&summary.errors) {
        let failed: Vec<&str> = row.iter().flatten().map(String::as_str).collect();
        let Some(first) = failed.first() else { continue };
        if failed.len() == row.len() {
            record_failure(failures, warnings, *family, first);
        } else {
            let line = format!(
                "{family} failed in {} of {} outer iterations: {first}",
                failed.len(),
                row.len()
            );
            warn!("{line}");
            warnings.push(line);
        }
    }
}

/// Un-standardized predictions and errors for the winner, aligned past its
/// offset, plus residual diagnostics on the test rows.
fn post_fit(
    winner: &FittingResult,
    prepared: &Prepared,
    train: &Dataset,
    test: Option<&Dataset>,
    diagnose: impl FnOnce(&[f64]) -> Option<crate::domain::ResidualReport>,
) -> PostFitStats {
    let offset = winner.offset;
    let y_train = &train.y.as_slice()[offset.min(train.n_rows())..];
    let y_test_full = test.unwrap_or(train).y.as_slice();
    let y_test = &y_test_full[offset.min(y_test_full.len())..];

    let yhat_train = prepared.y_scaler.inverse_values(&winner.yhat_train);
    let yhat_test = prepared.y_scaler.inverse_values(&winner.yhat_test);
    let mse_train = mse(y_train, &yhat_train);
    let mse_test = mse(y_test, &yhat_test);

    let residuals: Vec<f64> = y_test.iter().zip(&yhat_test).map(|(a, p)| a - p).collect();
    let report = diagnose(&residuals);

    PostFitStats {
        yhat_train_nontrans_mean: mean(&yhat_train),
        yhat_train_nontrans_stdev: sample_stdev(&yhat_train),
        mse_train_nontrans: mse_train,
        rmse_train_nontrans: mse_train.sqrt(),
        yhat_train_nontrans: yhat_train,
        yhat_test_nontrans_mean: mean(&yhat_test),
        yhat_test_nontrans_stdev: sample_stdev(&yhat_test),
        mse_test_nontrans: mse_test,
        rmse_test_nontrans: mse_test.sqrt(),
        yhat_test_nontrans: yhat_test,
        residuals: report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{SyntheticKind, generate};
    use nalgebra::{DMatrix, DVector};

    struct Answer(bool, bool);

    impl DatasetCharacterizer for Answer {
        fn nonlinearity(
            &self,
            _: &DMatrix<f64>,
            _: &DVector<f64>,
            _: &RunConfig,
        ) -> Result<bool, AppError> {
            Ok(self.0)
        }
        fn collinearity(&self, _: &DMatrix<f64>, _: &RunConfig) -> Result<bool, AppError> {
            Ok(self.1)
        }
        fn dynamic_nonlinearity(
            &self,
            _: &DMatrix<f64>,
            _: &DVector<f64>,
            _: &RunConfig,
        ) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    struct Broken;

    impl DatasetCharacterizer for Broken {
        fn nonlinearity(
            &self,
            _: &DMatrix<f64>,
            _: &DVector<f64>,
            _: &RunConfig,
        ) -> Result<bool, AppError> {
            Err(AppError::fitting("singular design"))
        }
        fn collinearity(&self, _: &DMatrix<f64>, _: &RunConfig) -> Result<bool, AppError> {
            Ok(false)
        }
        fn dynamic_nonlinearity(
            &self,
            _: &DMatrix<f64>,
            _: &DVector<f64>,
            _: &RunConfig,
        ) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    fn linear() -> Dataset {
        generate(SyntheticKind::Linear, 60, 2).unwrap()
    }

    #[test]
    fn unknown_family_names_are_dropped_with_a_warning() {
        let cfg = RunConfig {
            model_name: Some(vec!["ridge".into(), "lasso".into()]),
            ..RunConfig::default()
        };
        let plan = Orchestrator::default().plan(&linear(), &cfg).unwrap();
        assert_eq!(plan.families, vec![ModelFamily::Ridge]);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn no_valid_family_is_a_configuration_error() {
        let cfg = RunConfig {
            model_name: Some(vec!["lasso".into()]),
            ..RunConfig::default()
        };
        let err = Orchestrator::default().plan(&linear(), &cfg).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unknown_cv_method_is_a_configuration_error() {
        let cfg = RunConfig {
            cv_method: Some("leave-one-out".into()),
            ..RunConfig::default()
        };
        assert_eq!(Orchestrator::default().plan(&linear(), &cfg).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn group_strategy_without_groups_is_rejected() {
        let cfg = RunConfig {
            cv_method: Some("GroupKFold".into()),
            ..RunConfig::default()
        };
        assert_eq!(Orchestrator::default().plan(&linear(), &cfg).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn injected_characterizer_drives_family_choice() {
        let orchestrator =
            Orchestrator::default().with_characterizer(Box::new(Answer(false, true)));
        let cfg = RunConfig {
            spectral_data: true,
            ..RunConfig::default()
        };
        let plan = orchestrator.plan(&linear(), &cfg).unwrap();
        assert_eq!(plan.families, vec![ModelFamily::Ridge, ModelFamily::PartialLeastSquares]);
        assert_eq!(plan.strategy, Some(CvStrategy::RepeatedKFold));
        assert_eq!(plan.rationale.len(), 2);
    }

    #[test]
    fn characterization_failure_only_blocks_automatic_family_choice() {
        let orchestrator = Orchestrator::default().with_characterizer(Box::new(Broken));
        let err = orchestrator.plan(&linear(), &RunConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 4);

        let cfg = RunConfig {
            model_name: Some(vec!["PLS".into()]),
            ..RunConfig::default()
        };
        let plan = orchestrator.plan(&linear(), &cfg).unwrap();
        assert_eq!(plan.families, vec![ModelFamily::PartialLeastSquares]);
        assert!(plan.warnings[0].starts_with("Characterization failed"));
    }

    #[test]
    fn nested_failures_reach_the_outcome() {
        let cfg = RunConfig {
            nested_cv: true,
            model_name: Some(vec!["RR".into(), "DALVEN".into()]),
            lag: vec![50],
            num_outer: 3,
            nr: 2,
            alpha_num: 4,
            ..RunConfig::default()
        };
        let outcome = Orchestrator::default().run(&linear(), None, &cfg).unwrap();
        let nested = outcome.nested.as_ref().unwrap();
        assert_eq!(outcome.selected, ModelFamily::Ridge);
        assert!(nested.mse[1].iter().all(|v| v.is_nan()));
        assert!(nested.errors[1].iter().all(|e| e.is_some()));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].family, ModelFamily::SparseNonlinearDynamic);
        assert!(
            outcome
                .warnings
                .iter()
                .any(|w| w.contains("sparse-nonlinear-dynamic failed to fit"))
        );
    }

    #[test]
    fn partial_nested_failures_only_warn() {
        let summary = NestedSummary {
            families: vec![ModelFamily::Ridge, ModelFamily::PartialLeastSquares],
            outer_labels: vec!["split-1".into(), "split-2".into()],
            mse: vec![vec![1.0, f64::NAN], vec![2.0, 2.5]],
            mean_mse: vec![1.0, 2.25],
            inner_params: vec![vec![None; 2]; 2],
            errors: vec![vec![None, Some("singular".into())], vec![None, None]],
            selected: ModelFamily::Ridge,
        };
        let (mut failures, mut warnings) = (Vec::new(), Vec::new());
        record_nested_failures(&summary, &mut failures, &mut warnings);
        assert!(failures.is_empty());
        assert_eq!(
            warnings,
            vec!["ridge failed in 1 of 2 outer iterations: singular".to_string()]
        );
    }

    #[test]
    fn failed_families_are_recorded_and_the_rest_compete() {
        let cfg = RunConfig {
            model_name: Some(vec!["ols".into(), "dalven".into()]),
            cv_method: Some("single_ordered".into()),
            lag: vec![50],
            ..RunConfig::default()
        };
        let outcome = Orchestrator::default().run(&linear(), None, &cfg).unwrap();
        assert_eq!(outcome.selected, ModelFamily::Ols);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].family, ModelFamily::SparseNonlinearDynamic);
        let stats = outcome.winner().unwrap().post_fit.as_ref().unwrap();
        assert_eq!(stats.yhat_test_nontrans.len(), 60);
        assert!(stats.residuals.is_some());
    }
}
