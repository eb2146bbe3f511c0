//! Shared domain types.
//!
//! These types are kept serializable so a finished run can be:
//!
//! - inspected in-memory by the caller
//! - persisted in full (binary) or stripped (JSON)
//! - reloaded later for reporting

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::ModelArtifact;

/// A named class of regression model with its own hyperparameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    #[serde(rename = "plain-regression")]
    Ols,
    ElasticNet,
    SparseNonlinearStatic,
    SparseNonlinearDynamic,
    SparseNonlinearDynamicFull,
    SupportVector,
    RandomForest,
    PartialLeastSquares,
    Ridge,
    SparsePartialLeastSquares,
    RecurrentSequence,
    StateSpace,
}

/// How the orchestrator drives a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FittingPathway {
    /// Fitted once on the full training set, no validation score.
    Direct,
    /// Static grid search through the cross-validation protocol.
    StaticGrid,
    /// Lagged grid search through the cross-validation protocol.
    DynamicGrid,
    /// Family-specific driver outside the generic grid contract.
    Driver,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 12] = [
        ModelFamily::Ols,
        ModelFamily::ElasticNet,
        ModelFamily::SparseNonlinearStatic,
        ModelFamily::SparseNonlinearDynamic,
        ModelFamily::SparseNonlinearDynamicFull,
        ModelFamily::SupportVector,
        ModelFamily::RandomForest,
        ModelFamily::PartialLeastSquares,
        ModelFamily::Ridge,
        ModelFamily::SparsePartialLeastSquares,
        ModelFamily::RecurrentSequence,
        ModelFamily::StateSpace,
    ];

    /// Canonical name used in output and persisted records.
    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::Ols => "plain-regression",
            ModelFamily::ElasticNet => "elastic-net",
            ModelFamily::SparseNonlinearStatic => "sparse-nonlinear-static",
            ModelFamily::SparseNonlinearDynamic => "sparse-nonlinear-dynamic",
            ModelFamily::SparseNonlinearDynamicFull => "sparse-nonlinear-dynamic-full",
            ModelFamily::SupportVector => "support-vector",
            ModelFamily::RandomForest => "random-forest",
            ModelFamily::PartialLeastSquares => "partial-least-squares",
            ModelFamily::Ridge => "ridge",
            ModelFamily::SparsePartialLeastSquares => "sparse-partial-least-squares",
            ModelFamily::RecurrentSequence => "recurrent-sequence",
            ModelFamily::StateSpace => "state-space",
        }
    }

    /// Short label for tables.
    pub fn short_name(self) -> &'static str {
        match self {
            ModelFamily::Ols => "OLS",
            ModelFamily::ElasticNet => "EN",
            ModelFamily::SparseNonlinearStatic => "ALVEN",
            ModelFamily::SparseNonlinearDynamic => "DALVEN",
            ModelFamily::SparseNonlinearDynamicFull => "DALVEN-F",
            ModelFamily::SupportVector => "SVR",
            ModelFamily::RandomForest => "RF",
            ModelFamily::PartialLeastSquares => "PLS",
            ModelFamily::Ridge => "RR",
            ModelFamily::SparsePartialLeastSquares => "SPLS",
            ModelFamily::RecurrentSequence => "RNN",
            ModelFamily::StateSpace => "SS",
        }
    }

    /// Parse a canonical name or a short alias (case-insensitive).
    pub fn parse(raw: &str) -> Option<ModelFamily> {
        let key = raw.trim().to_ascii_lowercase().replace('_', "-");
        let family = match key.as_str() {
            "plain-regression" | "ols" => ModelFamily::Ols,
            "elastic-net" | "en" => ModelFamily::ElasticNet,
            "sparse-nonlinear-static" | "alven" => ModelFamily::SparseNonlinearStatic,
            "sparse-nonlinear-dynamic" | "dalven" => ModelFamily::SparseNonlinearDynamic,
            "sparse-nonlinear-dynamic-full" | "dalven-full-nonlinear" => {
                ModelFamily::SparseNonlinearDynamicFull
            }
            "support-vector" | "svr" => ModelFamily::SupportVector,
            "random-forest" | "rf" => ModelFamily::RandomForest,
            "partial-least-squares" | "pls" => ModelFamily::PartialLeastSquares,
            "ridge" | "rr" => ModelFamily::Ridge,
            "sparse-partial-least-squares" | "spls" => ModelFamily::SparsePartialLeastSquares,
            "recurrent-sequence" | "rnn" => ModelFamily::RecurrentSequence,
            "state-space" | "ss" => ModelFamily::StateSpace,
            _ => return None,
        };
        Some(family)
    }

    pub fn pathway(self) -> FittingPathway {
        match self {
            ModelFamily::Ols => FittingPathway::Direct,
            ModelFamily::ElasticNet
            | ModelFamily::SparseNonlinearStatic
            | ModelFamily::SupportVector
            | ModelFamily::RandomForest
            | ModelFamily::PartialLeastSquares
            | ModelFamily::Ridge
            | ModelFamily::SparsePartialLeastSquares => FittingPathway::StaticGrid,
            ModelFamily::SparseNonlinearDynamic | ModelFamily::SparseNonlinearDynamicFull => {
                FittingPathway::DynamicGrid
            }
            ModelFamily::RecurrentSequence | ModelFamily::StateSpace => FittingPathway::Driver,
        }
    }

    /// Whether predictions depend on lagged past rows.
    pub fn is_dynamic(self) -> bool {
        matches!(
            self.pathway(),
            FittingPathway::DynamicGrid | FittingPathway::Driver
        )
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Information criteria usable in place of held-out validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationCriterion {
    Aic,
    Aicc,
    Bic,
}

impl InformationCriterion {
    /// `n ln(mse) + penalty(k)`; `None` when AICc is undefined (`n <= k + 1`).
    pub fn evaluate(self, n: usize, mse: f64, k: f64) -> Option<f64> {
        let n_f = n as f64;
        let fit = n_f * mse.max(1e-300).ln();
        let value = match self {
            InformationCriterion::Aic => fit + 2.0 * k,
            InformationCriterion::Aicc => {
                let denom = n_f - k - 1.0;
                if denom <= 0.0 {
                    return None;
                }
                fit + 2.0 * k + 2.0 * k * (k + 1.0) / denom
            }
            InformationCriterion::Bic => fit + k * n_f.ln(),
        };
        value.is_finite().then_some(value)
    }

    pub fn name(self) -> &'static str {
        match self {
            InformationCriterion::Aic => "AIC",
            InformationCriterion::Aicc => "AICc",
            InformationCriterion::Bic => "BIC",
        }
    }
}

/// Named cross-validation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CvStrategy {
    Single,
    SingleGroup,
    KFold,
    RepeatedKFold,
    GroupKFold,
    GroupShuffleSplit,
    MonteCarlo,
    SingleOrdered,
    TimeSeries,
    Aic,
    Aicc,
    Bic,
}

impl CvStrategy {
    pub fn name(self) -> &'static str {
        match self {
            CvStrategy::Single => "single",
            CvStrategy::SingleGroup => "single-group",
            CvStrategy::KFold => "k-fold",
            CvStrategy::RepeatedKFold => "repeated-k-fold",
            CvStrategy::GroupKFold => "group-k-fold",
            CvStrategy::GroupShuffleSplit => "group-shuffle-split",
            CvStrategy::MonteCarlo => "monte-carlo",
            CvStrategy::SingleOrdered => "single-ordered",
            CvStrategy::TimeSeries => "time-series",
            CvStrategy::Aic => "aic",
            CvStrategy::Aicc => "aicc",
            CvStrategy::Bic => "bic",
        }
    }

    /// Parse a canonical name or an alias (case-insensitive).
    pub fn parse(raw: &str) -> Option<CvStrategy> {
        let key = raw.trim().to_ascii_lowercase().replace('_', "-");
        let strategy = match key.as_str() {
            "single" => CvStrategy::Single,
            "single-group" => CvStrategy::SingleGroup,
            "k-fold" | "kfold" => CvStrategy::KFold,
            "repeated-k-fold" | "re-kfold" => CvStrategy::RepeatedKFold,
            "group-k-fold" | "groupkfold" => CvStrategy::GroupKFold,
            "group-shuffle-split" | "groupshufflesplit" => CvStrategy::GroupShuffleSplit,
            "monte-carlo" | "mc" => CvStrategy::MonteCarlo,
            "single-ordered" => CvStrategy::SingleOrdered,
            "time-series" | "timeseries" => CvStrategy::TimeSeries,
            "aic" => CvStrategy::Aic,
            "aicc" => CvStrategy::Aicc,
            "bic" => CvStrategy::Bic,
            _ => return None,
        };
        Some(strategy)
    }

    pub fn information_criterion(self) -> Option<InformationCriterion> {
        match self {
            CvStrategy::Aic => Some(InformationCriterion::Aic),
            CvStrategy::Aicc => Some(InformationCriterion::Aicc),
            CvStrategy::Bic => Some(InformationCriterion::Bic),
            _ => None,
        }
    }

    pub fn requires_groups(self) -> bool {
        matches!(
            self,
            CvStrategy::SingleGroup | CvStrategy::GroupKFold | CvStrategy::GroupShuffleSplit
        )
    }

    /// Strategies that respect row order (safe for lagged models).
    pub fn preserves_order(self) -> bool {
        matches!(self, CvStrategy::SingleOrdered | CvStrategy::TimeSeries)
            || self.information_criterion().is_some()
    }

    /// Strategies that produce exactly one train/validation split.
    pub fn is_single_split(self) -> bool {
        matches!(
            self,
            CvStrategy::Single | CvStrategy::SingleGroup | CvStrategy::SingleOrdered
        )
    }
}

impl std::fmt::Display for CvStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which nonlinear transforms the sparse-nonlinear families may generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Powers, interactions, logs, square roots and inverses.
    Auto,
    /// Powers and interactions only.
    Poly,
}

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Text(String),
    Sizes(Vec<usize>),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{v:.6}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
            ParamValue::Sizes(v) => write!(f, "{v:?}"),
        }
    }
}

/// One point of a hyperparameter grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    values: BTreeMap<String, ParamValue>,
}

impl HyperParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn with_float(self, name: &str, value: f64) -> Self {
        self.with(name, ParamValue::Float(value))
    }

    pub fn with_int(self, name: &str, value: i64) -> Self {
        self.with(name, ParamValue::Int(value))
    }

    pub fn with_text(self, name: &str, value: &str) -> Self {
        self.with(name, ParamValue::Text(value.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn float(&self, name: &str) -> Result<f64, AppError> {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            _ => Err(missing_param(name)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, AppError> {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => Ok(*v),
            _ => Err(missing_param(name)),
        }
    }

    pub fn usize(&self, name: &str) -> Result<usize, AppError> {
        let v = self.int(name)?;
        usize::try_from(v)
            .map_err(|_| AppError::config(format!("Hyperparameter '{name}' must be >= 0.")))
    }

    pub fn text(&self, name: &str) -> Result<&str, AppError> {
        match self.values.get(name) {
            Some(ParamValue::Text(v)) => Ok(v),
            _ => Err(missing_param(name)),
        }
    }

    pub fn sizes(&self, name: &str) -> Result<&[usize], AppError> {
        match self.values.get(name) {
            Some(ParamValue::Sizes(v)) => Ok(v),
            _ => Err(missing_param(name)),
        }
    }
}

fn missing_param(name: &str) -> AppError {
    AppError::config(format!("Missing or mistyped hyperparameter '{name}'."))
}

impl std::fmt::Display for HyperParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.values.is_empty() {
            return f.write_str("-");
        }
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// A full run's configuration as understood by the orchestrator.
///
/// Derived from CLI flags or loaded from a JSON run file; missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub interpretable: bool,
    pub continuity: bool,
    pub spectral_data: bool,
    pub enough_data: bool,
    pub nested_cv: bool,
    pub robust_priority: bool,
    pub dynamic_model: bool,

    /// Explicit family names (overrides automatic selection).
    pub model_name: Option<Vec<String>>,
    /// Explicit CV strategy name (overrides automatic selection).
    pub cv_method: Option<String>,

    /// Lags assessed by the dynamic tests and searched by lagged families.
    pub lag: Vec<usize>,
    /// Significance level for the statistical tests.
    pub alpha: f64,
    /// Minimum share of linear-unexplained variance the polynomial terms must remove.
    pub nonlinearity_difference: f64,
    /// VIF above which predictors are considered collinear.
    pub vif_threshold: f64,
    /// Per-predictor categorical flags (empty means none are categorical).
    pub categorical: Vec<bool>,

    pub k_fold: usize,
    pub nr: usize,
    pub alpha_num: usize,
    pub l1_ratio: Vec<f64>,
    pub degree: Vec<usize>,
    pub trans_type: TransformKind,
    pub select_value: f64,
    pub num_outer: usize,
    pub k_steps: usize,

    pub svr_c: Vec<f64>,
    pub svr_gamma: Vec<f64>,
    pub svr_epsilon: Vec<f64>,
    pub rf_max_depth: Vec<usize>,
    pub rf_n_estimators: Vec<usize>,
    pub rf_min_samples_leaf: Vec<usize>,
    pub pls_max_components: usize,

    pub rnn_activation: Vec<String>,
    /// Units per reservoir layer, one entry per candidate architecture.
    pub rnn_layers: Option<Vec<Vec<usize>>>,
    pub rnn_cell: Vec<String>,
    pub rnn_past_steps: usize,
    pub rnn_lambda_l2_reg: f64,

    pub maxorder: usize,
    pub seed: u64,

    /// Directory for persisted results; `None` disables persistence.
    pub output_dir: Option<PathBuf>,
    /// Write the nested-CV distribution plot next to the results.
    pub plot: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            interpretable: false,
            continuity: false,
            spectral_data: false,
            enough_data: false,
            nested_cv: false,
            robust_priority: false,
            dynamic_model: false,
            model_name: None,
            cv_method: None,
            lag: vec![0],
            alpha: 0.01,
            nonlinearity_difference: 0.4,
            vif_threshold: 10.0,
            categorical: Vec::new(),
            k_fold: 5,
            nr: 10,
            alpha_num: 20,
            l1_ratio: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 0.97, 0.99],
            degree: vec![1, 2, 3],
            trans_type: TransformKind::Auto,
            select_value: 0.10,
            num_outer: 10,
            k_steps: 1,
            svr_c: vec![0.1, 1.0, 10.0, 100.0],
            svr_gamma: vec![0.1, 1.0, 10.0],
            svr_epsilon: vec![0.3, 0.1, 0.01],
            rf_max_depth: vec![2, 3, 5, 10, 20],
            rf_n_estimators: vec![10, 50, 100],
            rf_min_samples_leaf: vec![5, 2, 1],
            pls_max_components: 20,
            rnn_activation: vec!["relu".to_string()],
            rnn_layers: None,
            rnn_cell: vec!["basic".to_string()],
            rnn_past_steps: 10,
            rnn_lambda_l2_reg: 1e-3,
            maxorder: 10,
            seed: 0,
            output_dir: None,
            plot: true,
        }
    }
}

impl RunConfig {
    /// Largest requested lag, promoted to at least 1.
    pub fn max_lag(&self) -> usize {
        self.lag.iter().copied().max().unwrap_or(0).max(1)
    }

    /// Validate option ranges before any work starts.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.k_fold < 2 {
            return Err(AppError::config("k_fold must be >= 2."));
        }
        if self.nr == 0 {
            return Err(AppError::config("nr must be >= 1."));
        }
        if self.alpha_num == 0 {
            return Err(AppError::config("alpha_num must be >= 1."));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(AppError::config("alpha must be in (0, 1)."));
        }
        if self.l1_ratio.iter().any(|r| !(r.is_finite() && *r > 0.0 && *r <= 1.0)) {
            return Err(AppError::config("l1_ratio values must be in (0, 1]."));
        }
        if self.degree.is_empty() || self.degree.iter().any(|d| *d == 0 || *d > 3) {
            return Err(AppError::config("degree values must be in 1..=3."));
        }
        if self.nested_cv && self.num_outer == 0 {
            return Err(AppError::config("nested_cv requires num_outer >= 1."));
        }
        if self.dynamic_model && (self.lag.is_empty() || self.k_steps == 0) {
            return Err(AppError::config("dynamic_model requires a lag list and k_steps >= 1."));
        }
        if self.maxorder == 0 {
            return Err(AppError::config("maxorder must be >= 1."));
        }
        Ok(())
    }
}

/// Dataset properties reported by the characterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characterization {
    pub nonlinear: bool,
    pub collinear: bool,
    /// Only assessed when the static test found no nonlinearity and a dynamic model was requested.
    pub dynamic_nonlinear: Option<bool>,
}

impl Characterization {
    /// Static nonlinearity, promoted by a positive dynamic-nonlinearity result.
    pub fn effective_nonlinear(&self) -> bool {
        self.nonlinear || self.dynamic_nonlinear.unwrap_or(false)
    }
}

/// How a family's held-out quality was measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ValidationScore {
    /// Averaged held-out mean-squared error (standardized response units).
    Mse(f64),
    /// Analytic information criterion computed in-sample.
    Criterion { kind: InformationCriterion, value: f64 },
}

impl ValidationScore {
    pub fn value(&self) -> f64 {
        match self {
            ValidationScore::Mse(v) => *v,
            ValidationScore::Criterion { value, .. } => *value,
        }
    }

    /// Scores are only comparable within the same measurement.
    pub fn comparable_with(&self, other: &ValidationScore) -> bool {
        match (self, other) {
            (ValidationScore::Mse(_), ValidationScore::Mse(_)) => true,
            (
                ValidationScore::Criterion { kind: a, .. },
                ValidationScore::Criterion { kind: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for ValidationScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationScore::Mse(v) => write!(f, "MSE={v:.6}"),
            ValidationScore::Criterion { kind, value } => write!(f, "{}={value:.3}", kind.name()),
        }
    }
}

/// Family-specific extras, unified so comparison and packaging stay uniform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FamilyDetails {
    None,
    /// Linear coefficients over named features (standardized space).
    Coefficients { names: Vec<String>, values: Vec<f64> },
    /// Features retained by a sparse selection step.
    SelectedFeatures { names: Vec<String>, coefficients: Vec<f64> },
    /// Latent components (PLS family).
    Components { count: usize, active_features: usize },
    /// Tree ensemble size.
    Ensemble { trees: usize },
    /// Support vectors kept by a kernel machine.
    SupportVectors { count: usize },
    /// Reservoir architecture of a recurrent model.
    Reservoir { layers: Vec<usize> },
    /// State dimension of an identified linear system.
    StateOrder { order: usize },
}

/// Residual-analysis report for the winning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualReport {
    pub n: usize,
    /// Autocorrelation at lags `1..=acf.len()`.
    pub acf: Vec<f64>,
    pub q_stat: f64,
    pub critical: f64,
    pub dynamics_detected: bool,
}

/// Post-fit statistics in original (un-standardized) response units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostFitStats {
    pub yhat_train_nontrans: Vec<f64>,
    pub yhat_train_nontrans_mean: f64,
    pub yhat_train_nontrans_stdev: f64,
    pub mse_train_nontrans: f64,
    pub rmse_train_nontrans: f64,
    pub yhat_test_nontrans: Vec<f64>,
    pub yhat_test_nontrans_mean: f64,
    pub yhat_test_nontrans_stdev: f64,
    pub mse_test_nontrans: f64,
    pub rmse_test_nontrans: f64,
    /// `None` when too few residual rows were available.
    pub residuals: Option<ResidualReport>,
}

/// Result of fitting one family.
///
/// Predictions and errors are in standardized response units; predictions
/// start at row `offset` of the corresponding dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittingResult {
    pub family: ModelFamily,
    pub strategy: Option<CvStrategy>,
    pub hyperparams: HyperParams,
    pub artifact: ModelArtifact,
    pub details: FamilyDetails,
    pub offset: usize,
    pub yhat_train: Vec<f64>,
    pub yhat_val: Option<Vec<f64>>,
    pub yhat_test: Vec<f64>,
    pub mse_train: f64,
    pub validation: Option<ValidationScore>,
    pub mse_test: f64,
    /// Averaged validation score per grid point (`None` = failed to fit).
    pub grid_scores: Vec<Option<f64>>,
    pub post_fit: Option<PostFitStats>,
}

/// A family that was attempted but produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyFailure {
    pub family: ModelFamily,
    pub reason: String,
}

/// Per-family, per-outer-iteration MSE from nested cross-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedSummary {
    pub families: Vec<ModelFamily>,
    /// Label of each outer iteration (`"split-3"` or `"group-7"`).
    pub outer_labels: Vec<String>,
    /// `mse[family][iteration]`; NaN marks a failed fit.
    pub mse: Vec<Vec<f64>>,
    pub mean_mse: Vec<f64>,
    /// Hyperparameters chosen by the inner loop, `[family][iteration]`.
    pub inner_params: Vec<Vec<Option<HyperParams>>>,
    /// Why a fit failed, `[family][iteration]`; `None` where it succeeded.
    pub errors: Vec<Vec<Option<String>>>,
    pub selected: ModelFamily,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub selected: ModelFamily,
    pub results: BTreeMap<ModelFamily, FittingResult>,
    pub failures: Vec<FamilyFailure>,
    pub candidates: Vec<ModelFamily>,
    pub strategy: Option<CvStrategy>,
    pub characterization: Characterization,
    pub nested: Option<NestedSummary>,
    pub rationale: Vec<String>,
    pub warnings: Vec<String>,
    pub advisories: Vec<String>,
    pub created_at: String,
}

impl SelectionOutcome {
    pub fn winner(&self) -> Option<&FittingResult> {
        self.results.get(&self.selected)
    }
}
