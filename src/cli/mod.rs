//! Command-line parsing for `spa`.
//!
//! Argument parsing and command dispatch stay separate from the selection
//! engine; `app` maps these structs into a `RunConfig`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::sample::SyntheticKind;
use crate::domain::TransformKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "spa",
    version,
    about = "Smart Process Analytics: automated regression model selection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Characterize the data, fit the selected families, pick a winner and save results.
    Run(RunArgs),
    /// Characterize the data and print the family / CV-strategy decision without fitting.
    Plan(RunArgs),
    /// Print the summary of a saved binary results file.
    Show(ShowArgs),
    /// Write a synthetic dataset with known structure.
    Synth(SynthArgs),
}

/// Data inputs and run options shared by `run` and `plan`.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Training data (.csv, .txt, .tsv, .xls, .xlsx); last column is the response.
    #[arg(value_name = "DATA")]
    pub data: PathBuf,

    /// Separate test data (same columns). Without it the training data is reused.
    #[arg(long, value_name = "FILE")]
    pub test: Option<PathBuf>,

    /// One group label per training row; enables grouped CV variants.
    #[arg(long, value_name = "FILE")]
    pub groups: Option<PathBuf>,

    /// JSON run configuration. When given, it replaces the option flags below.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Restrict candidates to sparse/interpretable families.
    #[arg(long)]
    pub interpretable: bool,

    /// Exclude discontinuous families (random forest).
    #[arg(long)]
    pub continuity: bool,

    /// Collinear spectral data: ridge and PLS only.
    #[arg(long)]
    pub spectral_data: bool,

    /// Enough data for a single validation split.
    #[arg(long)]
    pub enough_data: bool,

    /// Nested cross-validation across outer splits.
    #[arg(long)]
    pub nested_cv: bool,

    /// Prefer parsimony: BIC for dynamic data, one-standard-error grid choice.
    #[arg(long)]
    pub robust_priority: bool,

    /// Dynamic (time-ordered) data.
    #[arg(long)]
    pub dynamic_model: bool,

    /// Explicit model families (comma separated), e.g. `ridge,pls`.
    #[arg(long = "model", value_delimiter = ',')]
    pub model_name: Vec<String>,

    /// Explicit CV strategy, e.g. `kfold`, `re_kfold`, `timeseries`, `bic`.
    #[arg(long = "cv")]
    pub cv_method: Option<String>,

    /// Lags for the dynamic tests and lagged families (comma separated).
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pub lag: Vec<usize>,

    /// Significance level for characterization and residual tests.
    #[arg(long, default_value_t = 0.01)]
    pub alpha: f64,

    /// Folds per k-fold split (and 1/validation share of single splits).
    #[arg(long, default_value_t = 5)]
    pub k_fold: usize,

    /// Repetitions for repeated k-fold / Monte Carlo / group shuffle split.
    #[arg(long, default_value_t = 10)]
    pub nr: usize,

    /// Penalty path length for penalized families.
    #[arg(long, default_value_t = 20)]
    pub alpha_num: usize,

    /// Polynomial degrees searched by sparse nonlinear families (comma separated).
    #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
    pub degree: Vec<usize>,

    /// Nonlinear transforms for sparse nonlinear families.
    #[arg(long, value_enum, default_value_t = TransformKind::Auto)]
    pub trans_type: TransformKind,

    /// Outer iterations for nested CV on ungrouped data.
    #[arg(long, default_value_t = 10)]
    pub num_outer: usize,

    /// Prediction horizon for state-space models.
    #[arg(long, default_value_t = 1)]
    pub k_steps: usize,

    /// Largest state-space order tried.
    #[arg(long, default_value_t = 10)]
    pub maxorder: usize,

    /// Per-predictor categorical flags (comma separated true/false).
    #[arg(long, value_delimiter = ',')]
    pub categorical: Vec<bool>,

    /// Random seed for splits and randomized models.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Results directory (defaults to $SPA_RESULTS_DIR, then the current directory).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Do not write result files.
    #[arg(long)]
    pub no_save: bool,

    /// Do not print or save the nested CV distribution plot.
    #[arg(long)]
    pub no_plot: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Binary results file written by `spa run`.
    #[arg(value_name = "RESULTS")]
    pub results: PathBuf,
}

#[derive(Debug, Args)]
pub struct SynthArgs {
    /// Output CSV path.
    #[arg(value_name = "OUT")]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = SyntheticKind::Linear)]
    pub kind: SyntheticKind,

    #[arg(long, default_value_t = 200)]
    pub rows: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Also write a group-label file (grouped kind only).
    #[arg(long, value_name = "FILE")]
    pub groups_out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn list_flags_split_on_commas() {
        let cli = Cli::parse_from(["spa", "run", "d.csv", "--model", "ridge,pls", "--lag", "1,2"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.model_name, vec!["ridge", "pls"]);
        assert_eq!(args.lag, vec![1, 2]);
        assert_eq!(args.degree, vec![1, 2, 3]);
    }
}
