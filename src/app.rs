//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - loads `.env` and installs the log subscriber
//! - parses CLI arguments into a `RunConfig`
//! - runs the selection pipeline or one of the helper commands
//! - prints reports and plots

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::cli::{Command, RunArgs, ShowArgs, SynthArgs};
use crate::domain::RunConfig;
use crate::error::AppError;

pub mod pipeline;

/// Environment variable naming the default results directory.
pub const RESULTS_DIR_ENV: &str = "SPA_RESULTS_DIR";

/// Entry point for the `spa` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Plan(args) => handle_plan(args),
        Command::Show(args) => handle_show(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn init_logging() {
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_process_analytics=info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let inputs = pipeline::load_inputs(&args)?;
    let outcome = pipeline::run_selection(&inputs, &config)?;

    println!("{}", crate::report::format_outcome(&outcome));
    if let (Some(nested), true) = (&outcome.nested, config.plot) {
        println!("{}", crate::plot::render_nested_distribution(nested));
    }
    if let Some(dir) = &config.output_dir {
        let paths = crate::io::export::results_paths(dir, &outcome.created_at);
        println!(
            "Results saved to {} and {}",
            paths.binary.display(),
            paths.json.display()
        );
    }
    Ok(())
}

fn handle_plan(args: RunArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let inputs = pipeline::load_inputs(&args)?;
    let plan = pipeline::plan_selection(&inputs, &config)?;
    println!("{}", crate::report::format_plan(&plan));
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let outcome = crate::io::export::read_outcome_binary(&args.results)?;
    println!("{}", crate::report::format_outcome(&outcome));
    if let Some(nested) = &outcome.nested {
        println!("{}", crate::plot::render_nested_distribution(nested));
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let dataset = crate::data::sample::generate(args.kind, args.rows, args.seed)?;
    crate::io::export::write_dataset_csv(&args.out, &dataset)?;
    info!(
        path = %args.out.display(),
        rows = dataset.n_rows(),
        kind = ?args.kind,
        "synthetic data written"
    );

    if let Some(path) = &args.groups_out {
        let groups = dataset.groups.as_ref().ok_or_else(|| {
            AppError::config("--groups-out needs a grouped dataset (--kind grouped).")
        })?;
        let text: String = groups.iter().map(|g| format!("{g}\n")).collect();
        crate::io::export::write_text(path, &text)?;
    }
    Ok(())
}

/// Build the run configuration: the JSON file when `--config` is given,
/// otherwise the flags. The output directory and plot switch always come
/// from the command line / environment.
pub fn run_config_from_args(args: &RunArgs) -> Result<RunConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                AppError::io(format!("Failed to read config '{}': {e}", path.display()))
            })?;
            serde_json::from_str::<RunConfig>(&text).map_err(|e| {
                AppError::config(format!("Invalid config '{}': {e}", path.display()))
            })?
        }
        None => RunConfig {
            interpretable: args.interpretable,
            continuity: args.continuity,
            spectral_data: args.spectral_data,
            enough_data: args.enough_data,
            nested_cv: args.nested_cv,
            robust_priority: args.robust_priority,
            dynamic_model: args.dynamic_model,
            model_name: (!args.model_name.is_empty()).then(|| args.model_name.clone()),
            cv_method: args.cv_method.clone(),
            lag: args.lag.clone(),
            alpha: args.alpha,
            k_fold: args.k_fold,
            nr: args.nr,
            alpha_num: args.alpha_num,
            degree: args.degree.clone(),
            trans_type: args.trans_type,
            num_outer: args.num_outer,
            k_steps: args.k_steps,
            maxorder: args.maxorder,
            categorical: args.categorical.clone(),
            seed: args.seed,
            ..RunConfig::default()
        },
    };

    config.output_dir = if args.no_save {
        None
    } else {
        Some(
            args.output_dir
                .clone()
                .or_else(|| std::env::var_os(RESULTS_DIR_ENV).map(PathBuf::from))
                .or(config.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
        )
    };
    config.plot = config.plot && !args.no_plot;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["spa", "run", "data.csv"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(a) => a,
            _ => unreachable!(),
        }
    }

    #[test]
    fn flags_map_into_the_run_config() {
        let flags = ["--dynamic-model", "--lag", "2", "--no-save", "--cv", "bic"];
        let cfg = run_config_from_args(&args(&flags)).unwrap();
        assert!(cfg.dynamic_model);
        assert_eq!(cfg.lag, vec![2]);
        assert_eq!(cfg.cv_method.as_deref(), Some("bic"));
        assert_eq!(cfg.model_name, None);
        assert_eq!(cfg.output_dir, None);
    }

    #[test]
    fn json_config_replaces_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let json = r#"{ "interpretable": true, "model_name": ["EN"], "k_fold": 3 }"#;
        std::fs::write(&path, json).unwrap();
        let out = dir.path().join("out");
        let cfg = run_config_from_args(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
            "--no-plot",
        ]))
        .unwrap();
        assert!(cfg.interpretable);
        assert_eq!(cfg.k_fold, 3);
        assert_eq!(cfg.alpha_num, 20);
        assert_eq!(cfg.output_dir, Some(out));
        assert!(!cfg.plot);
    }

    #[test]
    fn invalid_option_ranges_are_configuration_errors() {
        let err = run_config_from_args(&args(&["--k-fold", "1", "--no-save"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
