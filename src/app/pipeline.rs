//! Shared run pipeline used by `spa run` and `spa plan`.
//!
//! Keeps the core workflow in one place:
//! load data (+ test set, + groups) -> characterize -> select -> fit -> diagnose

use crate::cli::RunArgs;
use crate::data::Dataset;
use crate::domain::{RunConfig, SelectionOutcome};
use crate::error::AppError;
use crate::io::ingest::{load_dataset, load_groups};
use crate::orchestrator::{Orchestrator, RunPlan};

/// Loaded training data and optional test data.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub train: Dataset,
    pub test: Option<Dataset>,
}

pub fn load_inputs(args: &RunArgs) -> Result<RunInputs, AppError> {
    let mut train = load_dataset(&args.data)?;
    if let Some(path) = &args.groups {
        let groups = load_groups(path, train.n_rows())?;
        train = train.with_groups(groups)?;
    }
    let test = args.test.as_deref().map(load_dataset).transpose()?;
    Ok(RunInputs { train, test })
}

pub fn plan_selection(inputs: &RunInputs, config: &RunConfig) -> Result<RunPlan, AppError> {
    Orchestrator::default().plan(&inputs.train, config)
}

pub fn run_selection(inputs: &RunInputs, config: &RunConfig) -> Result<SelectionOutcome, AppError> {
    Orchestrator::default().run(&inputs.train, inputs.test.as_ref(), config)
}
