//! Result persistence.
//!
//! A finished run is written twice, named by its timestamp:
//!
//! - `SPA_results_<ts>.bin`: bincode, the whole outcome including fitted
//!   artifacts (reloadable with [`read_outcome_binary`])
//! - `SPA_results_<ts>.json`: pretty JSON with every `artifact` field removed

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::data::Dataset;
use crate::domain::SelectionOutcome;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPaths {
    pub binary: PathBuf,
    pub json: PathBuf,
}

pub fn results_paths(dir: &Path, created_at: &str) -> SavedPaths {
    SavedPaths {
        binary: dir.join(format!("SPA_results_{created_at}.bin")),
        json: dir.join(format!("SPA_results_{created_at}.json")),
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::io(format!("Failed to create directory '{}': {e}", parent.display()))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

/// Outcome as JSON with fitted artifacts stripped.
pub fn outcome_json(outcome: &SelectionOutcome) -> Result<Value, AppError> {
    let mut value = serde_json::to_value(outcome)
        .map_err(|e| AppError::io(format!("Failed to encode results as JSON: {e}")))?;
    strip_key(&mut value, "artifact");
    Ok(value)
}

fn strip_key(value: &mut Value, key: &str) {
    match value {
        Value::Object(map) => {
            map.remove(key);
            map.values_mut().for_each(|v| strip_key(v, key));
        }
        Value::Array(items) => items.iter_mut().for_each(|v| strip_key(v, key)),
        _ => {}
    }
}

pub fn write_outcome(dir: &Path, outcome: &SelectionOutcome) -> Result<SavedPaths, AppError> {
    let paths = results_paths(dir, &outcome.created_at);

    let mut writer = create(&paths.binary)?;
    bincode::serialize_into(&mut writer, outcome)
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", paths.binary.display())))?;
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", paths.binary.display())))?;

    let json = outcome_json(outcome)?;
    let mut writer = create(&paths.json)?;
    serde_json::to_writer_pretty(&mut writer, &json)
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", paths.json.display())))?;
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", paths.json.display())))?;

    Ok(paths)
}

pub fn read_outcome_binary(path: &Path) -> Result<SelectionOutcome, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open '{}': {e}", path.display())))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
        AppError::data(format!("'{}' is not a results file: {e}", path.display()))
    })
}

pub fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    let mut writer = create(path)?;
    writer
        .write_all(text.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))
}

/// Write a dataset as CSV with a header; the response is the last column.
pub fn write_dataset_csv(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(create(path)?);
    let io_err = |e: csv::Error| AppError::io(format!("Failed to write '{}': {e}", path.display()));

    let mut header = dataset.feature_names.clone();
    header.push(dataset.response_name.clone());
    writer.write_record(&header).map_err(io_err)?;
    for i in 0..dataset.n_rows() {
        let mut record: Vec<String> = dataset.x.row(i).iter().map(|v| format!("{v}")).collect();
        record.push(format!("{}", dataset.y[i]));
        writer.write_record(&record).map_err(io_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{SyntheticKind, generate};
    use crate::domain::{ModelFamily, RunConfig};
    use crate::orchestrator::Orchestrator;
    use serde_json::json;

    #[test]
    fn artifacts_are_stripped_at_every_depth() {
        let mut v = json!({
            "selected": "ridge",
            "results": { "ridge": { "artifact": { "Linear": {} }, "mse_test": 0.1 } },
            "list": [ { "artifact": 1, "keep": 2 } ]
        });
        strip_key(&mut v, "artifact");
        assert_eq!(
            v,
            json!({
                "selected": "ridge",
                "results": { "ridge": { "mse_test": 0.1 } },
                "list": [ { "keep": 2 } ]
            })
        );
    }

    #[test]
    fn paths_carry_the_timestamp() {
        let p = results_paths(Path::new("out"), "2024-01-02-03-04-05");
        assert_eq!(p.binary, Path::new("out/SPA_results_2024-01-02-03-04-05.bin"));
        assert_eq!(p.json, Path::new("out/SPA_results_2024-01-02-03-04-05.json"));
    }

    #[test]
    fn dataset_csv_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.csv");
        let ds = generate(SyntheticKind::Linear, 12, 1).unwrap();
        write_dataset_csv(&path, &ds).unwrap();
        let back = crate::io::ingest::load_dataset(&path).unwrap();
        assert_eq!(back.feature_names, ds.feature_names);
        assert!((back.y[3] - ds.y[3]).abs() < 1e-12);
    }

    #[test]
    fn saved_outcome_reloads_from_the_binary_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            model_name: Some(vec!["OLS".into(), "RR".into()]),
            cv_method: Some("KFold".into()),
            alpha_num: 3,
            output_dir: Some(dir.path().to_path_buf()),
            ..RunConfig::default()
        };
        let train = generate(SyntheticKind::Linear, 40, 8).unwrap();
        let outcome = Orchestrator::default().run(&train, None, &cfg).unwrap();

        let paths = results_paths(dir.path(), &outcome.created_at);
        let back = read_outcome_binary(&paths.binary).unwrap();
        assert_eq!(back.selected, outcome.selected);
        assert_eq!(back.created_at, outcome.created_at);
        assert_eq!(back.candidates, vec![ModelFamily::Ols, ModelFamily::Ridge]);
        let (a, b) = (back.winner().unwrap(), outcome.winner().unwrap());
        assert_eq!(a.hyperparams, b.hyperparams);
        assert_eq!(a.yhat_test, b.yhat_test);
        let frames = crate::data::prepare(&train, None).unwrap();
        assert_eq!(a.artifact.predict(&frames.train).unwrap(), b.yhat_train);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert!(!json.to_string().contains("\"artifact\""));
    }
}
