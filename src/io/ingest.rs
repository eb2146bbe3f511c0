//! Data file loading.
//!
//! Turns a delimited text file or an Excel sheet into a [`Dataset`]:
//!
//! - **Format by extension**: `.csv`/`.tsv`/`.txt`/`.dat` as delimited text,
//!   `.xls`/`.xlsx` through calamine; anything else is a configuration error
//! - **Delimiter auto-detection**: comma, tab, semicolon, then whitespace; the
//!   first one that splits the first line into more than one column wins
//! - **Optional header**: a first row with any non-numeric field is taken as
//!   column names
//! - **Strict cells**: every data cell must parse as a finite number

use std::collections::HashMap;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use tracing::debug;

use crate::data::Dataset;
use crate::error::AppError;

/// Raw numeric table plus an optional header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Delimited,
    Excel,
}

fn detect_format(path: &Path) -> Result<FileFormat, AppError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" | "tsv" | "txt" | "dat" => Ok(FileFormat::Delimited),
        "xls" | "xlsx" | "xlsm" | "ods" => Ok(FileFormat::Excel),
        _ => Err(AppError::config(format!(
            "Unsupported data file extension for '{}' (expected .csv, .txt, .tsv, .xls or .xlsx).",
            path.display()
        ))),
    }
}

const DELIMITERS: [u8; 3] = [b',', b'\t', b';'];

/// Delimiter for `first_line`; `None` means split on whitespace.
fn detect_delimiter(first_line: &str) -> Option<u8> {
    DELIMITERS
        .into_iter()
        .find(|&d| first_line.split(d as char).count() > 1)
}

/// Read a data file into a raw table.
pub fn read_table(path: &Path) -> Result<Table, AppError> {
    match detect_format(path)? {
        FileFormat::Delimited => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| AppError::io(format!("Failed to read '{}': {e}", path.display())))?;
            parse_delimited(&text)
        }
        FileFormat::Excel => read_excel(path),
    }
}

/// Parse delimited text (see module docs for the rules).
pub fn parse_delimited(text: &str) -> Result<Table, AppError> {
    let Some(first) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Err(AppError::data("Data file is empty."));
    };
    let delimiter = detect_delimiter(first);
    debug!(delimiter = ?delimiter.map(char::from), "delimiter detected");

    let normalized;
    let (source, delim) = match delimiter {
        Some(d) => (text, d),
        None => {
            normalized = text
                .lines()
                .map(|l| l.split_whitespace().collect::<Vec<_>>().join(","))
                .collect::<Vec<_>>()
                .join("\n");
            (normalized.as_str(), b',')
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delim)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source.as_bytes());

    let mut records = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| AppError::data(format!("Failed to parse line {}: {e}", i + 1)))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    table_from_cells(records)
}

fn read_excel(path: &Path) -> Result<Table, AppError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::io(format!("Failed to open workbook '{}': {e}", path.display())))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::data(format!("Workbook '{}' has no sheets.", path.display())))?
        .map_err(|e| AppError::io(format!("Failed to read sheet of '{}': {e}", path.display())))?;

    let records = range
        .rows()
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    table_from_cells(records)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        other => other.to_string(),
    }
}

fn parse_number(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn table_from_cells(mut records: Vec<Vec<String>>) -> Result<Table, AppError> {
    if records.is_empty() {
        return Err(AppError::data("Data file has no rows."));
    }
    let header = if records[0].iter().any(|f| parse_number(f).is_none()) {
        Some(records.remove(0).into_iter().map(|h| h.trim().to_string()).collect())
    } else {
        None
    };

    let mut rows = Vec::with_capacity(records.len());
    let line_offset = if header.is_some() { 2 } else { 1 };
    for (i, record) in records.iter().enumerate() {
        let row = record
            .iter()
            .enumerate()
            .map(|(j, f)| {
                parse_number(f).ok_or_else(|| {
                    AppError::data(format!(
                        "Row {}, column {}: '{f}' is not a number.",
                        i + line_offset,
                        j + 1
                    ))
                })
            })
            .collect::<Result<Vec<f64>, AppError>>()?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(AppError::data("Data file has a header but no data rows."));
    }
    Ok(Table { header, rows })
}

/// Load a dataset whose last column is the response.
pub fn load_dataset(path: &Path) -> Result<Dataset, AppError> {
    let table = read_table(path)?;
    debug!(
        path = %path.display(),
        rows = table.rows.len(),
        header = table.header.is_some(),
        "data file read"
    );
    Dataset::from_rows(&table.rows, table.header.as_deref())
}

/// Load one group label per row.
///
/// Numeric labels are used as-is; text labels are numbered by first
/// appearance.
pub fn load_groups(path: &Path, expected_rows: usize) -> Result<Vec<i64>, AppError> {
    let text = match detect_format(path)? {
        FileFormat::Delimited => std::fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read '{}': {e}", path.display())))?,
        FileFormat::Excel => {
            let mut workbook = open_workbook_auto(path).map_err(|e| {
                AppError::io(format!("Failed to open workbook '{}': {e}", path.display()))
            })?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| AppError::data("Group workbook has no sheets."))?
                .map_err(|e| AppError::io(format!("Failed to read group sheet: {e}")))?;
            range
                .rows()
                .filter_map(|row| row.first().map(cell_text))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };
    parse_groups(&text, expected_rows)
}

pub fn parse_groups(text: &str, expected_rows: usize) -> Result<Vec<i64>, AppError> {
    let mut labels: Vec<&str> = text
        .lines()
        .map(|l| l.split([',', '\t', ';']).next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .collect();
    // A header line is dropped when it would leave exactly one label per row.
    if labels.len() == expected_rows + 1 {
        labels.remove(0);
    }
    if labels.len() != expected_rows {
        return Err(AppError::data(format!(
            "Group file has {} labels, data has {expected_rows} rows.",
            labels.len()
        )));
    }

    if labels.iter().all(|l| l.parse::<i64>().is_ok()) {
        return Ok(labels.iter().filter_map(|l| l.parse().ok()).collect());
    }
    let mut ids: HashMap<&str, i64> = HashMap::new();
    Ok(labels
        .into_iter()
        .map(|l| {
            let next = ids.len() as i64 + 1;
            *ids.entry(l).or_insert(next)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_with_header() {
        let t = parse_delimited("a,b,y\n1,2,3\n4,5,6\n").unwrap();
        assert_eq!(t.header, Some(vec!["a".into(), "b".into(), "y".into()]));
        assert_eq!(t.rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn semicolon_and_tab_are_detected() {
        assert_eq!(parse_delimited("1;2\n3;4").unwrap().rows[1], vec![3.0, 4.0]);
        assert_eq!(parse_delimited("1\t2\n3\t4").unwrap().rows[0], vec![1.0, 2.0]);
    }

    #[test]
    fn whitespace_runs_count_as_one_separator() {
        let t = parse_delimited("1   2  3\n 4 5 6\n").unwrap();
        assert_eq!(t.header, None);
        assert_eq!(t.rows[1], vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn non_numeric_cells_are_data_errors() {
        let err = parse_delimited("1,2\n3,x\n").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.message().contains("Row 2"));
    }

    #[test]
    fn unknown_extension_is_a_configuration_error() {
        let err = read_table(Path::new("data.parquet")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn text_group_labels_are_numbered_by_first_appearance() {
        assert_eq!(parse_groups("b\na\nb\nc\n", 4).unwrap(), vec![1, 2, 1, 3]);
        assert_eq!(parse_groups("group\n7\n7\n9\n", 3).unwrap(), vec![7, 7, 9]);
        assert_eq!(parse_groups("1\n2\n", 3).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn csv_file_round_trip_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        std::fs::write(&path, "x1,x2,out\n1,2,3\n2,3,5\n3,5,8\n").unwrap();
        let ds = load_dataset(&path).unwrap();
        assert_eq!(ds.response_name, "out");
        assert_eq!(ds.n_rows(), 3);
    }
}
