//! Raw datasets and standardized frames.
//!
//! A [`Dataset`] is what the loader produces: raw predictors, raw response,
//! optional group labels. A [`Frame`] is what fitters consume: standardized
//! predictors and response (plus the raw predictors for families that expand
//! features themselves). [`prepare`] turns a training dataset (and an
//! optional test dataset) into frames using one scaler fit on training rows.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::math::StandardScaler;

#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
    pub feature_names: Vec<String>,
    pub response_name: String,
    pub groups: Option<Vec<i64>>,
}

impl Dataset {
    pub fn new(
        x: DMatrix<f64>,
        y: DVector<f64>,
        feature_names: Vec<String>,
        response_name: impl Into<String>,
    ) -> Result<Self, AppError> {
        if x.nrows() == 0 {
            return Err(AppError::data("Dataset has no rows."));
        }
        if x.ncols() == 0 {
            return Err(AppError::data("Dataset needs at least one predictor column."));
        }
        if x.nrows() != y.len() {
            return Err(AppError::data(format!(
                "Predictor rows ({}) and response rows ({}) differ.",
                x.nrows(),
                y.len()
            )));
        }
        if feature_names.len() != x.ncols() {
            return Err(AppError::data("Feature name count does not match predictor columns."));
        }
        Ok(Self {
            x,
            y,
            feature_names,
            response_name: response_name.into(),
            groups: None,
        })
    }

    /// Build from rows whose last column is the response.
    pub fn from_rows(rows: &[Vec<f64>], header: Option<&[String]>) -> Result<Self, AppError> {
        let Some(first) = rows.first() else {
            return Err(AppError::data("Dataset has no rows."));
        };
        let width = first.len();
        if width < 2 {
            return Err(AppError::data(
                "Data needs at least two columns (predictors, then the response last).",
            ));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(AppError::data(format!(
                "Row {} has {} columns, expected {width}.",
                bad + 1,
                rows[bad].len()
            )));
        }
        let m = width - 1;
        let x = DMatrix::from_fn(rows.len(), m, |i, j| rows[i][j]);
        let y = DVector::from_iterator(rows.len(), rows.iter().map(|r| r[m]));
        let (feature_names, response) = match header {
            Some(h) if h.len() == width => (h[..m].to_vec(), h[m].clone()),
            _ => ((1..=m).map(|j| format!("x{j}")).collect(), "y".to_string()),
        };
        Self::new(x, y, feature_names, response)
    }

    pub fn with_groups(mut self, groups: Vec<i64>) -> Result<Self, AppError> {
        if groups.len() != self.n_rows() {
            return Err(AppError::data(format!(
                "Group labels ({}) must match data rows ({}).",
                groups.len(),
                self.n_rows()
            )));
        }
        self.groups = Some(groups);
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Sorted distinct group labels (empty when ungrouped).
    pub fn unique_groups(&self) -> Vec<i64> {
        let mut out = self.groups.clone().unwrap_or_default();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn select_rows(&self, idx: &[usize]) -> Dataset {
        Dataset {
            x: self.x.select_rows(idx),
            y: self.y.select_rows(idx),
            feature_names: self.feature_names.clone(),
            response_name: self.response_name.clone(),
            groups: self
                .groups
                .as_ref()
                .map(|g| idx.iter().map(|&i| g[i]).collect()),
        }
    }
}

/// Standardized view of a partition.
#[derive(Debug, Clone)]
pub struct Frame {
    pub x: DMatrix<f64>,
    pub x_raw: DMatrix<f64>,
    pub y: DVector<f64>,
    pub groups: Option<Vec<i64>>,
}

impl Frame {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn rows(&self, idx: &[usize]) -> Frame {
        Frame {
            x: self.x.select_rows(idx),
            x_raw: self.x_raw.select_rows(idx),
            y: self.y.select_rows(idx),
            groups: self
                .groups
                .as_ref()
                .map(|g| idx.iter().map(|&i| g[i]).collect()),
        }
    }
}

/// Train/test frames sharing one training-fit transform.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub train: Frame,
    pub test: Frame,
    pub x_scaler: StandardScaler,
    pub y_scaler: StandardScaler,
    pub feature_names: Vec<String>,
    pub response_name: String,
    /// No separate test set was supplied; `test` mirrors `train`.
    pub test_is_train: bool,
}

pub fn prepare(train: &Dataset, test: Option<&Dataset>) -> Result<Prepared, AppError> {
    if let Some(t) = test {
        if t.n_features() != train.n_features() {
            return Err(AppError::data(format!(
                "Test data has {} predictors, training data has {}.",
                t.n_features(),
                train.n_features()
            )));
        }
    }

    let x_scaler = StandardScaler::fit(&train.x)?;
    let y_scaler = StandardScaler::fit_vector(&train.y)?;

    let frame_of = |ds: &Dataset| Frame {
        x: x_scaler.transform(&ds.x),
        x_raw: ds.x.clone(),
        y: y_scaler.transform_vector(&ds.y),
        groups: ds.groups.clone(),
    };

    let train_frame = frame_of(train);
    let test_frame = match test {
        Some(t) => frame_of(t),
        None => train_frame.clone(),
    };

    Ok(Prepared {
        train: train_frame,
        test: test_frame,
        feature_names: train.feature_names.clone(),
        response_name: train.response_name.clone(),
        x_scaler,
        y_scaler,
        test_is_train: test.is_none(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Dataset {
        let rows = vec![
            vec![1.0, 2.0, 3.0],
            vec![2.0, 4.0, 5.0],
            vec![3.0, 6.0, 8.0],
        ];
        Dataset::from_rows(&rows, None).unwrap()
    }

    #[test]
    fn last_column_is_the_response() {
        let ds = small();
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.y.as_slice(), &[3.0, 5.0, 8.0]);
        assert_eq!(ds.feature_names, vec!["x1", "x2"]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(Dataset::from_rows(&rows, None).is_err());
    }

    #[test]
    fn test_frame_uses_training_scaler() {
        let train = small();
        let test = train.select_rows(&[2]);
        let prepared = prepare(&train, Some(&test)).unwrap();
        assert!((prepared.test.y[0] - prepared.train.y[2]).abs() < 1e-12);
        assert!(!prepared.test_is_train);
    }

    #[test]
    fn missing_test_set_mirrors_training() {
        let prepared = prepare(&small(), None).unwrap();
        assert!(prepared.test_is_train);
        assert_eq!(prepared.test.y, prepared.train.y);
    }

    #[test]
    fn group_labels_follow_row_selection() {
        let ds = small().with_groups(vec![7, 8, 9]).unwrap();
        assert_eq!(ds.select_rows(&[2, 0]).groups, Some(vec![9, 7]));
        assert_eq!(ds.unique_groups(), vec![7, 8, 9]);
    }
}
