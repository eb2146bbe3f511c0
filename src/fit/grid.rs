//! Hyperparameter grid construction.
//!
//! Grids are plain ordered lists of [`HyperParams`]. Order matters: the
//! cross-validation protocol breaks score ties by the lowest index, so every
//! family lists its simplest / most regularized points first.

use crate::domain::{HyperParams, ParamValue};
use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
///
/// A single step yields `[max]`.
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max >= min) {
        return Err(AppError::config(format!(
            "Invalid grid range: min={min}, max={max} (must be finite, >0, and max>=min)."
        )));
    }
    if steps == 0 {
        return Err(AppError::config("Grid steps must be >= 1."));
    }
    if steps == 1 || max == min {
        return Ok(vec![max]);
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// Penalty path from `alpha_max` down to `alpha_max * ratio`, largest first.
pub fn descending_path(alpha_max: f64, ratio: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    let top = if alpha_max.is_finite() && alpha_max > 0.0 {
        alpha_max
    } else {
        1.0
    };
    let mut path = log_space(top * ratio, top, steps)?;
    path.reverse();
    Ok(path)
}

/// Cartesian product of named axes; the first axis varies slowest.
pub fn cartesian(axes: &[(&str, Vec<ParamValue>)]) -> Vec<HyperParams> {
    let mut out = vec![HyperParams::new()];
    for (name, values) in axes {
        let mut next = Vec::with_capacity(out.len() * values.len());
        for point in &out {
            for value in values {
                next.push(point.clone().with(name, value.clone()));
            }
        }
        out = next;
    }
    out
}

pub fn floats(values: &[f64]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Float(*v)).collect()
}

pub fn ints(values: &[usize]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Int(*v as i64)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert!((v[0] - 0.1).abs() < 1e-12);
        assert!((v[v.len() - 1] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn descending_path_starts_at_max() {
        let path = descending_path(2.0, 1e-3, 4).unwrap();
        assert!((path[0] - 2.0).abs() < 1e-12);
        assert!(path.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn cartesian_varies_last_axis_fastest() {
        let grid = cartesian(&[("a", ints(&[1, 2])), ("b", floats(&[0.5, 0.25]))]);
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[1].int("a").unwrap(), 1);
        assert_eq!(grid[1].float("b").unwrap(), 0.25);
        assert_eq!(grid[2].int("a").unwrap(), 2);
    }
}
