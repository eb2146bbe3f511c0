//! Text strip plots for nested cross-validation.
//!
//! One row per family on a shared horizontal axis:
//! - each outer iteration's score: `o`
//! - the family mean: `|` (drawn over points)
//!
//! Output is deterministic so it can be compared against golden strings and
//! written next to the results files.

use crate::domain::{ModelFamily, NestedSummary};
use crate::math::nan_mean;

pub const DEFAULT_WIDTH: usize = 60;

/// MSE and RMSE panels for a nested cross-validation summary.
pub fn render_nested_distribution(summary: &NestedSummary) -> String {
    let rmse: Vec<Vec<f64>> = summary
        .mse
        .iter()
        .map(|row| row.iter().map(|v| v.sqrt()).collect())
        .collect();
    let mut out = render_strip("MSE", &summary.families, &summary.mse, DEFAULT_WIDTH);
    out.push('\n');
    out.push_str(&render_strip("RMSE", &summary.families, &rmse, DEFAULT_WIDTH));
    out
}

pub fn render_strip(
    title: &str,
    families: &[ModelFamily],
    rows: &[Vec<f64>],
    width: usize,
) -> String {
    let width = width.max(10);
    let (lo, hi) = value_range(rows).unwrap_or((0.0, 1.0));
    let (lo, hi) = pad_range(lo, hi, 0.05);
    let label_width = families.iter().map(|f| f.short_name().len()).max().unwrap_or(0);

    let mut out = format!(
        "{title} across outer iterations: range=[{lo:.4}, {hi:.4}]\n"
    );
    for (family, row) in families.iter().zip(rows) {
        let mut track = vec!['.'; width];
        for v in row.iter().filter(|v| v.is_finite()) {
            track[map_x(*v, lo, hi, width)] = 'o';
        }
        let mean = nan_mean(row);
        if mean.is_finite() {
            track[map_x(mean, lo, hi, width)] = '|';
        }
        let failed = row.iter().filter(|v| !v.is_finite()).count();
        out.push_str(&format!(
            "{:<label_width$} {} mean={mean:.4}",
            family.short_name(),
            track.into_iter().collect::<String>()
        ));
        if failed > 0 {
            out.push_str(&format!(" failed={failed}"));
        }
        out.push('\n');
    }
    out
}

fn value_range(rows: &[Vec<f64>]) -> Option<(f64, f64)> {
    let finite = rows.iter().flatten().copied().filter(|v| v.is_finite());
    finite.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, lo: f64, hi: f64, width: usize) -> usize {
    let u = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_golden_snapshot_small() {
        let families = [ModelFamily::Ridge, ModelFamily::PartialLeastSquares];
        let rows = vec![vec![1.0, 4.0], vec![2.0, f64::NAN]];
        let txt = render_strip("MSE", &families, &rows, 11);
        let expected = concat!(
            "MSE across outer iterations: range=[0.8500, 4.1500]\n",
            "RR  o....|....o mean=2.5000\n",
            "PLS ...|....... mean=2.0000 failed=1\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn map_x_clamps_to_the_track() {
        assert_eq!(map_x(-5.0, 0.0, 1.0, 10), 0);
        assert_eq!(map_x(5.0, 0.0, 1.0, 10), 9);
    }
}
