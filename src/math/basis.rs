//! Feature bases for the sparse-nonlinear families.
//!
//! Two building blocks:
//!
//! - [`FeatureSpec`]: a fixed list of nonlinear terms (monomials up to a
//!   degree, and optionally log / sqrt / inverse transforms) built from the
//!   training rows and then applied unchanged to any other rows.
//! - [`lagged_design`]: embeds a series in a lagged regression design
//!   `[y(t-1..t-L), x(t..t-L)] → y(t)`.
//!
//! Numerical notes:
//! - Log / sqrt / inverse terms are only generated for columns that are
//!   strictly positive on the training rows. At prediction time inputs are
//!   clamped to `POSITIVE_FLOOR` so unseen non-positive values stay finite.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::TransformKind;

const POSITIVE_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Product of the listed columns (repeats allowed: `[0, 0]` is `x0²`).
    Monomial(Vec<usize>),
    Log(usize),
    Sqrt(usize),
    Inverse(usize),
}

impl Term {
    fn eval(&self, row: &[f64]) -> f64 {
        match self {
            Term::Monomial(cols) => cols.iter().map(|&c| row[c]).product(),
            Term::Log(c) => row[*c].max(POSITIVE_FLOOR).ln(),
            Term::Sqrt(c) => row[*c].max(0.0).sqrt(),
            Term::Inverse(c) => 1.0 / row[*c].max(POSITIVE_FLOOR),
        }
    }

    fn name(&self, names: &[String]) -> String {
        match self {
            Term::Monomial(cols) => {
                let mut parts: Vec<String> = Vec::new();
                let mut i = 0;
                while i < cols.len() {
                    let c = cols[i];
                    let run = cols[i..].iter().take_while(|&&v| v == c).count();
                    parts.push(if run == 1 {
                        names[c].clone()
                    } else {
                        format!("{}^{run}", names[c])
                    });
                    i += run;
                }
                parts.join("*")
            }
            Term::Log(c) => format!("log({})", names[*c]),
            Term::Sqrt(c) => format!("sqrt({})", names[*c]),
            Term::Inverse(c) => format!("1/{}", names[*c]),
        }
    }
}

/// An ordered, reproducible list of expansion terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub terms: Vec<Term>,
    pub names: Vec<String>,
}

impl FeatureSpec {
    /// Build the term list from training rows.
    ///
    /// Categorical columns only enter linearly.
    pub fn build(
        x: &DMatrix<f64>,
        names: &[String],
        degree: usize,
        transform: TransformKind,
        categorical: &[bool],
    ) -> Self {
        let m = x.ncols();
        let is_cat = |j: usize| categorical.get(j).copied().unwrap_or(false);
        let continuous: Vec<usize> = (0..m).filter(|&j| !is_cat(j)).collect();

        let mut terms: Vec<Term> = (0..m).map(|j| Term::Monomial(vec![j])).collect();
        for d in 2..=degree.min(3) {
            for combo in combinations_with_replacement(&continuous, d) {
                terms.push(Term::Monomial(combo));
            }
        }

        if transform == TransformKind::Auto {
            for &j in &continuous {
                if x.column(j).iter().all(|v| *v > 0.0) {
                    terms.push(Term::Log(j));
                    terms.push(Term::Sqrt(j));
                    terms.push(Term::Inverse(j));
                }
            }
        }

        let names = terms.iter().map(|t| t.name(names)).collect();
        Self { terms, names }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn apply(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::<f64>::zeros(x.nrows(), self.terms.len());
        let mut row = vec![0.0; x.ncols()];
        for i in 0..x.nrows() {
            for (j, slot) in row.iter_mut().enumerate() {
                *slot = x[(i, j)];
            }
            for (k, term) in self.terms.iter().enumerate() {
                out[(i, k)] = term.eval(&row);
            }
        }
        out
    }
}

fn combinations_with_replacement(items: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn recurse(
        items: &[usize],
        k: usize,
        start: usize,
        current: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
    ) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..items.len() {
            current.push(items[i]);
            recurse(items, k, i, current, out);
            current.pop();
        }
    }
    recurse(items, k, 0, &mut current, &mut out);
    out
}

/// Lagged regression design.
///
/// Row `r` corresponds to time `t = lag + r` and holds
/// `[y(t-1), …, y(t-lag), x(t), x(t-1), …, x(t-lag)]`; the target is `y(t)`.
/// The first `lag` rows are consumed as context.
pub fn lagged_design(x: &DMatrix<f64>, y: &[f64], lag: usize) -> (DMatrix<f64>, DVector<f64>) {
    let n = x.nrows();
    let m = x.ncols();
    if n <= lag {
        return (DMatrix::zeros(0, lag + m * (lag + 1)), DVector::zeros(0));
    }
    let rows = n - lag;
    let cols = lag + m * (lag + 1);
    let mut design = DMatrix::<f64>::zeros(rows, cols);
    let mut target = DVector::<f64>::zeros(rows);
    for r in 0..rows {
        let t = r + lag;
        for l in 1..=lag {
            design[(r, l - 1)] = y[t - l];
        }
        for l in 0..=lag {
            for j in 0..m {
                design[(r, lag + l * m + j)] = x[(t - l, j)];
            }
        }
        target[r] = y[t];
    }
    (design, target)
}

/// Column names matching [`lagged_design`].
pub fn lagged_names(x_names: &[String], response: &str, lag: usize) -> Vec<String> {
    let mut names: Vec<String> = (1..=lag).map(|l| format!("{response}(t-{l})")).collect();
    for l in 0..=lag {
        for name in x_names {
            names.push(if l == 0 {
                format!("{name}(t)")
            } else {
                format!("{name}(t-{l})")
            });
        }
    }
    names
}
