//! Ljung-Box test for leftover autocorrelation.

use crate::domain::ResidualReport;
use crate::math::{autocorrelation, chi2_quantile};

use super::ResidualDiagnostics;

/// Fewest residuals the test is run on.
pub const MIN_RESIDUALS: usize = 4;
const MAX_LAGS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct LjungBoxDiagnostics;

impl ResidualDiagnostics for LjungBoxDiagnostics {
    fn diagnose(&self, residuals: &[f64], alpha: f64) -> Option<ResidualReport> {
        let n = residuals.len();
        if n < MIN_RESIDUALS {
            return None;
        }
        let h = MAX_LAGS.min(n / 4).max(1);
        let acf = autocorrelation(residuals, h);
        let n_f = n as f64;
        let q_stat = n_f
            * (n_f + 2.0)
            * acf
                .iter()
                .enumerate()
                .map(|(i, r)| r * r / (n_f - (i + 1) as f64))
                .sum::<f64>();
        let critical = chi2_quantile(1.0 - alpha, h);
        Some(ResidualReport {
            n,
            acf,
            q_stat,
            critical,
            dynamics_detected: q_stat > critical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    #[test]
    fn white_noise_shows_no_dynamics() {
        let mut rng = StdRng::seed_from_u64(9);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let e: Vec<f64> = (0..400).map(|_| normal.sample(&mut rng)).collect();
        let report = LjungBoxDiagnostics.diagnose(&e, 0.001).unwrap();
        assert_eq!(report.acf.len(), 10);
        assert!(!report.dynamics_detected, "Q={} crit={}", report.q_stat, report.critical);
    }

    #[test]
    fn autoregressive_residuals_are_flagged() {
        let mut rng = StdRng::seed_from_u64(9);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut e = vec![0.0; 400];
        for t in 1..e.len() {
            e[t] = 0.8 * e[t - 1] + normal.sample(&mut rng);
        }
        assert!(LjungBoxDiagnostics.diagnose(&e, 0.01).unwrap().dynamics_detected);
    }

    #[test]
    fn too_few_residuals_skip_the_test() {
        assert!(LjungBoxDiagnostics.diagnose(&[0.1, -0.2, 0.3], 0.05).is_none());
        let report = LjungBoxDiagnostics.diagnose(&[0.1, -0.2, 0.3, 0.0], 0.05).unwrap();
        assert_eq!(report.acf.len(), 1);
    }
}
