//! Dataset characterization and residual diagnostics.
//!
//! Both are collaborators behind small traits so a run can swap in other
//! tests (or fixed answers in unit tests):
//!
//! - [`DatasetCharacterizer`]: nonlinearity, multicollinearity and dynamic
//!   nonlinearity of the training data
//! - [`ResidualDiagnostics`]: leftover autocorrelation in a fitted model's
//!   residuals

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{Characterization, ResidualReport, RunConfig};
use crate::error::AppError;

pub mod ljung_box;
pub mod statistical;

pub use ljung_box::*;
pub use statistical::*;

pub trait DatasetCharacterizer: Send + Sync {
    fn nonlinearity(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        cfg: &RunConfig,
    ) -> Result<bool, AppError>;

    fn collinearity(&self, x: &DMatrix<f64>, cfg: &RunConfig) -> Result<bool, AppError>;

    /// Nonlinearity of `y(t)` given lagged outputs and inputs.
    fn dynamic_nonlinearity(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        cfg: &RunConfig,
    ) -> Result<bool, AppError>;
}

pub trait ResidualDiagnostics: Send + Sync {
    /// `None` when there are too few residuals to test.
    fn diagnose(&self, residuals: &[f64], alpha: f64) -> Option<ResidualReport>;
}

/// Run the characterization tests in order.
///
/// The dynamic test only runs for dynamic runs whose static test found no
/// nonlinearity.
pub fn characterize(
    characterizer: &dyn DatasetCharacterizer,
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    cfg: &RunConfig,
) -> Result<Characterization, AppError> {
    let nonlinear = characterizer.nonlinearity(x, y, cfg)?;
    let collinear = characterizer.collinearity(x, cfg)?;
    let dynamic_nonlinear = if cfg.dynamic_model && !nonlinear {
        Some(characterizer.dynamic_nonlinearity(x, y, cfg)?)
    } else {
        None
    };
    debug!(nonlinear, collinear, ?dynamic_nonlinear, "dataset characterized");
    Ok(Characterization {
        nonlinear,
        collinear,
        dynamic_nonlinear,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixed {
        nonlinear: bool,
        dynamic_called: AtomicBool,
    }

    impl DatasetCharacterizer for Fixed {
        fn nonlinearity(
            &self,
            _: &DMatrix<f64>,
            _: &DVector<f64>,
            _: &RunConfig,
        ) -> Result<bool, AppError> {
            Ok(self.nonlinear)
        }
        fn collinearity(&self, _: &DMatrix<f64>, _: &RunConfig) -> Result<bool, AppError> {
            Ok(false)
        }
        fn dynamic_nonlinearity(
            &self,
            _: &DMatrix<f64>,
            _: &DVector<f64>,
            _: &RunConfig,
        ) -> Result<bool, AppError> {
            self.dynamic_called.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[test]
    fn dynamic_test_only_runs_when_static_test_is_negative() {
        let x = DMatrix::zeros(3, 1);
        let y = DVector::zeros(3);
        let cfg = RunConfig {
            dynamic_model: true,
            ..RunConfig::default()
        };

        let c = Fixed { nonlinear: true, dynamic_called: AtomicBool::new(false) };
        let out = characterize(&c, &x, &y, &cfg).unwrap();
        assert!(!c.dynamic_called.load(Ordering::SeqCst));
        assert_eq!(out.dynamic_nonlinear, None);

        let c = Fixed { nonlinear: false, dynamic_called: AtomicBool::new(false) };
        let out = characterize(&c, &x, &y, &cfg).unwrap();
        assert_eq!(out.dynamic_nonlinear, Some(true));
        assert!(out.effective_nonlinear());

        let static_cfg = RunConfig::default();
        let c = Fixed { nonlinear: false, dynamic_called: AtomicBool::new(false) };
        assert_eq!(characterize(&c, &x, &y, &static_cfg).unwrap().dynamic_nonlinear, None);
    }
}
