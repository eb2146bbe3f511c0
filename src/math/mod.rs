//! Numerical utilities: least squares, standardization, feature bases and
//! the handful of statistical distributions the tests need.

pub mod basis;
pub mod ols;
pub mod scaling;
pub mod stats;

pub use basis::*;
pub use ols::*;
pub use scaling::*;
pub use stats::*;
