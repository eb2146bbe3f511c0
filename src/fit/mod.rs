//! Fitting protocol.
//!
//! Responsibilities:
//!
//! - build hyperparameter grids (`grid`)
//! - partition rows per CV strategy (`folds`)
//! - search a family's grid under a strategy (`cv`, parallel over points)
//! - nested cross-validation across outer splits (`nested`)
//! - pick the winning family (`selection`)

pub mod cv;
pub mod folds;
pub mod grid;
pub mod nested;
pub mod selection;

pub use cv::*;
pub use folds::*;
pub use grid::*;
pub use nested::*;
pub use selection::*;
