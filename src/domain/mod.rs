//! Domain types used throughout a run.
//!
//! This module defines:
//!
//! - model family and CV strategy tags (`ModelFamily`, `CvStrategy`)
//! - run configuration (`RunConfig`) and hyperparameter points (`HyperParams`)
//! - fit outputs (`FittingResult`, `SelectionOutcome`, `NestedSummary`)

pub mod types;

pub use types::*;
