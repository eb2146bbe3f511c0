//! `smart-process-analytics` library crate.
//!
//! The binary (`spa`) is a thin wrapper around this library so that:
//!
//! - the selection engine is testable without spawning processes
//! - collaborators (characterizer, fitters, diagnostics) can be swapped
//! - code stays easy to navigate as the model catalogue grows

pub mod app;
pub mod characterize;
pub mod cli;
pub mod data;
pub mod decide;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod orchestrator;
pub mod plot;
pub mod report;
