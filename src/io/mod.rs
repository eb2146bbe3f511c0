//! Input/output helpers.
//!
//! - data and group file loading (`ingest`)
//! - results persistence and CSV export (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
