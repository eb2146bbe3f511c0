//! Model families.
//!
//! Every family plugs into the engine through one of two small traits:
//!
//! - [`ModelFitter`]: grid-searchable families. The cross-validation protocol
//!   asks for a grid, then fits points on arbitrary row subsets.
//! - [`DynamicEstimator`]: families that run their own selection loop
//!   (recurrent-sequence, state-space) and hand back a finished result.
//!
//! Fitted models are [`ModelArtifact`] values: serializable, self-contained
//! and able to predict on any standardized [`Frame`].

use crate::data::Frame;
use crate::domain::{FittingResult, HyperParams, ModelFamily, RunConfig};
use crate::error::AppError;

pub mod alven;
pub mod artifact;
pub mod forest;
pub mod linear;
pub mod pls;
pub mod registry;
pub mod rnn;
pub mod state_space;
pub mod svr;

pub use artifact::*;
pub use registry::*;

/// Run-level context handed to every fitter.
#[derive(Debug, Clone, Copy)]
pub struct FitContext<'a> {
    pub config: &'a RunConfig,
    pub feature_names: &'a [String],
    pub response_name: &'a str,
}

pub trait ModelFitter: Send + Sync {
    fn family(&self) -> ModelFamily;

    /// Candidate points built from the training partition, simplest first.
    fn grid(&self, train: &Frame, ctx: &FitContext<'_>) -> Result<Vec<HyperParams>, AppError>;

    fn fit(
        &self,
        train: &Frame,
        params: &HyperParams,
        ctx: &FitContext<'_>,
    ) -> Result<ModelArtifact, AppError>;
}

pub trait DynamicEstimator: Send + Sync {
    fn family(&self) -> ModelFamily;

    /// Select, fit and score on ordered `train` rows, then predict `test`.
    fn estimate(
        &self,
        train: &Frame,
        test: &Frame,
        ctx: &FitContext<'_>,
    ) -> Result<FittingResult, AppError>;
}
