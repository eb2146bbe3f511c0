//! Fitted model artifacts.

use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::domain::FamilyDetails;
use crate::error::AppError;
use crate::math::mse;

use super::alven::SparseModel;
use super::forest::ForestModel;
use super::linear::LinearModel;
use super::pls::LatentModel;
use super::rnn::ReservoirModel;
use super::state_space::StateSpaceModel;
use super::svr::KernelModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelArtifact {
    Linear(LinearModel),
    Sparse(SparseModel),
    Latent(LatentModel),
    Kernel(KernelModel),
    Forest(ForestModel),
    Reservoir(ReservoirModel),
    StateSpace(StateSpaceModel),
}

impl ModelArtifact {
    /// Predictions for rows `offset()..` of `frame`.
    pub fn predict(&self, frame: &Frame) -> Result<Vec<f64>, AppError> {
        let offset = self.offset();
        if frame.n_rows() <= offset {
            return Err(AppError::data(format!(
                "Need more than {offset} rows to predict with this model, got {}.",
                frame.n_rows()
            )));
        }
        let out = match self {
            ModelArtifact::Linear(m) => m.predict(frame),
            ModelArtifact::Sparse(m) => m.predict(frame),
            ModelArtifact::Latent(m) => m.predict(frame),
            ModelArtifact::Kernel(m) => m.predict(frame),
            ModelArtifact::Forest(m) => m.predict(frame),
            ModelArtifact::Reservoir(m) => m.predict(frame),
            ModelArtifact::StateSpace(m) => m.predict(frame),
        };
        if out.iter().any(|v| !v.is_finite()) {
            return Err(AppError::fitting("Model produced non-finite predictions."));
        }
        Ok(out)
    }

    /// Leading rows consumed as lag / warm-up context.
    pub fn offset(&self) -> usize {
        match self {
            ModelArtifact::Sparse(m) => m.lag,
            ModelArtifact::Reservoir(m) => m.washout,
            ModelArtifact::StateSpace(m) => m.offset(),
            _ => 0,
        }
    }

    /// Parameter count used by information criteria.
    pub fn effective_params(&self) -> usize {
        match self {
            ModelArtifact::Linear(m) => m.active() + 1,
            ModelArtifact::Sparse(m) => m.active() + 1,
            ModelArtifact::Latent(m) => m.components + 1,
            ModelArtifact::Kernel(m) => m.support.len().max(1),
            ModelArtifact::Forest(m) => m.mean_leaves().max(1),
            ModelArtifact::Reservoir(m) => m.readout.len() + 1,
            ModelArtifact::StateSpace(m) => m.parameter_count(),
        }
    }

    pub fn details(&self) -> FamilyDetails {
        match self {
            ModelArtifact::Linear(m) => FamilyDetails::Coefficients {
                names: m.names.clone(),
                values: m.coefficients.clone(),
            },
            ModelArtifact::Sparse(m) => {
                let (names, coefficients) = m.retained();
                FamilyDetails::SelectedFeatures {
                    names,
                    coefficients,
                }
            }
            ModelArtifact::Latent(m) => FamilyDetails::Components {
                count: m.components,
                active_features: m.active(),
            },
            ModelArtifact::Kernel(m) => FamilyDetails::SupportVectors {
                count: m.support.len(),
            },
            ModelArtifact::Forest(m) => FamilyDetails::Ensemble {
                trees: m.trees.len(),
            },
            ModelArtifact::Reservoir(m) => FamilyDetails::Reservoir {
                layers: m.layers.iter().map(|l| l.units).collect(),
            },
            ModelArtifact::StateSpace(m) => FamilyDetails::StateOrder { order: m.order },
        }
    }

    /// Mean squared error on `frame`, aligned past the offset.
    pub fn score(&self, frame: &Frame) -> Result<(Vec<f64>, f64), AppError> {
        let yhat = self.predict(frame)?;
        let actual = &frame.y.as_slice()[self.offset()..];
        let value = mse(actual, &yhat);
        Ok((yhat, value))
    }
}
