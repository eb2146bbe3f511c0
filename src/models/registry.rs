//! Family → implementation lookup.

use std::collections::BTreeMap;

use crate::domain::ModelFamily;

use super::alven::{SparseNonlinearFitter, SparseVariant};
use super::forest::ForestFitter;
use super::linear::{ElasticNetFitter, OlsFitter, RidgeFitter};
use super::pls::{PlsFitter, SparsePlsFitter};
use super::rnn::ReservoirEstimator;
use super::state_space::StateSpaceEstimator;
use super::svr::SvrFitter;
use super::{DynamicEstimator, ModelFitter};

/// Holds one implementation per family; tests register doubles over the defaults.
pub struct FitterRegistry {
    fitters: BTreeMap<ModelFamily, Box<dyn ModelFitter>>,
    estimators: BTreeMap<ModelFamily, Box<dyn DynamicEstimator>>,
}

impl FitterRegistry {
    pub fn empty() -> Self {
        Self {
            fitters: BTreeMap::new(),
            estimators: BTreeMap::new(),
        }
    }

    pub fn register_fitter(&mut self, fitter: Box<dyn ModelFitter>) {
        self.estimators.remove(&fitter.family());
        self.fitters.insert(fitter.family(), fitter);
    }

    pub fn register_estimator(&mut self, estimator: Box<dyn DynamicEstimator>) {
        self.fitters.remove(&estimator.family());
        self.estimators.insert(estimator.family(), estimator);
    }

    pub fn fitter(&self, family: ModelFamily) -> Option<&dyn ModelFitter> {
        self.fitters.get(&family).map(|f| f.as_ref())
    }

    pub fn estimator(&self, family: ModelFamily) -> Option<&dyn DynamicEstimator> {
        self.estimators.get(&family).map(|e| e.as_ref())
    }

    pub fn families(&self) -> Vec<ModelFamily> {
        let mut out: Vec<ModelFamily> = self
            .fitters
            .keys()
            .chain(self.estimators.keys())
            .copied()
            .collect();
        out.sort();
        out
    }
}

impl Default for FitterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_fitter(Box::new(OlsFitter));
        registry.register_fitter(Box::new(RidgeFitter));
        registry.register_fitter(Box::new(ElasticNetFitter));
        registry.register_fitter(Box::new(PlsFitter));
        registry.register_fitter(Box::new(SparsePlsFitter));
        registry.register_fitter(Box::new(SvrFitter));
        registry.register_fitter(Box::new(ForestFitter));
        registry.register_fitter(Box::new(SparseNonlinearFitter::new(SparseVariant::Static)));
        registry.register_fitter(Box::new(SparseNonlinearFitter::new(SparseVariant::Dynamic)));
        registry.register_fitter(Box::new(SparseNonlinearFitter::new(SparseVariant::DynamicFull)));
        registry.register_estimator(Box::new(ReservoirEstimator));
        registry.register_estimator(Box::new(StateSpaceEstimator));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_family() {
        assert_eq!(FitterRegistry::default().families(), ModelFamily::ALL.to_vec());
    }

    #[test]
    fn drivers_are_estimators_not_fitters() {
        let registry = FitterRegistry::default();
        assert!(registry.fitter(ModelFamily::StateSpace).is_none());
        assert!(registry.estimator(ModelFamily::RecurrentSequence).is_some());
        assert!(registry.fitter(ModelFamily::Ridge).is_some());
    }
}
