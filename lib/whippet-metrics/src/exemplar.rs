//! Exemplar sampling capability.

use whippet_model::{Exemplars, Labels};

/// A sampler that selects exemplars from a stream of observations.
///
/// The metric core does not implement any sampling policy itself: it invokes
/// the sampler on every observation of a data point and includes whatever
/// the sampler has collected in emitted snapshots. Implementations
/// encapsulate their own thread-safety; the core may invoke `observe` from
/// many threads concurrently.
pub trait ExemplarSampler: Send + Sync {
    /// Offers an observed value to the sampler.
    fn observe(&self, value: f64);

    /// Offers an observed value together with caller-provided exemplar
    /// labels, typically trace and span identifiers.
    fn observe_with_exemplar(&self, value: f64, labels: &Labels);

    /// Returns the exemplars currently retained by the sampler.
    fn collect(&self) -> Exemplars;
}

/// A factory producing one sampler per data point.
pub type ExemplarSamplerFactory = dyn Fn() -> Box<dyn ExemplarSampler> + Send + Sync;
