//! The CKMS quantile summary.

use std::mem;

use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::quantile::Quantile;

// Observations are batched before being merged into the sample list, which
// amortizes the merge cost over many inserts.
const INSERT_BUFFER_SIZE: usize = 500;

/// A single compressed sample.
///
/// `g` is the rank gap to the previous retained sample and `delta` is the
/// allowed slack on this sample's rank. The summary maintains the invariant
/// that `g + delta` never exceeds the allowable error at the sample's rank,
/// which is what bounds the rank error of query answers.
#[derive(Clone, Copy, Debug)]
struct Sample {
    value: f64,
    g: u64,
    delta: u64,
}

/// [CKMS][ckms] streaming quantile summary.
///
/// Maintains a rank-ordered, compressed list of samples over an unbounded
/// stream of observations, answering quantile queries for a fixed set of
/// target quantiles configured at construction. Space usage is
/// `O((1/ε) log(εn))` per target in expectation, and per-insert cost is
/// amortized sublinear.
///
/// Targets with `epsilon == 0.0` at φ `0.0` or `1.0` are honored exactly:
/// the minimum (or maximum) observed value is never compressed away.
///
/// `NaN` observations are silently discarded, as they cannot be ordered
/// against other samples. Infinities and negative values are accepted.
///
/// [ckms]: https://ieeexplore.ieee.org/document/1410103
#[derive(Clone, Debug)]
pub struct CkmsQuantiles {
    /// The configured target quantiles, in configuration order.
    targets: SmallVec<[Quantile; 4]>,

    /// Compressed samples, ordered by value.
    samples: Vec<Sample>,

    /// Observations not yet merged into `samples`.
    buffer: Vec<f64>,

    /// Number of observations merged into `samples` so far.
    inserted: u64,

    /// Whether the first sample must be preserved exactly.
    track_min: bool,
}

impl CkmsQuantiles {
    /// Creates a new summary for the given targets.
    ///
    /// An empty target set is allowed, but [`get`][Self::get] will then
    /// always return `NaN`.
    pub fn new(targets: &[Quantile]) -> Self {
        Self {
            targets: targets.iter().copied().collect(),
            samples: Vec::new(),
            buffer: Vec::with_capacity(INSERT_BUFFER_SIZE),
            inserted: 0,
            track_min: targets.iter().any(|q| q.is_exact_minimum()),
        }
    }

    /// Inserts a single observation.
    ///
    /// `NaN` values are silently discarded.
    pub fn insert(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }

        self.buffer.push(value);
        if self.buffer.len() >= INSERT_BUFFER_SIZE {
            self.drain_buffer();
            self.compress();
        }
    }

    /// Returns the estimated value at the given quantile.
    ///
    /// Returns `NaN` if no observations have been inserted, if no targets
    /// were configured, or if `quantile` is `NaN`. The answer is within the
    /// configured rank error of the closest target; quantiles far from any
    /// target carry no accuracy guarantee.
    pub fn get(&mut self, quantile: f64) -> f64 {
        self.drain_buffer();

        if quantile.is_nan() || self.targets.is_empty() || self.samples.is_empty() {
            return f64::NAN;
        }

        // The first sample is the minimum and the last the maximum: queries at
        // the endpoints short-circuit, which also makes the exact min/max
        // targets exact.
        if quantile <= 0.0 {
            return self.samples[0].value;
        }
        if quantile >= 1.0 {
            return self.samples[self.samples.len() - 1].value;
        }

        let desired = (quantile * self.inserted as f64).ceil() as u64;
        let allowed = self.allowable_error(desired) as f64 / 2.0;

        let mut rank = 0u64;
        for i in 1..self.samples.len() {
            let prev = self.samples[i - 1];
            let cur = self.samples[i];

            rank += prev.g;
            if (rank + cur.g + cur.delta) as f64 > desired as f64 + allowed {
                return prev.value;
            }
        }

        self.samples[self.samples.len() - 1].value
    }

    /// Number of observations inserted so far, including any still buffered.
    pub fn count(&self) -> u64 {
        self.inserted + self.buffer.len() as u64
    }

    /// Whether any observations have been inserted.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The configured targets, in configuration order.
    pub fn targets(&self) -> &[Quantile] {
        &self.targets
    }

    /// The allowable rank error at `rank`, given the current stream length.
    ///
    /// This is the CKMS invariant function: the minimum over all targets of
    /// the rank slack each target can tolerate at this position. Exact
    /// endpoint targets contribute no bound here; they are enforced
    /// structurally during compression and query.
    fn allowable_error(&self, rank: u64) -> u64 {
        let n = self.inserted as f64;
        let r = rank as f64;

        let mut min_error = f64::MAX;
        for target in &self.targets {
            let (phi, epsilon) = (target.quantile(), target.epsilon());
            if epsilon == 0.0 {
                continue;
            }

            let error = if r >= (phi * n).floor() {
                2.0 * epsilon * r / phi
            } else {
                2.0 * epsilon * (n - r) / (1.0 - phi)
            };
            if error < min_error {
                min_error = error;
            }
        }

        if min_error == f64::MAX {
            return u64::MAX;
        }

        (min_error.floor() as u64).max(1)
    }

    /// Merges buffered observations into the sample list.
    ///
    /// The buffer is sorted and merge-scanned against the existing samples in
    /// a single `O(|samples| + |buffer|)` pass. Each buffered value enters
    /// with `g = 1` and a `delta` of the allowable error at its insertion
    /// rank, minus one; values landing at either end of the list enter with
    /// `delta = 0` since they are a new minimum or maximum.
    fn drain_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let mut buffer = mem::take(&mut self.buffer);
        buffer.sort_unstable_by_key(|v| OrderedFloat(*v));

        let mut existing = mem::take(&mut self.samples).into_iter().peekable();
        let mut merged = Vec::with_capacity(existing.len() + buffer.len());
        let mut rank = 0u64;

        for value in buffer.drain(..) {
            while let Some(sample) = existing.next_if(|s| s.value <= value) {
                rank += sample.g;
                merged.push(sample);
            }

            self.inserted += 1;
            let delta = if merged.is_empty() || existing.peek().is_none() {
                0
            } else {
                self.allowable_error(rank + 1).saturating_sub(1)
            };
            merged.push(Sample { value, g: 1, delta });
        }

        merged.extend(existing);

        self.samples = merged;
        self.buffer = buffer;
    }

    /// Compresses the sample list.
    ///
    /// Sweeps left to right, merging each sample into its right neighbor
    /// whenever the combined rank span still fits within the allowable error
    /// at the neighbor's rank. The merge keeps the right neighbor's value, so
    /// the maximum always survives; the minimum is additionally pinned when
    /// an exact-minimum target is configured.
    fn compress(&mut self) {
        if self.samples.len() < 3 {
            return;
        }

        let samples = mem::take(&mut self.samples);
        let mut compressed: Vec<Sample> = Vec::with_capacity(samples.len());
        let mut rank = 0u64;

        for sample in samples {
            rank += sample.g;

            let mergeable = match compressed.len() {
                0 => false,
                1 if self.track_min => false,
                len => {
                    let prev = compressed[len - 1];
                    prev.g + sample.g + sample.delta <= self.allowable_error(rank)
                }
            };

            if mergeable {
                let last = compressed.len() - 1;
                let prev_g = compressed[last].g;
                compressed[last] = Sample {
                    value: sample.value,
                    g: prev_g + sample.g,
                    delta: sample.delta,
                };
            } else {
                compressed.push(sample);
            }
        }

        self.samples = compressed;
    }

    #[cfg(test)]
    fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::collection::vec as arb_vec;
    use proptest::prelude::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use super::*;

    fn targets(spec: &[(f64, f64)]) -> Vec<Quantile> {
        spec.iter()
            .map(|(q, e)| Quantile::new(*q, *e).expect("test targets should be valid"))
            .collect()
    }

    fn shuffled(n: u64, seed: u64) -> Vec<f64> {
        let mut values = (1..=n).map(|i| i as f64).collect::<Vec<_>>();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
        values.shuffle(&mut rng);
        values
    }

    #[test]
    fn test_empty_returns_nan() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.5, 0.01)]));
        assert!(estimator.get(0.5).is_nan());
    }

    #[test]
    fn test_no_targets_returns_nan() {
        let mut estimator = CkmsQuantiles::new(&[]);
        estimator.insert(1.0);
        estimator.insert(2.0);
        assert!(estimator.get(0.5).is_nan());
        assert_eq!(estimator.count(), 2);
    }

    #[test]
    fn test_nan_observations_dropped() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.5, 0.01)]));
        estimator.insert(1.0);
        estimator.insert(f64::NAN);
        estimator.insert(3.0);
        assert_eq!(estimator.count(), 2);
    }

    #[test]
    fn test_nan_query_returns_nan() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.5, 0.01)]));
        estimator.insert(1.0);
        assert!(estimator.get(f64::NAN).is_nan());
    }

    #[test]
    fn test_median_of_one_to_one_hundred() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.5, 0.01), (0.95, 0.001)]));
        for value in shuffled(100, 0xC0FFEE) {
            estimator.insert(value);
        }

        let median = estimator.get(0.5);
        assert!((49.0..=52.0).contains(&median), "median was {}", median);

        let p95 = estimator.get(0.95);
        assert!((94.0..=96.0).contains(&p95), "p95 was {}", p95);
    }

    #[test]
    fn test_exact_min_max() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.0, 0.0), (1.0, 0.0)]));
        for value in [7.0, -3.0, 42.0, 0.0] {
            estimator.insert(value);
        }
        assert_eq!(estimator.get(0.0), -3.0);
        assert_eq!(estimator.get(1.0), 42.0);
    }

    #[test]
    fn test_exact_min_max_survive_compression() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.0, 0.0), (0.5, 0.01), (1.0, 0.0)]));
        for value in shuffled(100_000, 0xDEC0DE) {
            estimator.insert(value);
        }
        assert_eq!(estimator.get(0.0), 1.0);
        assert_eq!(estimator.get(1.0), 100_000.0);
    }

    #[test]
    fn test_infinities_accepted() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.0, 0.0), (1.0, 0.0)]));
        estimator.insert(f64::NEG_INFINITY);
        estimator.insert(0.0);
        estimator.insert(f64::INFINITY);
        assert_eq!(estimator.get(0.0), f64::NEG_INFINITY);
        assert_eq!(estimator.get(1.0), f64::INFINITY);
    }

    #[test]
    fn test_space_stays_sublinear() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.5, 0.01), (0.9, 0.01), (0.99, 0.001)]));
        for value in shuffled(200_000, 0xFEED) {
            estimator.insert(value);
        }

        // Force a final drain so the retained-sample count is meaningful.
        let _ = estimator.get(0.5);
        assert!(
            estimator.sample_count() < 2_000,
            "retained {} samples for 200k observations",
            estimator.sample_count()
        );
    }

    #[test]
    fn test_count_includes_buffered() {
        let mut estimator = CkmsQuantiles::new(&targets(&[(0.5, 0.01)]));
        for i in 0..10 {
            estimator.insert(i as f64);
        }
        assert_eq!(estimator.count(), 10);
        let _ = estimator.get(0.5);
        assert_eq!(estimator.count(), 10);
    }

    proptest! {
        // Rank-error bound: for a stream of distinct values 1..=n, the true
        // rank of a value is the value itself, so the estimate must land
        // within ε·n ranks of φ·n. A slack of two ranks absorbs the floor in
        // the invariant function at small n.
        #[test]
        fn prop_rank_error_within_epsilon(
            n in 100u64..4_000,
            seed in any::<u64>(),
        ) {
            let spec = [(0.5, 0.01), (0.9, 0.01), (0.99, 0.001)];
            let mut estimator = CkmsQuantiles::new(&targets(&spec));
            for value in shuffled(n, seed) {
                estimator.insert(value);
            }

            for (phi, epsilon) in spec {
                let estimate = estimator.get(phi);
                let lower = (phi - epsilon) * n as f64 - 2.0;
                let upper = (phi + epsilon) * n as f64 + 2.0;
                prop_assert!(
                    (lower..=upper).contains(&estimate),
                    "phi={} estimate={} expected within [{}, {}]",
                    phi, estimate, lower, upper
                );
            }
        }

        #[test]
        fn prop_exact_endpoints(values in arb_vec(-1e9f64..1e9, 1..2_000)) {
            let mut estimator = CkmsQuantiles::new(&targets(&[(0.0, 0.0), (1.0, 0.0)]));
            for value in &values {
                estimator.insert(*value);
            }

            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert_eq!(estimator.get(0.0), min);
            prop_assert_eq!(estimator.get(1.0), max);
        }

        #[test]
        fn prop_count_matches_inserts(values in arb_vec(-1e9f64..1e9, 0..1_500)) {
            let mut estimator = CkmsQuantiles::new(&targets(&[(0.5, 0.05)]));
            for value in &values {
                estimator.insert(*value);
            }
            prop_assert_eq!(estimator.count(), values.len() as u64);
        }
    }
}
