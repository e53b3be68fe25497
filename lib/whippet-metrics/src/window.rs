//! Time-windowed estimator ring.

use ckms::CkmsQuantiles;
use tracing::trace;

/// An estimator that can live inside a [`SlidingWindow`].
pub trait WindowedEstimator {
    /// Absorbs one observation.
    fn observe(&mut self, value: f64);
}

impl WindowedEstimator for CkmsQuantiles {
    fn observe(&mut self, value: f64) {
        self.insert(value);
    }
}

/// A ring of estimator instances rotated in wall-clock time.
///
/// The ring divides a moving window of `max_age_seconds` into `age_buckets`
/// equal slices. Each observation lands in exactly one bucket: the current
/// one at the time of observation. Rotation is lazy, driven by the clock
/// reading passed into [`observe`][Self::observe] and
/// [`current`][Self::current]; there is no background thread.
///
/// [`current`][Self::current] exposes the active bucket, which aggregates
/// observations from the last `max_age_seconds / age_buckets` seconds only,
/// not the full window. This is the accepted tradeoff for bounded memory:
/// the emitted quantile reflects the active bucket at query time, while
/// older buckets age out of the ring without being re-read.
///
/// The window has no internal synchronization; the owner serializes access
/// to it (both observation and query) behind a short mutex.
pub struct SlidingWindow<E> {
    make_estimator: Box<dyn Fn() -> E + Send>,
    buckets: Vec<E>,
    current: usize,
    rotation_deadline_ms: u64,
    bucket_duration_ms: u64,
}

impl<E: WindowedEstimator> SlidingWindow<E> {
    /// Creates a new window anchored at `now_ms`.
    ///
    /// `max_age_seconds` and `age_buckets` must both be positive; the
    /// summary builder validates them before constructing a window.
    pub fn new(
        make_estimator: impl Fn() -> E + Send + 'static, max_age_seconds: u64, age_buckets: u32, now_ms: u64,
    ) -> Self {
        let bucket_duration_ms = (max_age_seconds * 1000 / u64::from(age_buckets)).max(1);
        let buckets = (0..age_buckets).map(|_| make_estimator()).collect();
        Self {
            make_estimator: Box::new(make_estimator),
            buckets,
            current: 0,
            rotation_deadline_ms: now_ms + bucket_duration_ms,
            bucket_duration_ms,
        }
    }

    /// Records an observation into the bucket that is current at `now_ms`.
    pub fn observe(&mut self, now_ms: u64, value: f64) {
        self.rotate(now_ms);
        self.buckets[self.current].observe(value);
    }

    /// Returns the bucket that is current at `now_ms`, rotating first.
    pub fn current(&mut self, now_ms: u64) -> &mut E {
        self.rotate(now_ms);
        &mut self.buckets[self.current]
    }

    /// Advances the ring until the current bucket's deadline is in the
    /// future.
    ///
    /// Each advance clears the oldest bucket and makes it current. A gap
    /// longer than the whole ring resets every bucket in one step, with
    /// deadlines re-anchored at `now_ms`.
    fn rotate(&mut self, now_ms: u64) {
        if now_ms < self.rotation_deadline_ms {
            return;
        }

        let elapsed = now_ms - self.rotation_deadline_ms;
        let advances = elapsed / self.bucket_duration_ms + 1;
        if advances >= self.buckets.len() as u64 {
            trace!(idle_ms = elapsed, "Gap exceeded the full window; resetting all age buckets.");
            for bucket in &mut self.buckets {
                *bucket = (self.make_estimator)();
            }
            self.current = 0;
            self.rotation_deadline_ms = now_ms + self.bucket_duration_ms;
            return;
        }

        for _ in 0..advances {
            self.current = (self.current + 1) % self.buckets.len();
            self.buckets[self.current] = (self.make_estimator)();
            self.rotation_deadline_ms += self.bucket_duration_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        values: Vec<f64>,
    }

    impl WindowedEstimator for Recorder {
        fn observe(&mut self, value: f64) {
            self.values.push(value);
        }
    }

    fn window() -> SlidingWindow<Recorder> {
        // 10 second window, 5 buckets: one rotation every 2 seconds.
        SlidingWindow::new(Recorder::default, 10, 5, 0)
    }

    #[test]
    fn test_observations_land_in_current_bucket() {
        let mut window = window();
        window.observe(0, 1.0);
        window.observe(1_999, 2.0);
        assert_eq!(window.current(1_999).values, [1.0, 2.0]);
    }

    #[test]
    fn test_rotation_clears_current() {
        let mut window = window();
        window.observe(0, 1.0);
        // Crossing the bucket deadline swaps in a fresh estimator.
        assert!(window.current(2_000).values.is_empty());
        window.observe(2_100, 2.0);
        assert_eq!(window.current(2_100).values, [2.0]);
    }

    #[test]
    fn test_multiple_rotations_in_one_step() {
        let mut window = window();
        window.observe(0, 1.0);
        // Three bucket durations later: still within the window, fresh bucket.
        assert!(window.current(6_500).values.is_empty());
    }

    #[test]
    fn test_long_gap_resets_everything() {
        let mut window = window();
        for t in [0u64, 2_000, 4_000, 6_000, 8_000] {
            window.observe(t, t as f64);
        }
        // A gap past the entire window clears all buckets and re-anchors.
        assert!(window.current(100_000).values.is_empty());
        window.observe(100_500, 9.0);
        assert_eq!(window.current(100_500).values, [9.0]);
        // The re-anchored deadline is honored: one bucket duration later, a
        // rotation happens again.
        assert!(window.current(102_600).values.is_empty());
    }

    #[test]
    fn test_old_observations_age_out_of_current() {
        let mut window = window();
        window.observe(0, 1.0);
        // Each of the five rotations clears the bucket it lands on, so the
        // original observation never resurfaces.
        for t in [2_000u64, 4_000, 6_000, 8_000, 10_000] {
            assert!(window.current(t).values.is_empty());
        }
    }

    #[test]
    fn test_single_bucket_window() {
        let mut window = SlidingWindow::new(Recorder::default, 1, 1, 0);
        window.observe(0, 1.0);
        assert_eq!(window.current(999).values, [1.0]);
        assert!(window.current(1_000).values.is_empty());
    }
}
