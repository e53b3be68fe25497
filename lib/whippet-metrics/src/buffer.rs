//! Snapshot-coordination buffer.

use std::{
    mem,
    sync::{
        atomic::{
            AtomicU64, AtomicUsize,
            Ordering::{AcqRel, Acquire, SeqCst},
        },
        Mutex,
    },
    thread,
};

const OPEN: usize = 0;
const COLLECTING: usize = 1;

/// Batch-switch buffer coordinating observers with snapshot collection.
///
/// A data point's `(count, sum, estimator)` triple can only be read
/// consistently once every in-flight observer has finished publishing. This
/// buffer makes that possible without ever blocking observers: while a
/// collection is running, new observations are queued instead of applied,
/// and the collector replays them once the snapshot is built.
///
/// The buffer is a two-state machine. In `OPEN` (the default), `append`
/// declines the value and the observer applies it inline. In `COLLECTING`,
/// `append` accepts the value into a pending queue. [`run`][Self::run]
/// performs the `OPEN → COLLECTING → OPEN` cycle around a snapshot.
///
/// Every observation lands in exactly one snapshot epoch: observers that took
/// the inline path before the switch are reflected in the snapshot being
/// built, while queued observations are replayed afterwards and show up in
/// subsequent snapshots.
pub(crate) struct ObservationBuffer {
    /// Current phase, `OPEN` or `COLLECTING`.
    state: AtomicUsize,

    /// Number of observations that have taken (or been replayed through) the
    /// inline path. While `COLLECTING`, the collector waits until the data
    /// point's own count catches up with this value, at which point every
    /// inline observer has published.
    inline_observations: AtomicU64,

    /// Observations accepted while `COLLECTING`, awaiting replay.
    queued: Mutex<Vec<f64>>,

    /// Serializes collectors: at most one `run` proceeds at a time.
    collect_lock: Mutex<()>,
}

impl ObservationBuffer {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicUsize::new(OPEN),
            inline_observations: AtomicU64::new(0),
            queued: Mutex::new(Vec::new()),
            collect_lock: Mutex::new(()),
        }
    }

    /// Offers a value to the buffer.
    ///
    /// Returns `false` if the buffer is open, in which case the caller must
    /// apply the observation inline. Returns `true` if a collection is in
    /// flight and the value was queued for replay.
    pub(crate) fn append(&self, value: f64) -> bool {
        loop {
            if self.state.load(Acquire) == OPEN {
                // Claim the inline path, then re-check: a collector may have
                // switched to COLLECTING in between, and it only waits for
                // claims it can observe.
                self.inline_observations.fetch_add(1, AcqRel);
                if self.state.load(Acquire) == OPEN {
                    return false;
                }
                self.inline_observations.fetch_sub(1, AcqRel);
            }

            let mut queued = self.queued.lock().unwrap();
            // The collector reopens the buffer before draining the queue,
            // both under this lock: seeing COLLECTING here guarantees the
            // queued value will be drained by the current collection.
            if self.state.load(Acquire) != OPEN {
                queued.push(value);
                return true;
            }
        }
    }

    /// Runs a collection cycle: switches to `COLLECTING`, waits until every
    /// inline observer that is counted in `inline_observations` has published
    /// (as judged by `is_converged`, which receives the current inline count),
    /// builds the snapshot, reopens, and replays all queued values through
    /// `replay`.
    ///
    /// Observers never block on this; only the brief convergence wait spins,
    /// and it terminates because each inline observer publishes in bounded
    /// time.
    pub(crate) fn run<T>(
        &self, is_converged: impl Fn(u64) -> bool, make_snapshot: impl FnOnce() -> T, mut replay: impl FnMut(f64),
    ) -> T {
        let _guard = self.collect_lock.lock().unwrap();

        self.state.store(COLLECTING, SeqCst);

        loop {
            let inline_observations = self.inline_observations.load(Acquire);
            if is_converged(inline_observations) {
                break;
            }
            thread::yield_now();
        }

        let snapshot = make_snapshot();

        let replayable = {
            let mut queued = self.queued.lock().unwrap();
            self.state.store(OPEN, SeqCst);
            // Replayed values go through the inline path, so account for them
            // up front to keep the next collection's convergence check exact.
            self.inline_observations.fetch_add(queued.len() as u64, AcqRel);
            mem::take(&mut *queued)
        };

        for value in replayable {
            replay(value);
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering::Release;

    use super::*;

    #[test]
    fn test_open_buffer_declines() {
        let buffer = ObservationBuffer::new();
        assert!(!buffer.append(1.0));
        assert!(!buffer.append(2.0));
    }

    #[test]
    fn test_run_replays_queued_values() {
        let buffer = ObservationBuffer::new();
        let count = AtomicU64::new(0);

        // Two observations took the inline path before the collection.
        assert!(!buffer.append(1.0));
        count.fetch_add(1, Release);
        assert!(!buffer.append(2.0));
        count.fetch_add(1, Release);

        let mut replayed = Vec::new();
        let snapshot = buffer.run(
            |inline| count.load(Acquire) == inline,
            || {
                // The buffer is collecting: a concurrent observation queues.
                assert!(buffer.append(3.0));
                count.load(Acquire)
            },
            |value| replayed.push(value),
        );

        assert_eq!(snapshot, 2);
        assert_eq!(replayed, vec![3.0]);
    }

    #[test]
    fn test_replay_keeps_inline_accounting_balanced() {
        let buffer = ObservationBuffer::new();
        let count = AtomicU64::new(0);

        assert!(!buffer.append(1.0));
        count.fetch_add(1, Release);

        buffer.run(
            |inline| count.load(Acquire) == inline,
            || assert!(buffer.append(2.0)),
            |_| {
                count.fetch_add(1, Release);
            },
        );

        // The replayed value was accounted as inline; a second collection
        // must converge immediately.
        let converged = buffer.run(|inline| count.load(Acquire) == inline, || true, |_| {});
        assert!(converged);
    }

    #[test]
    fn test_reopens_after_run() {
        let buffer = ObservationBuffer::new();
        buffer.run(|_| true, || (), |_| {});
        assert!(!buffer.append(1.0));
    }
}
