//! Concurrent observer/collector behavior.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use whippet_metrics::Summary;

const WRITERS: usize = 4;
const OBSERVATIONS_PER_WRITER: u64 = 20_000;

/// Observers run full tilt while a collector snapshots in a loop. Every
/// snapshot must be internally consistent, snapshot counts must never move
/// backwards, and once the observers are done the final snapshot must
/// account for every observation exactly once.
#[test]
fn test_observations_conserved_under_concurrent_collection() {
    let summary = Arc::new(
        Summary::builder("contended_latency_seconds")
            .quantile_with_error(0.5, 0.01)
            .build()
            .expect("summary should build"),
    );

    let writers_done = Arc::new(AtomicBool::new(false));

    let writers = (0..WRITERS)
        .map(|_| {
            let summary = Arc::clone(&summary);
            thread::spawn(move || {
                for _ in 0..OBSERVATIONS_PER_WRITER {
                    summary.observe(1.0).expect("summary has no labels");
                }
            })
        })
        .collect::<Vec<_>>();

    let collector = {
        let summary = Arc::clone(&summary);
        let writers_done = Arc::clone(&writers_done);
        thread::spawn(move || {
            let mut last_count = 0u64;
            let mut snapshots = 0u64;
            while !writers_done.load(Ordering::Acquire) {
                let snapshot = summary.collect();
                let point = &snapshot.data()[0];

                // Observing 1.0 only makes the sum an exact mirror of the
                // count, so any torn (count, sum) pair is visible here.
                assert_eq!(point.sum(), point.count() as f64);
                assert!(point.count() >= last_count, "snapshot count moved backwards");

                last_count = point.count();
                snapshots += 1;
            }
            snapshots
        })
    };

    for writer in writers {
        writer.join().expect("writer should not panic");
    }
    writers_done.store(true, Ordering::Release);
    let snapshots = collector.join().expect("collector should not panic");
    assert!(snapshots > 0);

    let snapshot = summary.collect();
    let point = &snapshot.data()[0];
    let expected = WRITERS as u64 * OBSERVATIONS_PER_WRITER;
    assert_eq!(point.count(), expected);
    assert_eq!(point.sum(), expected as f64);
}

/// Concurrent observers on distinct label sets land in their own data
/// points without interference.
#[test]
fn test_concurrent_observers_on_distinct_label_sets() {
    let summary = Arc::new(
        Summary::builder("sharded_latency_seconds")
            .label_names(["shard"])
            .build()
            .expect("summary should build"),
    );

    let writers = (0..WRITERS)
        .map(|shard| {
            let summary = Arc::clone(&summary);
            thread::spawn(move || {
                let shard = shard.to_string();
                for _ in 0..OBSERVATIONS_PER_WRITER {
                    summary
                        .with_label_values(&[shard.as_str()])
                        .expect("arity matches")
                        .observe(2.0);
                }
            })
        })
        .collect::<Vec<_>>();

    for writer in writers {
        writer.join().expect("writer should not panic");
    }

    let snapshot = summary.collect();
    assert_eq!(snapshot.data().len(), WRITERS);
    for point in snapshot.data() {
        assert_eq!(point.count(), OBSERVATIONS_PER_WRITER);
        assert_eq!(point.sum(), OBSERVATIONS_PER_WRITER as f64 * 2.0);
    }
}
