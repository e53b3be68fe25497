use ckms::{CkmsQuantiles, Quantile};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::SeedableRng;
use rand_distr::{Distribution, Pareto};

fn default_targets() -> Vec<Quantile> {
    vec![
        Quantile::new(0.5, 0.01).expect("target should be valid"),
        Quantile::new(0.95, 0.001).expect("target should be valid"),
        Quantile::new(0.99, 0.001).expect("target should be valid"),
    ]
}

fn insert_all(targets: &[Quantile], ns: &[f64]) -> CkmsQuantiles {
    let mut estimator = CkmsQuantiles::new(targets);
    for n in ns {
        estimator.insert(*n);
    }
    estimator
}

fn make_points(size: usize, seed: u64) -> Vec<f64> {
    // Generate a set of samples that roughly correspond to the latency of a
    // typical web service, in microseconds, with a big hump at the beginning
    // and a long tail, bottoming out at 15 milliseconds and tailing off all
    // the way up to 10 seconds.
    let distribution = Pareto::new(1.0, 1.0).expect("pareto distribution should be valid");

    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    distribution
        .sample_iter(&mut rng)
        .map(|n| n * 10_000.0)
        .filter(|n| *n > 15_000.0 && *n < 10_000_000.0)
        .take(size)
        .collect::<Vec<_>>()
}

fn bench_insert(c: &mut Criterion) {
    let sizes = [1usize, 10, 100, 1_000, 10_000, 100_000];
    let targets = default_targets();

    let mut group = c.benchmark_group("CkmsQuantiles/insert");
    for size in sizes.iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let vals = make_points(size, 0xC0FFEE);
            b.iter(|| insert_all(&targets, &vals));
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let targets = default_targets();

    let mut group = c.benchmark_group("CkmsQuantiles/query");
    for size in [100usize, 1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let vals = make_points(size, 0xC0FFEE);
            let mut estimator = insert_all(&targets, &vals);

            b.iter(|| estimator.get(0.95));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_query);
criterion_main!(benches);
