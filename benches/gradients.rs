//! Gradient pass and scoring benchmarks.
//!
//! - Sequential vs parallel gradient pass over many small queries
//! - Batch probabilities from a trained forest

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use fastforest::training::{
    binary_labels, CalibratorKind, FastForestConfig, FastForestTrainer, QueryBoundaries, RandomForestObjective,
    TrainingSet,
};
use fastforest::Parallelism;

// =============================================================================
// Data
// =============================================================================

fn random_ratings(n_docs: usize, seed: u64) -> Vec<f32> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    (0..n_docs).map(|_| rng.gen_range(0..5) as f32).collect()
}

fn query_bounds(n_docs: usize, query_len: usize) -> Vec<usize> {
    let mut bounds: Vec<usize> = (0..n_docs).step_by(query_len).collect();
    bounds.push(n_docs);
    bounds
}

fn random_training_set(n_docs: usize, n_features: usize, seed: u64) -> TrainingSet {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let features = Array2::from_shape_fn((n_docs, n_features), |_| rng.gen::<f32>());
    let ratings = (0..n_docs)
        .map(|r| {
            let x = features[(r, 0)] + 0.5 * features[(r, 1)];
            if x > 0.75 {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    TrainingSet::new(features, ratings).expect("valid bench data")
}

// =============================================================================
// Gradient pass
// =============================================================================

fn bench_gradient_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("objective/gradient_pass");

    for n_docs in [10_000, 100_000, 1_000_000] {
        let labels = binary_labels(&random_ratings(n_docs, 42));
        let queries = QueryBoundaries::new(query_bounds(n_docs, 50), n_docs).expect("valid bounds");
        let mut objective = RandomForestObjective::new(labels, queries, 100.0).expect("valid objective");

        group.throughput(Throughput::Elements(n_docs as u64));

        for (name, parallelism) in [
            ("sequential", Parallelism::Sequential),
            ("parallel", Parallelism::Parallel),
        ] {
            group.bench_function(BenchmarkId::new(name, n_docs), |b| {
                b.iter(|| black_box(objective.compute_gradients(parallelism).len()));
            });
        }
    }

    group.finish();
}

// =============================================================================
// Scoring
// =============================================================================

fn bench_probability_batch(c: &mut Criterion) {
    let data = random_training_set(5_000, 20, 7);
    let config = FastForestConfig::builder()
        .n_trees(50)
        .calibrator(CalibratorKind::Platt)
        .build()
        .expect("valid config");
    let model = FastForestTrainer::new(config)
        .expect("valid trainer")
        .train(&data)
        .expect("training succeeds");

    let mut group = c.benchmark_group("model/probability_batch");
    group.throughput(Throughput::Elements(data.n_docs() as u64));

    for n_threads in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("threads", n_threads), &n_threads, |b, &n_threads| {
            b.iter(|| black_box(model.probability_batch(black_box(data.features()), n_threads)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gradient_pass, bench_probability_batch);
criterion_main!(benches);
