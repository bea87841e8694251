//! Run with:
//! ```bash
//! RUSTFLAGS="-C target-cpu=native" cargo bench --bench benchmark
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mizu_vector::{EngineKind, IndexSpec, Metric, SearchOptions, Vector, VectorDb};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// OpenAI text-embedding-ada-002 / text-embedding-3-small output dimension.
const DIM: usize = 1536;
/// Number of vectors in the index for the main benchmarks.
const N_VECS: usize = 10_000;
/// Fixed RNG seed for reproducible benchmarks.
const SEED: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Generate `n` random f32 vectors of dimension `dim`.
/// Using a seeded RNG ensures the benchmark data is identical across runs,
/// making benchmark comparisons statistically valid.
fn generate_random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

/// Build a `VectorDb` with one index of `engine_kind`, pre-loaded with
/// `n_vecs` random vectors of `dim`.
fn build_db(engine_kind: EngineKind, n_vecs: usize, dim: usize) -> VectorDb {
    let db = VectorDb::default();
    db.create_index(IndexSpec {
        name: "bench".to_string(),
        dimensions: dim,
        metric: Metric::Cosine,
        description: None,
        engine_kind,
    })
    .expect("create_index");

    let vecs = generate_random_vectors(n_vecs, dim, SEED);
    let batch: Vec<Vector> = vecs
        .into_iter()
        .enumerate()
        .map(|(i, v)| Vector::new(i.to_string(), v))
        .collect();
    db.insert("bench", batch).expect("insert");
    db
}

/// Measures Flat's exhaustive parallel scan: the hand-unrolled, rayon
/// `par_chunks` distance kernel over all 10,000 x 1536-dim vectors.
///
/// `black_box()` prevents the compiler from:
///   1. Hoisting the entire benchmark out of the loop (since it has no side effects).
///   2. Constant-folding the result away.
///   3. Reordering memory loads speculatively across benchmark iterations.
fn bench_search_flat(c: &mut Criterion) {
    let db = build_db(EngineKind::Flat, N_VECS, DIM);
    let query = generate_random_vectors(1, DIM, SEED + 1).remove(0);
    let mut options = SearchOptions::default();
    options.top_k = 10;

    let mut group = c.benchmark_group("search_flat");
    group.throughput(Throughput::Elements(N_VECS as u64));
    group.bench_function(
        BenchmarkId::new("exhaustive_parallel", format!("{N_VECS}vecs_dim{DIM}")),
        |b| b.iter(|| black_box(db.search("bench", black_box(&query), options.clone()).unwrap())),
    );
    group.finish();
}

/// Measures HNSW's graph search, for comparison against Flat's exhaustive
/// baseline at the same population size.
fn bench_search_hnsw(c: &mut Criterion) {
    let db = build_db(EngineKind::Hnsw, N_VECS, DIM);
    let query = generate_random_vectors(1, DIM, SEED + 1).remove(0);
    let mut options = SearchOptions::default();
    options.top_k = 10;

    let mut group = c.benchmark_group("search_hnsw");
    group.throughput(Throughput::Elements(N_VECS as u64));
    group.bench_function(
        BenchmarkId::new("graph_beam_search", format!("{N_VECS}vecs_dim{DIM}")),
        |b| b.iter(|| black_box(db.search("bench", black_box(&query), options.clone()).unwrap())),
    );
    group.finish();
}

/// Measures how Flat search latency scales from 100 to 10,000 vectors.
/// Expected: linear scaling — each added vector costs exactly one distance
/// computation. Any super-linear behavior indicates cache pressure (working
/// set exceeds L3).
fn bench_scaling(c: &mut Criterion) {
    let query = generate_random_vectors(1, DIM, SEED + 99).remove(0);
    let mut options = SearchOptions::default();
    options.top_k = 10;

    let mut group = c.benchmark_group("scaling_by_n_vecs");
    for n in [100usize, 500, 1_000, 5_000, 10_000] {
        let db = build_db(EngineKind::Flat, n, DIM);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _n| {
            b.iter(|| black_box(db.search("bench", black_box(&query), options.clone()).unwrap()))
        });
    }
    group.finish();
}

/// Measures insert throughput: this bounds the ingestion rate for live
/// workloads, since insert only stages the vector and marks the engine
/// dirty — the cost here excludes any rebuild.
fn bench_insert(c: &mut Criterion) {
    let vecs = generate_random_vectors(1, DIM, SEED);

    let mut group = c.benchmark_group("insert_throughput");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_single_vector", |b| {
        b.iter_batched(
            || {
                let db = VectorDb::default();
                db.create_index(IndexSpec {
                    name: "bench".to_string(),
                    dimensions: DIM,
                    metric: Metric::Cosine,
                    description: None,
                    engine_kind: EngineKind::Flat,
                })
                .unwrap();
                db
            },
            |db| {
                db.insert("bench", vec![Vector::new("0", vecs[0].clone())]).unwrap();
                db
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_search_flat,
    bench_search_hnsw,
    bench_scaling,
    bench_insert,
);
criterion_main!(benches);
