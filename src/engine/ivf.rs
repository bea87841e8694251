//! IVF (inverted file): partition the space into centroids found by
//! k-means++ seeding + Lloyd iterations, then probe only the nearest
//! `n_probe` posting lists at search time.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::container::VectorStore;
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const MAX_CENTROIDS: usize = 256;
const LLOYD_ITERATIONS: usize = 10;
const DEFAULT_N_PROBE: usize = 8;
const SINGLE_CLUSTER_THRESHOLD: usize = 256;

pub struct IvfEngine {
    store: VectorStore,
    metric: Metric,
    centroids: Vec<Vec<f32>>,
    postings: Vec<Vec<i32>>,
    n_probe: usize,
    dirty: bool,
    seed: Option<u64>,
}

impl Default for IvfEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            centroids: Vec::new(),
            postings: Vec::new(),
            n_probe: DEFAULT_N_PROBE,
            dirty: false,
            seed: None,
        }
    }
}

impl IvfEngine {
    /// Construct with a fixed RNG seed, for reproducible tests. Production
    /// code leaves this unset and a fresh thread-local RNG seeds each build.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn num_centroids(n: usize) -> usize {
        ((4.0 * (n as f64).sqrt()) as usize).clamp(2, MAX_CENTROIDS)
    }

    fn kmeans_plus_plus_seed(&self, rng: &mut StdRng, k: usize) -> Vec<Vec<f32>> {
        let n = self.store.len();
        let mut centroids = Vec::with_capacity(k);
        let first = rng.gen_range(0..n) as i32;
        centroids.push(self.store.row(first).to_vec());

        let mut sq_dist_to_nearest: Vec<f32> = (0..n as i32)
            .map(|i| {
                let d = distance::squared_euclidean_unrolled(self.store.row(i), &centroids[0]);
                d
            })
            .collect();

        while centroids.len() < k {
            let total: f64 = sq_dist_to_nearest.iter().map(|&d| d as f64).sum();
            let pick = if total <= 0.0 {
                rng.gen_range(0..n)
            } else {
                let target = rng.gen_range(0.0..total);
                let mut acc = 0.0f64;
                let mut chosen = n - 1;
                for (i, &d) in sq_dist_to_nearest.iter().enumerate() {
                    acc += d as f64;
                    if acc >= target {
                        chosen = i;
                        break;
                    }
                }
                chosen
            };
            let next_centroid = self.store.row(pick as i32).to_vec();
            for (i, d) in sq_dist_to_nearest.iter_mut().enumerate() {
                let nd = distance::squared_euclidean_unrolled(self.store.row(i as i32), &next_centroid);
                if nd < *d {
                    *d = nd;
                }
            }
            centroids.push(next_centroid);
        }
        centroids
    }

    fn assign(&self, dims: usize) -> Vec<usize> {
        (0..self.store.len())
            .into_par_iter()
            .map(|i| {
                let row = self.store.row(i as i32);
                let mut best = 0usize;
                let mut best_d = f32::MAX;
                for (c, centroid) in self.centroids.iter().enumerate() {
                    let d = distance::squared_euclidean_unrolled(row, centroid);
                    if d < best_d {
                        best_d = d;
                        best = c;
                    }
                }
                let _ = dims;
                best
            })
            .collect()
    }
}

impl Engine for IvfEngine {
    fn name(&self) -> &'static str {
        "ivf"
    }

    fn build(
        &mut self,
        population: &Population,
        dims: usize,
        metric: Metric,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        cancel.check()?;
        let mut store = VectorStore::with_capacity(dims, population.len());
        for (id, values) in population.iter() {
            if values.len() != dims {
                return Err(EngineError::DimensionMismatch {
                    expected: dims,
                    actual: values.len(),
                });
            }
            store.push(id, values);
        }
        self.store = store;
        self.metric = metric;
        let n = self.store.len();

        if n == 0 {
            self.centroids.clear();
            self.postings.clear();
            self.dirty = false;
            return Ok(());
        }

        if n < SINGLE_CLUSTER_THRESHOLD {
            self.centroids = vec![self.store.row(0).to_vec()];
            self.postings = vec![(0..n as i32).collect()];
            self.dirty = false;
            return Ok(());
        }

        let k = Self::num_centroids(n);
        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        self.centroids = self.kmeans_plus_plus_seed(&mut rng, k);

        let mut assignment = self.assign(dims);
        for _ in 0..LLOYD_ITERATIONS {
            cancel.check()?;
            let mut sums = vec![vec![0.0f32; dims]; k];
            let mut counts = vec![0usize; k];
            for (i, &c) in assignment.iter().enumerate() {
                let row = self.store.row(i as i32);
                for (s, v) in sums[c].iter_mut().zip(row) {
                    *s += v;
                }
                counts[c] += 1;
            }
            for c in 0..k {
                if counts[c] > 0 {
                    for s in sums[c].iter_mut() {
                        *s /= counts[c] as f32;
                    }
                    self.centroids[c] = sums[c].clone();
                }
            }
            assignment = self.assign(dims);
        }

        let mut postings = vec![Vec::new(); k];
        for (i, &c) in assignment.iter().enumerate() {
            postings[c].push(i as i32);
        }
        self.postings = postings;
        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.store.is_empty() || k == 0 || self.centroids.is_empty() {
            return Vec::new();
        }

        let mut centroid_order: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(c, centroid)| (c, distance::distance(self.metric, query, centroid)))
            .collect();
        centroid_order.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        centroid_order.truncate(self.n_probe.max(1));

        let metric = self.metric;
        let rows: Vec<(i32, &[f32])> = centroid_order
            .iter()
            .flat_map(|&(c, _)| self.postings[c].iter().map(|&row| (row, self.store.row(row))))
            .collect();
        let mut scored = distance::compute_distances(metric, query, &rows);

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(row, d)| (self.store.id(row).to_string(), d))
            .collect()
    }

    fn needs_rebuild(&self) -> bool {
        self.dirty
    }

    fn set_needs_rebuild(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_random(n: usize, dims: usize, seed: u64) -> (IvfEngine, Vec<(String, Vec<f32>)>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Vec<(String, Vec<f32>)> = (0..n)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
                (format!("v{i}"), v)
            })
            .collect();
        let mut engine = IvfEngine::with_seed(seed);
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        engine
            .build(&borrowed, dims, Metric::Euclidean, &CancellationToken::new())
            .unwrap();
        (engine, data)
    }

    #[test]
    fn small_population_falls_back_to_single_cluster() {
        let (engine, _) = build_random(50, 16, 1);
        assert_eq!(engine.centroids.len(), 1);
    }

    #[test]
    fn large_population_builds_multiple_clusters() {
        let (engine, _) = build_random(1200, 32, 2);
        assert!(engine.centroids.len() > 1);
        assert!(engine.centroids.len() <= MAX_CENTROIDS);
    }

    #[test]
    fn search_returns_k_results() {
        let (engine, data) = build_random(1200, 32, 3);
        let results = engine.search(&data[0].1, 10);
        assert_eq!(results.len(), 10);
    }
}
