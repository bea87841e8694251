//! Product quantization: split each vector into `M` subspaces, quantize each
//! independently to a 256-centroid codebook, and score candidates with a
//! table-driven asymmetric distance computation before reranking exactly.
//!
//! The two-stage design (cheap ADC score -> exact rerank of the top `4k`) is
//! required: without the rerank, accuracy is insufficient.

use rand::rngs::StdRng;
use rand::{seq::SliceRandom, SeedableRng};

use crate::cancel::CancellationToken;
use crate::container::VectorStore;
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const DEFAULT_M: usize = 8;
const CODEBOOK_SIZE: usize = 256;
const KMEANS_ITERATIONS: usize = 10;
const RERANK_FACTOR: usize = 4;

fn largest_divisor_at_most(dims: usize, max: usize) -> usize {
    let cap = max.min(dims).max(1);
    for d in (1..=cap).rev() {
        if dims % d == 0 {
            return d;
        }
    }
    1
}

/// Simple Lloyd k-means over a subspace's sub-vectors: random-sample init,
/// then `KMEANS_ITERATIONS` reassignment/mean passes.
fn subspace_kmeans(
    rows: &[&[f32]],
    sub_dim: usize,
    k: usize,
    rng: &mut StdRng,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>, EngineError> {
    let n = rows.len();
    let k = k.min(n).max(1);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let mut centroids: Vec<Vec<f32>> = indices[..k].iter().map(|&i| rows[i].to_vec()).collect();

    for _ in 0..KMEANS_ITERATIONS {
        cancel.check()?;
        let mut sums = vec![vec![0.0f32; sub_dim]; k];
        let mut counts = vec![0usize; k];
        for &row in rows {
            let mut best = 0usize;
            let mut best_d = f32::MAX;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = distance::squared_euclidean_unrolled(row, centroid);
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            for (s, v) in sums[best].iter_mut().zip(row.iter()) {
                *s += v;
            }
            counts[best] += 1;
        }
        for c in 0..k {
            if counts[c] > 0 {
                for s in sums[c].iter_mut() {
                    *s /= counts[c] as f32;
                }
                centroids[c] = sums[c].clone();
            }
        }
    }
    Ok(centroids)
}

pub struct PqEngine {
    store: VectorStore,
    metric: Metric,
    m: usize,
    sub_dim: usize,
    codebooks: Vec<Vec<Vec<f32>>>, // [subspace][centroid][sub_dim]
    codes: Vec<Vec<u8>>,           // [row][subspace]
    dirty: bool,
    seed: Option<u64>,
}

impl Default for PqEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            m: DEFAULT_M,
            sub_dim: 0,
            codebooks: Vec::new(),
            codes: Vec::new(),
            dirty: false,
            seed: None,
        }
    }
}

impl PqEngine {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn encode(&self, v: &[f32]) -> Vec<u8> {
        (0..self.m)
            .map(|m| {
                let sub = &v[m * self.sub_dim..(m + 1) * self.sub_dim];
                let mut best = 0u8;
                let mut best_d = f32::MAX;
                for (c, centroid) in self.codebooks[m].iter().enumerate() {
                    let d = distance::squared_euclidean_unrolled(sub, centroid);
                    if d < best_d {
                        best_d = d;
                        best = c as u8;
                    }
                }
                best
            })
            .collect()
    }
}

impl Engine for PqEngine {
    fn name(&self) -> &'static str {
        "pq"
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
        self.m = largest_divisor_at_most(dims, DEFAULT_M);
        self.sub_dim = dims / self.m;

        if self.store.is_empty() {
            self.codebooks.clear();
            self.codes.clear();
            self.dirty = false;
            return Ok(());
        }

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut codebooks = Vec::with_capacity(self.m);
        for m in 0..self.m {
            cancel.check()?;
            let rows: Vec<&[f32]> = self
                .store
                .rows()
                .map(|(_, v)| &v[m * self.sub_dim..(m + 1) * self.sub_dim])
                .collect();
            codebooks.push(subspace_kmeans(&rows, self.sub_dim, CODEBOOK_SIZE, &mut rng, cancel)?);
        }
        self.codebooks = codebooks;

        self.codes = self.store.rows().map(|(_, v)| self.encode(v)).collect();
        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }

        // M x codebook_size table of query-sub-distances.
        let table: Vec<Vec<f32>> = (0..self.m)
            .map(|m| {
                let sub = &query[m * self.sub_dim..(m + 1) * self.sub_dim];
                self.codebooks[m]
                    .iter()
                    .map(|centroid| distance::squared_euclidean_unrolled(sub, centroid))
                    .collect()
            })
            .collect();

        let mut approx: Vec<(i32, f32)> = self
            .codes
            .iter()
            .enumerate()
            .map(|(row, code)| {
                let score: f32 = code.iter().enumerate().map(|(m, &c)| table[m][c as usize]).sum();
                (row as i32, score)
            })
            .collect();
        approx.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        approx.truncate((RERANK_FACTOR * k).max(k));

        let mut reranked: Vec<(i32, f32)> = approx
            .into_iter()
            .map(|(row, _)| (row, distance::distance(self.metric, query, self.store.row(row))))
            .collect();
        reranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        reranked.truncate(k);

        reranked
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
    use rand::Rng;

    #[test]
    fn m_downshifts_to_largest_divisor() {
        assert_eq!(largest_divisor_at_most(130, 8), 5);
        assert_eq!(largest_divisor_at_most(128, 8), 8);
        assert_eq!(largest_divisor_at_most(7, 8), 7);
    }

    #[test]
    fn search_returns_k_results() {
        let mut rng = StdRng::seed_from_u64(9);
        let dims = 32;
        let data: Vec<(String, Vec<f32>)> = (0..600)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
                (format!("v{i}"), v)
            })
            .collect();
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        let mut engine = PqEngine::with_seed(9);
        engine
            .build(&borrowed, dims, Metric::Euclidean, &CancellationToken::new())
            .unwrap();
        let results = engine.search(&data[0].1, 10);
        assert_eq!(results.len(), 10);
    }
}
