//! RaBitQ (binary quantization): project each normalized vector through a
//! random sparse matrix and keep only the sign of each projected component.
//! Search prefilters by Hamming distance on the packed codes, then reranks
//! the `4k` closest by exact metric distance.
//!
//! The projection matrix is reconstructible from a seed so that the
//! reranked results are deterministic for a given seed and input.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cancel::CancellationToken;
use crate::container::VectorStore;
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const RERANK_FACTOR: usize = 4;

/// Sparse ±sqrt(3/dims) projection matrix: each entry is +v with
/// probability 1/6, -v with probability 1/6, else 0.
fn build_projection(dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let v = (3.0 / dims as f64).sqrt() as f32;
    (0..dims)
        .map(|_| {
            (0..dims)
                .map(|_| {
                    let roll: f32 = rng.gen();
                    if roll < 1.0 / 6.0 {
                        v
                    } else if roll < 2.0 / 6.0 {
                        -v
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

fn project(matrix: &[Vec<f32>], v: &[f32]) -> Vec<f32> {
    matrix
        .iter()
        .map(|row| distance::dot_product_unrolled(row, v))
        .collect()
}

fn pack_bits(projected: &[f32]) -> Vec<u64> {
    let mut words = vec![0u64; projected.len().div_ceil(64)];
    for (i, &p) in projected.iter().enumerate() {
        if p >= 0.0 {
            words[i / 64] |= 1u64 << (i % 64);
        }
    }
    words
}

pub struct RaBitQEngine {
    store: VectorStore,
    metric: Metric,
    projection: Vec<Vec<f32>>,
    codes: Vec<Vec<u64>>,
    dirty: bool,
    seed: u64,
}

impl Default for RaBitQEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            projection: Vec::new(),
            codes: Vec::new(),
            dirty: false,
            seed: 0x5EED_5EED_5EED_5EED,
        }
    }
}

impl RaBitQEngine {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

impl Engine for RaBitQEngine {
    fn name(&self) -> &'static str {
        "rabitq"
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
        self.projection = build_projection(dims, self.seed);

        cancel.check()?;
        self.codes = self
            .store
            .rows()
            .map(|(_, v)| {
                let normalized = distance::normalized(v);
                let projected = project(&self.projection, &normalized);
                pack_bits(&projected)
            })
            .collect();
        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }

        let normalized_query = distance::normalized(query);
        let projected = project(&self.projection, &normalized_query);
        let query_code = pack_bits(&projected);

        let mut approx: Vec<(i32, u32)> = self
            .codes
            .iter()
            .enumerate()
            .map(|(row, code)| (row as i32, distance::hamming_distance(&query_code, code)))
            .collect();
        approx.sort_by_key(|&(_, d)| d);
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
    fn projection_is_reproducible_from_seed() {
        let a = build_projection(16, 42);
        let b = build_projection(16, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn search_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let dims = 24;
        let data: Vec<(String, Vec<f32>)> = (0..300)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
                (format!("v{i}"), v)
            })
            .collect();
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();

        let mut e1 = RaBitQEngine::with_seed(99);
        e1.build(&borrowed, dims, Metric::Cosine, &CancellationToken::new()).unwrap();
        let mut e2 = RaBitQEngine::with_seed(99);
        e2.build(&borrowed, dims, Metric::Cosine, &CancellationToken::new()).unwrap();

        let r1 = e1.search(&data[0].1, 5);
        let r2 = e2.search(&data[0].1, 5);
        assert_eq!(r1, r2);
    }
}
