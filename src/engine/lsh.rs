//! LSH (random hyperplane): `L` independent hash tables of `K` unit-normal
//! hyperplanes each, with multi-probe search over single-bit flips of the
//! query's hash.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::cancel::CancellationToken;
use crate::container::VectorStore;
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const L_TABLES: usize = 8;
const K_BITS: usize = 12;

struct HashTable {
    hyperplanes: Vec<Vec<f32>>, // K_BITS x dims
    buckets: HashMap<u64, Vec<i32>>,
}

impl HashTable {
    fn hash(&self, v: &[f32]) -> u64 {
        let mut h = 0u64;
        for (bit, plane) in self.hyperplanes.iter().enumerate() {
            if distance::dot_product_unrolled(plane, v) >= 0.0 {
                h |= 1u64 << bit;
            }
        }
        h
    }
}

pub struct LshEngine {
    store: VectorStore,
    metric: Metric,
    tables: Vec<HashTable>,
    dirty: bool,
    seed: Option<u64>,
}

impl Default for LshEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            tables: Vec::new(),
            dirty: false,
            seed: None,
        }
    }
}

impl LshEngine {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn exhaustive(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(i32, f32)> = self
            .store
            .rows()
            .map(|(row, v)| (row, distance::distance(self.metric, query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(row, d)| (self.store.id(row).to_string(), d))
            .collect()
    }
}

impl Engine for LshEngine {
    fn name(&self) -> &'static str {
        "lsh"
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

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut tables = Vec::with_capacity(L_TABLES);
        for _ in 0..L_TABLES {
            cancel.check()?;
            let hyperplanes: Vec<Vec<f32>> = (0..K_BITS)
                .map(|_| {
                    let mut plane: Vec<f32> = (0..dims)
                        .map(|_| StandardNormal.sample(&mut rng))
                        .collect();
                    distance::normalize_in_place(&mut plane);
                    plane
                })
                .collect();
            let mut table = HashTable {
                hyperplanes,
                buckets: HashMap::new(),
            };
            let hashes: Vec<(i32, u64)> = self.store.rows().map(|(row, v)| (row, table.hash(v))).collect();
            for (row, h) in hashes {
                table.buckets.entry(h).or_default().push(row);
            }
            tables.push(table);
        }
        self.tables = tables;
        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<i32> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for table in &self.tables {
            let h = table.hash(query);
            let mut probe_hashes = vec![h];
            for bit in 0..K_BITS {
                probe_hashes.push(h ^ (1u64 << bit));
            }
            for ph in probe_hashes {
                if let Some(bucket) = table.buckets.get(&ph) {
                    for &row in bucket {
                        if seen.insert(row) {
                            candidates.push(row);
                        }
                    }
                }
            }
        }

        if candidates.len() < k {
            return self.exhaustive(query, k);
        }

        let mut scored: Vec<(i32, f32)> = candidates
            .into_iter()
            .map(|row| (row, distance::distance(self.metric, query, self.store.row(row))))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
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
    use rand::Rng;

    fn build_random(n: usize, dims: usize, seed: u64) -> (LshEngine, Vec<(String, Vec<f32>)>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Vec<(String, Vec<f32>)> = (0..n)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
                (format!("v{i}"), v)
            })
            .collect();
        let mut engine = LshEngine::with_seed(seed);
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        engine
            .build(&borrowed, dims, Metric::Cosine, &CancellationToken::new())
            .unwrap();
        (engine, data)
    }

    #[test]
    fn search_finds_self() {
        let (engine, data) = build_random(500, 32, 7);
        let results = engine.search(&data[10].1, 5);
        assert!(!results.is_empty());
        assert!(results.iter().any(|(id, _)| id == &data[10].0));
    }

    #[test]
    fn falls_back_to_exhaustive_when_sparse() {
        let mut engine = LshEngine::with_seed(1);
        let data = vec![("only".to_string(), vec![1.0f32, 0.0, 0.0, 0.0])];
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        engine
            .build(&borrowed, 4, Metric::Cosine, &CancellationToken::new())
            .unwrap();
        let results = engine.search(&[1.0, 0.0, 0.0, 0.0], 5);
        assert_eq!(results.len(), 1);
    }
}
