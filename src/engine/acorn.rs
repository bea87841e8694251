//! ACORN: a bounded-degree graph built from randomly sampled candidate pools
//! rather than a full nearest-neighbour search, entered from a small fixed
//! set of entry points so that predicate-restricted search (handled above
//! this layer, by the index manager) still has multiple ways into the graph.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::cancel::CancellationToken;
use crate::container::{BitsetPool, CompressedGraph, MinHeap, TopKHeap, VectorStore};
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const K_NEIGHBORS: usize = 32;
const EF_SEARCH: usize = 64;
const SAMPLE_FACTOR: usize = 4; // candidate pool per node = SAMPLE_FACTOR * K_NEIGHBORS
const MAX_DEGREE: usize = 2 * K_NEIGHBORS;
const ENTRY_POINTS: usize = 3;

pub struct AcornEngine {
    store: VectorStore,
    metric: Metric,
    graph: CompressedGraph,
    entry_points: Vec<i32>,
    dirty: bool,
    seed: Option<u64>,
    bitsets: BitsetPool,
}

impl Default for AcornEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            graph: CompressedGraph::default(),
            entry_points: Vec::new(),
            dirty: false,
            seed: None,
            bitsets: BitsetPool::new(),
        }
    }
}

impl AcornEngine {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        distance::distance(self.metric, a, b)
    }

    fn reprune_if_overfull(&mut self, node: i32) {
        if self.graph.degree(node) <= MAX_DEGREE {
            return;
        }
        let row = self.store.row(node);
        let mut candidates: Vec<(i32, f32)> = self
            .graph
            .neighbors(node)
            .iter()
            .map(|&c| (c, self.dist(row, self.store.row(c))))
            .collect();
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(MAX_DEGREE);
        self.graph
            .set_neighbors(node, candidates.into_iter().map(|(c, _)| c).collect());
    }

    /// Multi-entry-point best-first search, sharing a single visited set and
    /// frontier across all entry points so search terminates in one pass
    /// once the bounded result set stops improving.
    fn frontier_search(&self, query: &[f32], ef: usize) -> Vec<(i32, f32)> {
        let n = self.store.len();
        let mut visited = self.bitsets.checkout(n);
        let mut frontier = MinHeap::new();
        let mut results = TopKHeap::new(ef);

        for &ep in &self.entry_points {
            if visited.test(ep) {
                continue;
            }
            visited.set(ep);
            let d = self.dist(query, self.store.row(ep));
            results.try_add(ep, d);
            frontier.push(ep, d);
        }

        while let Some((node, dist)) = frontier.pop() {
            if results.is_full() {
                if let Some(worst) = results.worst_distance() {
                    if dist > worst {
                        break;
                    }
                }
            }
            for &nb in self.graph.neighbors(node) {
                if visited.test(nb) {
                    continue;
                }
                visited.set(nb);
                let d = self.dist(query, self.store.row(nb));
                results.try_add(nb, d);
                frontier.push(nb, d);
            }
        }
        self.bitsets.checkin(visited);
        results.into_sorted_vec()
    }
}

impl Engine for AcornEngine {
    fn name(&self) -> &'static str {
        "acorn"
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
        self.graph = CompressedGraph::with_capacity(n);
        self.entry_points.clear();

        if n == 0 {
            self.dirty = false;
            return Ok(());
        }

        for i in 0..n {
            let id = self.store.id(i as i32).to_string();
            self.graph.add_node(&id);
        }

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let pool_size = (SAMPLE_FACTOR * K_NEIGHBORS).min(n.saturating_sub(1)).max(1);
        for node in 0..n as i32 {
            if node % 64 == 0 {
                cancel.check()?;
            }
            let mut pool: Vec<i32> = (0..n as i32).filter(|&x| x != node).collect();
            pool.shuffle(&mut rng);
            pool.truncate(pool_size);

            let row = self.store.row(node);
            let mut scored: Vec<(i32, f32)> = pool
                .into_iter()
                .map(|c| (c, self.dist(row, self.store.row(c))))
                .collect();
            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(K_NEIGHBORS);
            let neighbors: Vec<i32> = scored.into_iter().map(|(c, _)| c).collect();

            self.graph.set_neighbors(node, neighbors.clone());
            for nb in neighbors {
                self.graph.add_edge(nb, node);
                self.reprune_if_overfull(nb);
            }
        }

        let mut ordered: Vec<i32> = (0..n as i32).collect();
        ordered.shuffle(&mut rng);
        ordered.truncate(ENTRY_POINTS.min(n));
        self.entry_points = ordered;

        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.entry_points.is_empty() || k == 0 {
            return Vec::new();
        }
        let ef = EF_SEARCH.max(2 * k);
        self.frontier_search(query, ef)
            .into_iter()
            .take(k)
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
    fn search_finds_self() {
        let mut rng = StdRng::seed_from_u64(6);
        let dims = 20;
        let data: Vec<(String, Vec<f32>)> = (0..500)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
                (format!("v{i}"), v)
            })
            .collect();
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        let mut engine = AcornEngine::with_seed(6);
        engine
            .build(&borrowed, dims, Metric::Euclidean, &CancellationToken::new())
            .unwrap();
        let results = engine.search(&data[3].1, 5);
        assert!(results.iter().any(|(id, _)| id == &data[3].0));
    }

    #[test]
    fn empty_population_search_returns_empty() {
        let engine = AcornEngine::default();
        assert!(engine.search(&[1.0, 2.0], 5).is_empty());
    }
}
