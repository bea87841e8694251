//! Vamana (DiskANN): bounded-degree graph built by two greedy-search +
//! alpha-pruning passes from a randomly initialised graph, entered from the
//! medoid of a sampled subset.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::cancel::CancellationToken;
use crate::container::{BitsetPool, CompressedGraph, MinHeap, TopKHeap, VectorStore};
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const R: usize = 32;
const L: usize = 100;
const ALPHA: f32 = 1.2;
const MEDOID_SAMPLE: usize = 100;

pub struct VamanaEngine {
    store: VectorStore,
    metric: Metric,
    graph: CompressedGraph,
    medoid: Option<i32>,
    dirty: bool,
    seed: Option<u64>,
    bitsets: BitsetPool,
}

impl Default for VamanaEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            graph: CompressedGraph::default(),
            medoid: None,
            dirty: false,
            seed: None,
            bitsets: BitsetPool::new(),
        }
    }
}

impl VamanaEngine {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        distance::distance(self.metric, a, b)
    }

    fn compute_medoid(&self, rng: &mut StdRng) -> i32 {
        let n = self.store.len();
        let mut sample: Vec<i32> = (0..n as i32).collect();
        sample.shuffle(rng);
        sample.truncate(MEDOID_SAMPLE.min(n));

        let mut best = sample[0];
        let mut best_sum = f32::MAX;
        for &cand in &sample {
            let cand_row = self.store.row(cand);
            let sum: f32 = sample.iter().map(|&o| self.dist(cand_row, self.store.row(o))).sum();
            if sum < best_sum {
                best_sum = sum;
                best = cand;
            }
        }
        best
    }

    /// Greedy beam search over the current graph from `entry`, returning up
    /// to `width` candidates sorted ascending by distance to `query`.
    fn greedy_search(&self, entry: i32, query: &[f32], width: usize) -> Vec<(i32, f32)> {
        let n = self.store.len();
        let mut visited = self.bitsets.checkout(n);
        let mut frontier = MinHeap::new();
        let mut results = TopKHeap::new(width);

        let d0 = self.dist(query, self.store.row(entry));
        frontier.push(entry, d0);
        visited.set(entry);
        results.try_add(entry, d0);

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

    /// MRNG-style alpha-pruning: accept candidate `c` unless some already
    /// selected neighbour `s` has `dist(c,s)*alpha < dist(query,c)`.
    fn robust_prune(&self, query_row: i32, mut candidates: Vec<(i32, f32)>, max_r: usize) -> Vec<i32> {
        candidates.retain(|&(id, _)| id != query_row);
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut selected: Vec<i32> = Vec::with_capacity(max_r);
        'outer: for &(c, dist_qc) in &candidates {
            if selected.len() >= max_r {
                break;
            }
            for &s in &selected {
                let dist_cs = self.dist(self.store.row(c), self.store.row(s));
                if dist_cs * ALPHA < dist_qc {
                    continue 'outer;
                }
            }
            selected.push(c);
        }
        selected
    }

    fn add_with_reverse(&mut self, node: i32, neighbors: Vec<i32>) {
        self.graph.set_neighbors(node, neighbors.clone());
        for nb in neighbors {
            self.graph.add_edge(nb, node);
            if self.graph.degree(nb) > R {
                let nb_row = nb;
                let candidates: Vec<(i32, f32)> = self
                    .graph
                    .neighbors(nb)
                    .iter()
                    .map(|&c| (c, self.dist(self.store.row(nb_row), self.store.row(c))))
                    .collect();
                let pruned = self.robust_prune(nb, candidates, R);
                self.graph.set_neighbors(nb, pruned);
            }
        }
    }
}

impl Engine for VamanaEngine {
    fn name(&self) -> &'static str {
        "vamana"
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
        self.medoid = None;

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

        // Random initial graph: R/2 distinct neighbours per node.
        for i in 0..n as i32 {
            let mut candidates: Vec<i32> = (0..n as i32).filter(|&x| x != i).collect();
            candidates.shuffle(&mut rng);
            candidates.truncate((R / 2).min(n.saturating_sub(1)));
            self.graph.set_neighbors(i, candidates);
        }

        self.medoid = Some(self.compute_medoid(&mut rng));
        let medoid = self.medoid.unwrap();

        for pass in 0..2 {
            cancel.check()?;
            let mut order: Vec<i32> = (0..n as i32).collect();
            if pass == 1 {
                order.shuffle(&mut rng);
            }
            for (idx, &node) in order.iter().enumerate() {
                if idx % 64 == 0 {
                    cancel.check()?;
                }
                let query = self.store.row(node).to_vec();
                let candidates = self.greedy_search(medoid, &query, L);
                let pruned = self.robust_prune(node, candidates, R);
                self.add_with_reverse(node, pruned);
            }
        }

        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let Some(medoid) = self.medoid else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }
        let width = L.max(2 * k);
        self.greedy_search(medoid, query, width)
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
