//! NSG (Navigating Spreading-out Graph): a bounded-degree graph pruned by
//! strict occlusion (no candidate is kept if a closer already-selected
//! neighbour lies between it and the query), entered from the dataset's true
//! centroid's nearest point.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cancel::CancellationToken;
use crate::container::{BitsetPool, CompressedGraph, MinHeap, TopKHeap, VectorStore};
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const R: usize = 32;
const L: usize = 50;

pub struct NsgEngine {
    store: VectorStore,
    metric: Metric,
    graph: CompressedGraph,
    navigating_node: Option<i32>,
    dirty: bool,
    seed: Option<u64>,
    bitsets: BitsetPool,
}

impl Default for NsgEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            graph: CompressedGraph::default(),
            navigating_node: None,
            dirty: false,
            seed: None,
            bitsets: BitsetPool::new(),
        }
    }
}

impl NsgEngine {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        distance::distance(self.metric, a, b)
    }

    /// Nearest actual point to the coordinate-wise mean of the population.
    fn find_navigating_node(&self) -> i32 {
        let dims = self.store.dims();
        let n = self.store.len();
        let mut centroid = vec![0.0f32; dims];
        for (_, v) in self.store.rows() {
            for (c, x) in centroid.iter_mut().zip(v.iter()) {
                *c += x;
            }
        }
        for c in centroid.iter_mut() {
            *c /= n as f32;
        }

        let mut best = 0i32;
        let mut best_d = f32::MAX;
        for i in 0..n as i32 {
            let d = self.dist(&centroid, self.store.row(i));
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }

    /// Beam search over the current graph from `entry`, up to `width`
    /// candidates sorted ascending by distance to `query`.
    fn beam_search(&self, entry: i32, query: &[f32], width: usize) -> Vec<(i32, f32)> {
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

    /// Strict occlusion pruning: keep candidate `c` only if no already
    /// selected `s` is closer to `c` than `c` is to the query.
    fn occlusion_prune(&self, mut candidates: Vec<(i32, f32)>, max_r: usize) -> Vec<i32> {
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut selected: Vec<i32> = Vec::with_capacity(max_r);
        'outer: for &(c, dist_qc) in &candidates {
            if selected.len() >= max_r {
                break;
            }
            for &s in &selected {
                let dist_sc = self.dist(self.store.row(s), self.store.row(c));
                if dist_sc < dist_qc {
                    continue 'outer;
                }
            }
            selected.push(c);
        }
        selected
    }
}

impl Engine for NsgEngine {
    fn name(&self) -> &'static str {
        "nsg"
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
        self.navigating_node = None;

        if n == 0 {
            self.dirty = false;
            return Ok(());
        }

        for i in 0..n {
            let id = self.store.id(i as i32).to_string();
            self.graph.add_node(&id);
        }

        // Seed reserved for a future randomized candidate-sampling pass;
        // the current build's candidate pool comes from a deterministic
        // beam search off the navigating node.
        let _rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let navigating = self.find_navigating_node();
        self.navigating_node = Some(navigating);

        for node in 0..n as i32 {
            if node % 64 == 0 {
                cancel.check()?;
            }
            let query = self.store.row(node).to_vec();
            let mut candidates = self.beam_search(navigating, &query, 2 * L);
            candidates.retain(|&(id, _)| id != node);
            let selected = self.occlusion_prune(candidates, R);
            self.graph.set_neighbors(node, selected.clone());
            for nb in selected {
                self.graph.add_edge(nb, node);
            }
        }

        for node in 0..n as i32 {
            if self.graph.degree(node) > R {
                let row = self.store.row(node);
                let candidates: Vec<(i32, f32)> = self
                    .graph
                    .neighbors(node)
                    .iter()
                    .map(|&c| (c, self.dist(row, self.store.row(c))))
                    .collect();
                let pruned = self.occlusion_prune(candidates, R);
                self.graph.set_neighbors(node, pruned);
            }
        }

        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let Some(entry) = self.navigating_node else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }
        let width = L.max(2 * k);
        self.beam_search(entry, query, width)
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
