//! HNSW: hierarchical navigable small-world graph. Nodes are inserted one
//! at a time, each assigned a random level; a level-local beam search picks
//! neighbours at every layer up to the node's own, connected bidirectionally
//! and pruned back when a neighbour's degree exceeds `2*M`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cancel::CancellationToken;
use crate::container::{BitsetPool, MinHeap, TopKHeap, VectorStore};
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

const M: usize = 16;
const EF_SEARCH: usize = 64;
const EF_CONSTRUCTION: usize = 200;

fn level_factor() -> f64 {
    1.0 / std::f64::consts::LN_2
}

pub struct HnswEngine {
    store: VectorStore,
    metric: Metric,
    /// `adjacency[layer][node]` — empty above a node's assigned level.
    adjacency: Vec<Vec<Vec<i32>>>,
    entry_point: Option<i32>,
    max_level: usize,
    dirty: bool,
    seed: Option<u64>,
    bitsets: BitsetPool,
}

impl Default for HnswEngine {
    fn default() -> Self {
        Self {
            store: VectorStore::default(),
            metric: Metric::default(),
            adjacency: Vec::new(),
            entry_point: None,
            max_level: 0,
            dirty: false,
            seed: None,
            bitsets: BitsetPool::new(),
        }
    }
}

impl HnswEngine {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        distance::distance(self.metric, a, b)
    }

    /// Greedy ef=1 descent at a single layer, returning the closest node found.
    fn greedy_layer(&self, entry: i32, query: &[f32], layer: usize) -> i32 {
        let mut current = entry;
        let mut current_dist = self.dist(query, self.store.row(current));
        loop {
            let mut improved = false;
            for &nb in &self.adjacency[layer][current as usize] {
                let d = self.dist(query, self.store.row(nb));
                if d < current_dist {
                    current_dist = d;
                    current = nb;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Beam search at `layer` from `entry`, returning up to `ef` candidates
    /// sorted ascending by distance.
    fn search_layer(&self, entry: i32, query: &[f32], layer: usize, ef: usize) -> Vec<(i32, f32)> {
        let n = self.store.len();
        let mut visited = self.bitsets.checkout(n);
        let mut frontier = MinHeap::new();
        let mut results = TopKHeap::new(ef);

        let d0 = self.dist(query, self.store.row(entry));
        frontier.push(entry, d0);
        visited.set(entry);
        results.try_add(entry, d0);

        while let Some((node, dist)) = frontier.pop() {
            if let Some(worst) = results.worst_distance() {
                if results.is_full() && dist > worst {
                    break;
                }
            }
            for &nb in &self.adjacency[layer][node as usize] {
                if visited.test(nb) {
                    continue;
                }
                visited.set(nb);
                let d = self.dist(query, self.store.row(nb));
                if results.try_add(nb, d) || !results.is_full() {
                    frontier.push(nb, d);
                }
            }
        }
        self.bitsets.checkin(visited);
        results.into_sorted_vec()
    }

    fn connect(&mut self, node: i32, layer: usize, neighbors: &[(i32, f32)]) {
        let chosen: Vec<i32> = neighbors.iter().take(M).map(|&(id, _)| id).collect();
        self.adjacency[layer][node as usize] = chosen.clone();
        for &nb in &chosen {
            let slot = &mut self.adjacency[layer][nb as usize];
            if !slot.contains(&node) {
                slot.push(node);
            }
            if slot.len() > 2 * M {
                let nb_vec = self.store.row(nb).to_vec();
                let mut with_dist: Vec<(i32, f32)> = slot
                    .iter()
                    .map(|&c| (c, distance::distance(self.metric, &nb_vec, self.store.row(c))))
                    .collect();
                with_dist.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                with_dist.truncate(M);
                self.adjacency[layer][nb as usize] = with_dist.into_iter().map(|(c, _)| c).collect();
            }
        }
    }

    fn ensure_layers(&mut self, up_to: usize, n: usize) {
        while self.adjacency.len() <= up_to {
            self.adjacency.push(vec![Vec::new(); n]);
        }
    }
}

impl Engine for HnswEngine {
    fn name(&self) -> &'static str {
        "hnsw"
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
        self.adjacency.clear();
        self.entry_point = None;
        self.max_level = 0;

        if n == 0 {
            self.dirty = false;
            return Ok(());
        }

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let m_l = level_factor();

        self.ensure_layers(0, n);

        for i in 0..n as i32 {
            if i % 64 == 0 {
                cancel.check()?;
            }
            let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
            let level = (-u.ln() * m_l).floor() as usize;

            let Some(entry) = self.entry_point else {
                self.ensure_layers(level, n);
                self.entry_point = Some(i);
                self.max_level = level;
                continue;
            };

            let query = self.store.row(i).to_vec();
            let mut ep = entry;
            for layer in (level + 1..=self.max_level).rev() {
                ep = self.greedy_layer(ep, &query, layer);
            }

            self.ensure_layers(level, n);
            for layer in (0..=level.min(self.max_level)).rev() {
                let candidates = self.search_layer(ep, &query, layer, EF_CONSTRUCTION);
                if let Some(&(best, _)) = candidates.first() {
                    ep = best;
                }
                self.connect(i, layer, &candidates);
            }

            if level > self.max_level {
                self.max_level = level;
                self.entry_point = Some(i);
            }
        }

        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut ep = entry;
        for layer in (1..=self.max_level).rev() {
            ep = self.greedy_layer(ep, query, layer);
        }

        let ef = EF_SEARCH.max(2 * k);
        let results = self.search_layer(ep, query, 0, ef);
        results
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

    fn random_population(n: usize, dims: usize, seed: u64) -> Vec<(String, Vec<f32>)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
                (format!("v{i}"), v)
            })
            .collect()
    }

    #[test]
    fn search_finds_self() {
        let data = random_population(1000, 32, 5);
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        let mut engine = HnswEngine::with_seed(5);
        engine
            .build(&borrowed, 32, Metric::Euclidean, &CancellationToken::new())
            .unwrap();
        let results = engine.search(&data[42].1, 5);
        assert!(results.iter().any(|(id, _)| id == &data[42].0));
    }

    #[test]
    fn empty_population_search_returns_empty() {
        let engine = HnswEngine::default();
        assert!(engine.search(&[1.0, 2.0], 5).is_empty());
    }
}
