//! Index manager: the authoritative per-index state (vector map, namespace
//! index, engine) and the ten operations that mutate or query it.
//!
//! One `RwLock` over the index table plus one `RwLock` per named index over
//! its vector map, namespace map, and engine state.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::cancel::CancellationToken;
use crate::engine::{Engine, VectorEngine};
use crate::error::{EngineError, Result, VectorDbError};
use crate::types::{now_unix_ms, IndexSnapshot, IndexSpec, Match, Metric, SearchOptions, Vector};

struct IndexState {
    spec: IndexSpec,
    created_at_unix_ms: u64,
    vectors: HashMap<String, Vector>,
    /// namespace -> set of ids currently in that namespace; the default
    /// (unset) namespace is tracked under the empty string.
    namespace_index: HashMap<String, HashSet<String>>,
    engine: VectorEngine,
}

impl IndexState {
    fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            name: self.spec.name.clone(),
            dimensions: self.spec.dimensions,
            metric: self.spec.metric,
            description: self.spec.description.clone(),
            engine_kind: self.spec.engine_kind,
            created_at_unix_ms: self.created_at_unix_ms,
            vector_count: self.vectors.len(),
        }
    }
}

/// Owns every named index and the ten operations from the manager contract.
#[derive(Default)]
pub struct IndexManager {
    indices: RwLock<HashMap<String, RwLock<IndexState>>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_index(&self, spec: IndexSpec) -> Result<()> {
        let _span = tracing::info_span!("create_index", index_name = %spec.name, engine_kind = spec.engine_kind.as_str()).entered();
        let mut table = self.indices.write();
        if table.contains_key(&spec.name) {
            return Err(VectorDbError::AlreadyExists(spec.name));
        }
        let engine = VectorEngine::new(spec.engine_kind);
        let state = IndexState {
            created_at_unix_ms: now_unix_ms(),
            spec,
            vectors: HashMap::new(),
            namespace_index: HashMap::new(),
            engine,
        };
        table.insert(state.spec.name.clone(), RwLock::new(state));
        Ok(())
    }

    pub fn get_index(&self, name: &str) -> Result<IndexSnapshot> {
        let table = self.indices.read();
        let lock = table.get(name).ok_or_else(|| VectorDbError::NotFound(name.to_string()))?;
        Ok(lock.read().snapshot())
    }

    pub fn list_indices(&self) -> Vec<IndexSnapshot> {
        let table = self.indices.read();
        table.values().map(|lock| lock.read().snapshot()).collect()
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        let mut table = self.indices.write();
        table
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VectorDbError::NotFound(name.to_string()))
    }

    /// Shared body for `insert`/`upsert` — the contract is identical.
    pub fn insert(&self, name: &str, vectors: Vec<Vector>) -> Result<()> {
        let _span = tracing::info_span!("insert", index_name = name, batch_len = vectors.len()).entered();
        let table = self.indices.read();
        let lock = table.get(name).ok_or_else(|| VectorDbError::NotFound(name.to_string()))?;
        let mut state = lock.write();
        let dims = state.spec.dimensions;

        let mut touched_ids = Vec::with_capacity(vectors.len());
        for vector in vectors {
            if vector.values.len() != dims {
                if !touched_ids.is_empty() {
                    state.engine.insert(&touched_ids);
                }
                return Err(VectorDbError::DimensionMismatch {
                    expected: dims,
                    actual: vector.values.len(),
                });
            }

            let new_ns = vector.namespace_or_empty().to_string();
            if let Some(old) = state.vectors.get(&vector.id) {
                let old_ns = old.namespace_or_empty().to_string();
                if old_ns != new_ns {
                    if let Some(set) = state.namespace_index.get_mut(&old_ns) {
                        set.remove(&vector.id);
                    }
                }
            }
            state.namespace_index.entry(new_ns).or_default().insert(vector.id.clone());
            touched_ids.push(vector.id.clone());
            state.vectors.insert(vector.id.clone(), vector);
        }
        state.engine.insert(&touched_ids);
        Ok(())
    }

    pub fn upsert(&self, name: &str, vectors: Vec<Vector>) -> Result<()> {
        self.insert(name, vectors)
    }

    pub fn delete(&self, name: &str, ids: &[String]) -> Result<()> {
        let _span = tracing::info_span!("delete", index_name = name, batch_len = ids.len()).entered();
        let table = self.indices.read();
        let lock = table.get(name).ok_or_else(|| VectorDbError::NotFound(name.to_string()))?;
        let mut state = lock.write();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(vector) = state.vectors.remove(id) {
                let ns = vector.namespace_or_empty().to_string();
                if let Some(set) = state.namespace_index.get_mut(&ns) {
                    set.remove(id);
                }
                removed.push(id.clone());
            }
        }
        if !removed.is_empty() {
            state.engine.delete(&removed);
        }
        Ok(())
    }

    pub fn get(&self, name: &str, ids: &[String]) -> Result<Vec<Vector>> {
        let table = self.indices.read();
        let lock = table.get(name).ok_or_else(|| VectorDbError::NotFound(name.to_string()))?;
        let state = lock.read();
        Ok(ids.iter().filter_map(|id| state.vectors.get(id).cloned()).collect())
    }

    /// The search pipeline: validate -> lazy rebuild (exclusive, double-
    /// checked) -> shared search -> per-result filter and score mapping.
    pub fn search(&self, name: &str, query: &[f32], options: &SearchOptions, cancel: &CancellationToken) -> Result<Vec<Match>> {
        let _span = tracing::info_span!("search", index_name = name, k = options.top_k).entered();
        let table = self.indices.read();
        let lock = table.get(name).ok_or_else(|| VectorDbError::NotFound(name.to_string()))?;

        {
            let state = lock.read();
            if query.len() != state.spec.dimensions {
                return Err(VectorDbError::DimensionMismatch {
                    expected: state.spec.dimensions,
                    actual: query.len(),
                });
            }
        }

        if lock.read().engine.needs_rebuild() {
            let mut state = lock.write();
            if state.engine.needs_rebuild() {
                if state.vectors.is_empty() {
                    state.engine.set_needs_rebuild(false);
                } else {
                    tracing::debug!(index_name = name, "rebuilding stale engine before search");
                    let population: Vec<(&str, &[f32])> = state
                        .vectors
                        .iter()
                        .map(|(id, v)| (id.as_str(), v.values.as_slice()))
                        .collect();
                    let dims = state.spec.dimensions;
                    let metric = state.spec.metric;
                    match state.engine.build(&population, dims, metric, cancel) {
                        Ok(()) => state.engine.set_needs_rebuild(false),
                        Err(EngineError::Cancelled) => {
                            tracing::warn!(index_name = name, "rebuild cancelled mid-search");
                            return Err(VectorDbError::Cancelled);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        let state = lock.read();
        let over_fetch = options.top_k.saturating_mul(2).max(options.top_k);
        let raw = state.engine.search(query, over_fetch);

        let mut matches = Vec::with_capacity(options.top_k.min(raw.len()));
        for (id, dist) in raw {
            if matches.len() >= options.top_k {
                break;
            }
            let Some(vector) = state.vectors.get(&id) else {
                continue;
            };
            if let Some(ns) = &options.namespace {
                if vector.namespace_or_empty() != ns.as_str() {
                    continue;
                }
            }
            if let Some(filter) = &options.filter {
                let satisfies = filter.iter().all(|(key, want)| {
                    vector
                        .metadata
                        .as_ref()
                        .and_then(|m| m.get(key))
                        .map(|have| have.canonical_string() == want.canonical_string())
                        .unwrap_or(false)
                });
                if !satisfies {
                    continue;
                }
            }

            let score = match state.spec.metric {
                Metric::Cosine => 1.0 - dist,
                Metric::Euclidean => 1.0 / (1.0 + dist),
                Metric::DotProduct => -dist,
            };
            if let Some(threshold) = options.score_threshold {
                if threshold > 0.0 && score < threshold {
                    continue;
                }
            }

            matches.push(Match {
                id: id.clone(),
                score,
                values: options.return_values.then(|| vector.values.clone()),
                metadata: options.return_metadata.then(|| vector.metadata.clone()).flatten(),
            });
        }

        tracing::info!(index_name = name, result_count = matches.len(), "search complete");
        Ok(matches)
    }

    pub fn ping(&self) -> Result<()> {
        Ok(())
    }

    pub fn close(&self) {
        self.indices.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EngineKind;

    fn spec(name: &str, engine_kind: EngineKind) -> IndexSpec {
        IndexSpec {
            name: name.to_string(),
            dimensions: 2,
            metric: Metric::Cosine,
            description: None,
            engine_kind,
        }
    }

    #[test]
    fn create_duplicate_fails() {
        let mgr = IndexManager::new();
        mgr.create_index(spec("a", EngineKind::Flat)).unwrap();
        let err = mgr.create_index(spec("a", EngineKind::Flat)).unwrap_err();
        assert_eq!(err, VectorDbError::AlreadyExists("a".to_string()));
    }

    #[test]
    fn flat_exactness_2d_toy() {
        let mgr = IndexManager::new();
        mgr.create_index(spec("toy", EngineKind::Flat)).unwrap();
        mgr.insert(
            "toy",
            vec![
                Vector::new("a", vec![1.0, 0.0]),
                Vector::new("b", vec![0.0, 1.0]),
                Vector::new("c", vec![1.0, 1.0]),
            ],
        )
        .unwrap();

        let mut options = SearchOptions::default();
        options.top_k = 3;
        let matches = mgr.search("toy", &[1.0, 0.0], &options, &CancellationToken::new()).unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((matches[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn euclidean_scoring() {
        let mut euclid_spec = spec("euclid", EngineKind::Flat);
        euclid_spec.metric = Metric::Euclidean;
        let mgr = IndexManager::new();
        mgr.create_index(euclid_spec).unwrap();
        mgr.insert(
            "euclid",
            vec![Vector::new("x", vec![0.0, 0.0]), Vector::new("y", vec![3.0, 4.0])],
        )
        .unwrap();

        let mut options = SearchOptions::default();
        options.top_k = 2;
        let matches = mgr.search("euclid", &[0.0, 0.0], &options, &CancellationToken::new()).unwrap();
        assert!((matches[0].score - 1.0).abs() < 1e-5);
        assert!((matches[1].score - (1.0 / 26.0)).abs() < 1e-4);
    }

    #[test]
    fn dot_product_sign() {
        let mut dot_spec = spec("dotted", EngineKind::Flat);
        dot_spec.dimensions = 3;
        dot_spec.metric = Metric::DotProduct;
        let mgr = IndexManager::new();
        mgr.create_index(dot_spec).unwrap();
        mgr.insert(
            "dotted",
            vec![Vector::new("p", vec![1.0, 1.0, 1.0]), Vector::new("n", vec![-1.0, -1.0, -1.0])],
        )
        .unwrap();

        let mut options = SearchOptions::default();
        options.top_k = 2;
        let matches = mgr
            .search("dotted", &[1.0, 1.0, 1.0], &options, &CancellationToken::new())
            .unwrap();
        assert_eq!(matches[0].id, "p");
        assert!((matches[0].score - 3.0).abs() < 1e-5);
        assert_eq!(matches[1].id, "n");
        assert!((matches[1].score + 3.0).abs() < 1e-5);
    }

    #[test]
    fn dimension_mismatch_on_insert_leaves_state_untouched() {
        let mut four_dim = spec("dims4", EngineKind::Flat);
        four_dim.dimensions = 4;
        let mgr = IndexManager::new();
        mgr.create_index(four_dim).unwrap();
        let err = mgr.insert("dims4", vec![Vector::new("v", vec![1.0, 2.0, 3.0])]).unwrap_err();
        assert_eq!(err, VectorDbError::DimensionMismatch { expected: 4, actual: 3 });
        assert!(mgr.get("dims4", &["v".to_string()]).unwrap().is_empty());
        assert_eq!(mgr.get_index("dims4").unwrap().vector_count, 0);
    }

    #[test]
    fn namespace_filtering() {
        let mgr = IndexManager::new();
        mgr.create_index(spec("ns", EngineKind::Flat)).unwrap();
        let mut vectors = Vec::new();
        for (i, ns) in ["a", "a", "a", "b", "b", "c"].iter().enumerate() {
            vectors.push(Vector::new(format!("v{i}"), vec![1.0, i as f32]).with_namespace(*ns));
        }
        mgr.insert("ns", vectors).unwrap();

        let mut options = SearchOptions::default();
        options.top_k = 10;
        options.namespace = Some("a".to_string());
        let matches = mgr.search("ns", &[1.0, 0.0], &options, &CancellationToken::new()).unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn upsert_replaces() {
        let mut four_dim = spec("replace", EngineKind::Flat);
        four_dim.dimensions = 4;
        let mgr = IndexManager::new();
        mgr.create_index(four_dim).unwrap();
        mgr.insert("replace", vec![Vector::new("k", vec![1.0, 0.0, 0.0, 0.0])]).unwrap();
        mgr.upsert("replace", vec![Vector::new("k", vec![0.0, 1.0, 0.0, 0.0])]).unwrap();

        let got = mgr.get("replace", &["k".to_string()]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].values, vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(mgr.get_index("replace").unwrap().vector_count, 1);
    }

    #[test]
    fn delete_removes_from_results() {
        let mgr = IndexManager::new();
        mgr.create_index(spec("del", EngineKind::Flat)).unwrap();
        mgr.insert("del", vec![Vector::new("a", vec![1.0, 0.0]), Vector::new("b", vec![0.0, 1.0])]).unwrap();
        mgr.delete("del", &["a".to_string()]).unwrap();
        assert!(mgr.get("del", &["a".to_string()]).unwrap().is_empty());

        let mut options = SearchOptions::default();
        options.top_k = 10;
        let matches = mgr.search("del", &[1.0, 0.0], &options, &CancellationToken::new()).unwrap();
        assert!(matches.iter().all(|m| m.id != "a"));
    }
}
