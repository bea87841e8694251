//! `VectorDb`: the public facade over a table of named indices, each
//! independently configured.

use crate::cancel::CancellationToken;
use crate::config::DbConfig;
use crate::error::{Result, VectorDbError};
use crate::manager::IndexManager;
use crate::types::{EngineKind, IndexSnapshot, IndexSpec, Match, Metric, SearchOptions, Vector};

/// Top-level embedded database handle. Cheap to construct; holds the index
/// table behind the manager's locking.
pub struct VectorDb {
    config: DbConfig,
    manager: IndexManager,
}

impl Default for VectorDb {
    fn default() -> Self {
        Self::new("")
    }
}

impl VectorDb {
    /// Construct from a configuration string (`engine=hnsw&...`); an empty
    /// or unparseable string falls back to IVF as the creation default.
    pub fn new(config_str: &str) -> Self {
        Self {
            config: DbConfig::parse(config_str),
            manager: IndexManager::new(),
        }
    }

    /// The engine kind `create_index` uses when `spec.engine_kind` is left
    /// at its type default and the caller wants the database's configured
    /// default instead. Most callers set `engine_kind` explicitly on the
    /// spec; this exists for callers building a spec incrementally.
    pub fn default_engine(&self) -> EngineKind {
        self.config.default_engine
    }

    fn validate_spec(spec: &IndexSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(VectorDbError::InvalidSpec("index name must not be empty".to_string()));
        }
        if spec.dimensions == 0 {
            return Err(VectorDbError::InvalidSpec("dimensions must be positive".to_string()));
        }
        Ok(())
    }

    pub fn create_index(&self, spec: IndexSpec) -> Result<()> {
        Self::validate_spec(&spec)?;
        self.manager.create_index(spec)
    }

    pub fn get_index(&self, name: &str) -> Result<IndexSnapshot> {
        self.manager.get_index(name)
    }

    pub fn list_indices(&self) -> Vec<IndexSnapshot> {
        self.manager.list_indices()
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        self.manager.delete_index(name)
    }

    pub fn insert(&self, index: &str, vectors: Vec<Vector>) -> Result<()> {
        self.manager.insert(index, vectors)
    }

    pub fn upsert(&self, index: &str, vectors: Vec<Vector>) -> Result<()> {
        self.manager.upsert(index, vectors)
    }

    pub fn delete(&self, index: &str, ids: &[String]) -> Result<()> {
        self.manager.delete(index, ids)
    }

    pub fn get(&self, index: &str, ids: &[String]) -> Result<Vec<Vector>> {
        self.manager.get(index, ids)
    }

    pub fn search(&self, index: &str, query: &[f32], options: SearchOptions) -> Result<Vec<Match>> {
        self.manager.search(index, query, &options, &CancellationToken::new())
    }

    /// Same as [`Self::search`] but with an explicit cancellation context,
    /// for callers enforcing a deadline on the lazy rebuild.
    pub fn search_with_cancellation(
        &self,
        index: &str,
        query: &[f32],
        options: SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>> {
        self.manager.search(index, query, &options, cancel)
    }

    pub fn ping(&self) -> Result<()> {
        self.manager.ping()
    }

    pub fn close(&self) {
        self.manager.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_spec_rejected_before_touching_table() {
        let db = VectorDb::new("engine=flat");
        let spec = IndexSpec {
            name: "bad".to_string(),
            dimensions: 0,
            metric: Metric::Cosine,
            description: None,
            engine_kind: EngineKind::Flat,
        };
        let err = db.create_index(spec).unwrap_err();
        assert_eq!(err, VectorDbError::InvalidSpec("dimensions must be positive".to_string()));
        assert!(db.get_index("bad").is_err());
    }

    #[test]
    fn configuration_string_selects_default_engine() {
        let db = VectorDb::new("engine=hnsw");
        assert_eq!(db.default_engine(), EngineKind::Hnsw);
    }

    #[test]
    fn end_to_end_create_insert_search() {
        let db = VectorDb::new("engine=flat");
        db.create_index(IndexSpec {
            name: "docs".to_string(),
            dimensions: 2,
            metric: Metric::Cosine,
            description: Some("test index".to_string()),
            engine_kind: EngineKind::Flat,
        })
        .unwrap();
        db.insert("docs", vec![Vector::new("a", vec![1.0, 0.0])]).unwrap();
        let mut options = SearchOptions::default();
        options.top_k = 1;
        let matches = db.search("docs", &[1.0, 0.0], options).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }
}
