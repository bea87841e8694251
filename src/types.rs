//! Public record shapes: [`IndexSpec`], [`Vector`], [`SearchOptions`], [`Match`].

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Distance metric an index is fixed to at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Cosine
    }
}

impl Metric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Metric::Cosine),
            "euclidean" | "squared_euclidean" => Some(Metric::Euclidean),
            "dot_product" | "dot" => Some(Metric::DotProduct),
            _ => None,
        }
    }
}

/// Which concrete ANN algorithm backs an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    Flat,
    Ivf,
    Lsh,
    Pq,
    RaBitQ,
    Hnsw,
    Vamana,
    Nsg,
    ScaNN,
    Acorn,
}

impl EngineKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(EngineKind::Flat),
            "ivf" => Some(EngineKind::Ivf),
            "lsh" => Some(EngineKind::Lsh),
            "pq" => Some(EngineKind::Pq),
            "rabitq" => Some(EngineKind::RaBitQ),
            "hnsw" => Some(EngineKind::Hnsw),
            "vamana" => Some(EngineKind::Vamana),
            "nsg" => Some(EngineKind::Nsg),
            "scann" => Some(EngineKind::ScaNN),
            "acorn" => Some(EngineKind::Acorn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Flat => "flat",
            EngineKind::Ivf => "ivf",
            EngineKind::Lsh => "lsh",
            EngineKind::Pq => "pq",
            EngineKind::RaBitQ => "rabitq",
            EngineKind::Hnsw => "hnsw",
            EngineKind::Vamana => "vamana",
            EngineKind::Nsg => "nsg",
            EngineKind::ScaNN => "scann",
            EngineKind::Acorn => "acorn",
        }
    }
}

/// A scalar metadata value attached to a stored vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MetadataValue {
    /// Canonical string form used for metadata-filter equality checks.
    pub fn canonical_string(&self) -> String {
        match self {
            MetadataValue::Str(s) => s.clone(),
            MetadataValue::Int(i) => i.to_string(),
            MetadataValue::Float(f) => f.to_string(),
            MetadataValue::Bool(b) => b.to_string(),
        }
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

/// A vector as supplied by the caller on insert/upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub id: String,
    pub values: Vec<f32>,
    pub namespace: Option<String>,
    pub metadata: Option<Metadata>,
}

impl Vector {
    pub fn new(id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            values,
            namespace: None,
            metadata: None,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub(crate) fn namespace_or_empty(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }
}

/// Creation-time, immutable description of a named index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimensions: usize,
    pub metric: Metric,
    pub description: Option<String>,
    pub engine_kind: EngineKind,
}

/// A read-only snapshot of an index's state, returned by `get_index`/`list_indices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub dimensions: usize,
    pub metric: Metric,
    pub description: Option<String>,
    pub engine_kind: EngineKind,
    pub created_at_unix_ms: u64,
    pub vector_count: usize,
}

pub(crate) fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-search request options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub top_k: usize,
    /// `None` means unrestricted. `Some("")` restricts to vectors stored
    /// with no namespace, which is itself a distinct bucket from "no filter" —
    /// it is not equivalent to leaving this `None`.
    pub namespace: Option<String>,
    pub filter: Option<Metadata>,
    pub return_values: bool,
    pub return_metadata: bool,
    /// Non-positive means "no threshold".
    pub score_threshold: Option<f32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            namespace: None,
            filter: None,
            return_values: false,
            return_metadata: false,
            score_threshold: None,
        }
    }
}

/// A single search hit assembled by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub score: f32,
    pub values: Option<Vec<f32>>,
    pub metadata: Option<Metadata>,
}
