//! An embedded, in-process approximate-nearest-neighbor vector search
//! engine suite.
//!
//! [`VectorDb`] owns a table of named indices, each backed by one of nine
//! ANN algorithms behind the uniform [`engine::Engine`] trait: exhaustive
//! (Flat), partitioned (IVF), hashed (LSH), quantized (PQ, RaBitQ), and
//! graph-based (HNSW, Vamana, NSG, ACORN, ScaNN). Every index is created
//! with a fixed dimensionality, distance metric, and engine kind; vectors
//! carry an optional namespace and metadata map used to filter search
//! results after the engine returns its candidate set.
//!
//! Modules:
//! - [`container`] — the structure-of-arrays vector store, compressed
//!   graph, bounded heaps, and pooled bitset shared by every engine.
//! - [`engine`] — the engine trait and the nine concrete implementations.
//! - [`manager`] — per-index state and the ten core operations.
//! - [`db`] — the public facade over the manager.

mod cancel;
mod config;
mod container;
mod db;
mod distance;
mod engine;
mod error;
mod manager;
mod types;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub use cancel::CancellationToken;
pub use config::DbConfig;
pub use db::VectorDb;
pub use engine::Engine;
pub use error::{Result, VectorDbError};
pub use types::{
    EngineKind, IndexSnapshot, IndexSpec, Match, Metadata, MetadataValue, Metric, SearchOptions, Vector,
};
