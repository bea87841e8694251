//! The uniform engine lifecycle and the sum-type dispatch over the nine
//! concrete ANN algorithms.
//!
//! The sum-type form is preferred over a `dyn Engine` trait object: the
//! engine kind is fixed at index creation, so a concrete enum unlocks
//! per-engine monomorphisation without paying for dynamic dispatch on
//! every search.

pub mod acorn;
pub mod flat;
pub mod hnsw;
pub mod ivf;
pub mod lsh;
pub mod nsg;
pub mod pq;
pub mod rabitq;
pub mod scann;
pub mod vamana;

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::types::{EngineKind, Metric};

/// A vector population handed to `build`: borrowed (id, values) pairs over
/// the manager's authoritative vector map. The engine never stores more than
/// it needs to answer `search`; membership truth always lives in the
/// manager.
pub type Population<'a> = [(&'a str, &'a [f32])];

/// Uniform engine lifecycle every ANN algorithm implements.
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    /// (Re)build derived structures from the full current population.
    /// Must be safely re-callable (a rebuild discards prior derived state).
    fn build(
        &mut self,
        population: &Population,
        dims: usize,
        metric: Metric,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;

    /// Mark the engine dirty. Engines in this suite do not surgically patch
    /// their indices on insert/delete — the manager's vector map is the
    /// source of truth and the engine is a derived index rebuilt lazily on
    /// the next search.
    fn insert(&mut self, _ids: &[String]) {
        self.set_needs_rebuild(true);
    }

    fn delete(&mut self, _ids: &[String]) {
        self.set_needs_rebuild(true);
    }

    /// Ascending-by-distance results, up to `k`.
    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)>;

    fn needs_rebuild(&self) -> bool;
    fn set_needs_rebuild(&mut self, dirty: bool);
}

/// Sum type over the nine concrete engines.
pub enum VectorEngine {
    Flat(flat::FlatEngine),
    Ivf(ivf::IvfEngine),
    Lsh(lsh::LshEngine),
    Pq(pq::PqEngine),
    RaBitQ(rabitq::RaBitQEngine),
    Hnsw(hnsw::HnswEngine),
    Vamana(vamana::VamanaEngine),
    Nsg(nsg::NsgEngine),
    ScaNN(scann::ScaNNEngine),
    Acorn(acorn::AcornEngine),
}

impl VectorEngine {
    pub fn new(kind: EngineKind) -> Self {
        match kind {
            EngineKind::Flat => VectorEngine::Flat(flat::FlatEngine::default()),
            EngineKind::Ivf => VectorEngine::Ivf(ivf::IvfEngine::default()),
            EngineKind::Lsh => VectorEngine::Lsh(lsh::LshEngine::default()),
            EngineKind::Pq => VectorEngine::Pq(pq::PqEngine::default()),
            EngineKind::RaBitQ => VectorEngine::RaBitQ(rabitq::RaBitQEngine::default()),
            EngineKind::Hnsw => VectorEngine::Hnsw(hnsw::HnswEngine::default()),
            EngineKind::Vamana => VectorEngine::Vamana(vamana::VamanaEngine::default()),
            EngineKind::Nsg => VectorEngine::Nsg(nsg::NsgEngine::default()),
            EngineKind::ScaNN => VectorEngine::ScaNN(scann::ScaNNEngine::default()),
            EngineKind::Acorn => VectorEngine::Acorn(acorn::AcornEngine::default()),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            VectorEngine::Flat(_) => EngineKind::Flat,
            VectorEngine::Ivf(_) => EngineKind::Ivf,
            VectorEngine::Lsh(_) => EngineKind::Lsh,
            VectorEngine::Pq(_) => EngineKind::Pq,
            VectorEngine::RaBitQ(_) => EngineKind::RaBitQ,
            VectorEngine::Hnsw(_) => EngineKind::Hnsw,
            VectorEngine::Vamana(_) => EngineKind::Vamana,
            VectorEngine::Nsg(_) => EngineKind::Nsg,
            VectorEngine::ScaNN(_) => EngineKind::ScaNN,
            VectorEngine::Acorn(_) => EngineKind::Acorn,
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            VectorEngine::Flat($inner) => $body,
            VectorEngine::Ivf($inner) => $body,
            VectorEngine::Lsh($inner) => $body,
            VectorEngine::Pq($inner) => $body,
            VectorEngine::RaBitQ($inner) => $body,
            VectorEngine::Hnsw($inner) => $body,
            VectorEngine::Vamana($inner) => $body,
            VectorEngine::Nsg($inner) => $body,
            VectorEngine::ScaNN($inner) => $body,
            VectorEngine::Acorn($inner) => $body,
        }
    };
}

impl Engine for VectorEngine {
    fn name(&self) -> &'static str {
        dispatch!(self, e => e.name())
    }

    fn build(
        &mut self,
        population: &Population,
        dims: usize,
        metric: Metric,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        dispatch!(self, e => e.build(population, dims, metric, cancel))
    }

    fn insert(&mut self, ids: &[String]) {
        dispatch!(self, e => e.insert(ids))
    }

    fn delete(&mut self, ids: &[String]) {
        dispatch!(self, e => e.delete(ids))
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        dispatch!(self, e => e.search(query, k))
    }

    fn needs_rebuild(&self) -> bool {
        dispatch!(self, e => e.needs_rebuild())
    }

    fn set_needs_rebuild(&mut self, dirty: bool) {
        dispatch!(self, e => e.set_needs_rebuild(dirty))
    }
}
