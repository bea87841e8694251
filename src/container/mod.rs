//! Cache-conscious containers shared by every engine: a structure-of-arrays
//! vector store, a compressed graph, bounded heaps, and a pooled bitset.

pub mod bitset;
pub mod graph;
pub mod heap;
pub mod soa;

pub use bitset::{Bitset, BitsetPool};
pub use graph::CompressedGraph;
pub use heap::{MinHeap, TopKHeap};
pub use soa::VectorStore;
