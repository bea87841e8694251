//! Dense visited-marker bitset, plus a pool that amortises allocation
//! across graph searches.

use parking_lot::Mutex;
use std::sync::Arc;

/// Densely packed visited marker.
#[derive(Debug, Clone)]
pub struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0u64; bits.div_ceil(64)],
        }
    }

    pub fn set(&mut self, i: i32) {
        let i = i as usize;
        self.words[i / 64] |= 1u64 << (i % 64);
    }

    pub fn test(&self, i: i32) -> bool {
        let i = i as usize;
        self.words[i / 64] & (1u64 << (i % 64)) != 0
    }

    pub fn clear(&mut self) {
        for w in self.words.iter_mut() {
            *w = 0;
        }
    }

    pub fn capacity_bits(&self) -> usize {
        self.words.len() * 64
    }
}

/// A pool of reusable [`Bitset`]s so repeated searches don't reallocate a
/// visited-marker buffer per call. `checkout`/`checkin` is the lease pattern.
#[derive(Clone)]
pub struct BitsetPool {
    inner: Arc<Mutex<Vec<Bitset>>>,
}

impl Default for BitsetPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BitsetPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Borrow a cleared bitset with at least `bits` capacity.
    pub fn checkout(&self, bits: usize) -> Bitset {
        let mut pool = self.inner.lock();
        while let Some(mut bs) = pool.pop() {
            if bs.capacity_bits() >= bits {
                bs.clear();
                return bs;
            }
        }
        Bitset::with_capacity(bits)
    }

    /// Return a bitset to the pool for reuse.
    pub fn checkin(&self, bitset: Bitset) {
        self.inner.lock().push(bitset);
    }
}
