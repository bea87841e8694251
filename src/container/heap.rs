//! Typed bounded min/max heaps over `(row: i32, distance: f32)`.
//!
//! A `SearchCandidate`-style type whose `Ord` impl reverses `partial_cmp`
//! to turn a max-heap `BinaryHeap` into a min-heap by distance, wrapped in
//! two purpose-built types instead of ad hoc `Ord` impls scattered per
//! engine.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    row: i32,
    distance: f32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Min-heap by distance: `pop()` yields the smallest distance first.
/// Used as the search frontier in graph engines.
#[derive(Debug, Default, Clone)]
pub struct MinHeap {
    // BinaryHeap is a max-heap; store negated candidates to get min-heap order.
    inner: BinaryHeap<std::cmp::Reverse<Candidate>>,
}

impl MinHeap {
    pub fn new() -> Self {
        Self {
            inner: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, row: i32, distance: f32) {
        self.inner.push(std::cmp::Reverse(Candidate { row, distance }));
    }

    pub fn pop(&mut self) -> Option<(i32, f32)> {
        self.inner.pop().map(|std::cmp::Reverse(c)| (c.row, c.distance))
    }

    pub fn peek(&self) -> Option<(i32, f32)> {
        self.inner.peek().map(|std::cmp::Reverse(c)| (c.row, c.distance))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Bounded max-heap by distance: keeps the `capacity` smallest distances seen
/// so far, discarding the current worst when full and a better candidate
/// arrives.
#[derive(Debug, Clone)]
pub struct TopKHeap {
    capacity: usize,
    inner: BinaryHeap<Candidate>,
}

impl TopKHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: BinaryHeap::with_capacity(capacity),
        }
    }

    /// Offer a candidate; returns `true` if it was kept (either there was
    /// room, or it beat the current worst element).
    pub fn try_add(&mut self, row: i32, distance: f32) -> bool {
        if self.inner.len() < self.capacity {
            self.inner.push(Candidate { row, distance });
            return true;
        }
        if let Some(worst) = self.inner.peek() {
            if distance < worst.distance {
                self.inner.pop();
                self.inner.push(Candidate { row, distance });
                return true;
            }
        }
        false
    }

    pub fn worst_distance(&self) -> Option<f32> {
        self.inner.peek().map(|c| c.distance)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.capacity
    }

    /// Drain into an ascending-by-distance `Vec`.
    pub fn into_sorted_vec(self) -> Vec<(i32, f32)> {
        let mut v: Vec<Candidate> = self.inner.into_vec();
        v.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        v.into_iter().map(|c| (c.row, c.distance)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_heap_pops_ascending() {
        let mut h = MinHeap::new();
        h.push(1, 5.0);
        h.push(2, 1.0);
        h.push(3, 3.0);
        assert_eq!(h.pop(), Some((2, 1.0)));
        assert_eq!(h.pop(), Some((3, 3.0)));
        assert_eq!(h.pop(), Some((1, 5.0)));
    }

    #[test]
    fn top_k_heap_keeps_smallest() {
        let mut h = TopKHeap::new(3);
        for (row, d) in [(0, 5.0), (1, 1.0), (2, 3.0), (3, 0.5), (4, 9.0)] {
            h.try_add(row, d);
        }
        let v = h.into_sorted_vec();
        let dists: Vec<f32> = v.iter().map(|(_, d)| *d).collect();
        assert_eq!(dists, vec![0.5, 1.0, 3.0]);
    }

    #[test]
    fn top_k_heap_rejects_worse_when_full() {
        let mut h = TopKHeap::new(2);
        assert!(h.try_add(0, 1.0));
        assert!(h.try_add(1, 2.0));
        assert!(!h.try_add(2, 5.0));
        assert!(h.try_add(3, 0.1));
    }
}
