//! Flat (brute force): the accuracy baseline. Exact nearest neighbors by
//! exhaustive parallel scan.
//!
//! Every row is scored against the query through [`distance::compute_distances`],
//! which fans the scan out across rayon's pool without locking since each
//! worker owns a non-overlapping slice of the row list.

use crate::cancel::CancellationToken;
use crate::container::VectorStore;
use crate::distance;
use crate::error::EngineError;
use crate::types::Metric;

use super::{Engine, Population};

#[derive(Default)]
pub struct FlatEngine {
    store: VectorStore,
    metric: Metric,
    dirty: bool,
}

impl Engine for FlatEngine {
    fn name(&self) -> &'static str {
        "flat"
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
        self.dirty = false;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }
        let metric = self.metric;

        let rows: Vec<(i32, &[f32])> = self.store.rows().collect();
        let mut scored = distance::compute_distances(metric, query, &rows);

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
            .into_iter()
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

    fn pop() -> Vec<(String, Vec<f32>)> {
        vec![
            ("a".into(), vec![1.0, 0.0]),
            ("b".into(), vec![0.0, 1.0]),
            ("c".into(), vec![1.0, 1.0]),
        ]
    }

    #[test]
    fn exact_ordering_toy_example() {
        let data = pop();
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        let mut engine = FlatEngine::default();
        engine
            .build(&borrowed, 2, Metric::Cosine, &CancellationToken::new())
            .unwrap();
        let results = engine.search(&[1.0, 0.0], 3);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let data = vec![("v".to_string(), vec![1.0, 2.0, 3.0])];
        let borrowed: Vec<(&str, &[f32])> = data.iter().map(|(i, v)| (i.as_str(), v.as_slice())).collect();
        let mut engine = FlatEngine::default();
        let err = engine
            .build(&borrowed, 4, Metric::Cosine, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        );
    }
}
