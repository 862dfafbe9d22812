// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Exhaustive scan. Exact, and the ground truth every other family is measured against.

use serde::{Deserialize, Serialize};

use super::search::SearchState;
use super::SearchStructure;
use crate::dataset::Dataset;
use crate::distance::squared_euclidean_bounded;
use crate::error::Result;

/// Brute-force search over every row. Holds no state of its own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct LinearScan;

impl SearchStructure for LinearScan {
    fn search(&self, data: &Dataset, state: &mut SearchState<'_>) {
        for (id, row) in data.iter_rows().enumerate() {
            let dist = squared_euclidean_bounded(state.query, row, state.results.worst());
            state.results.add(dist, id);
        }
    }

    fn memory_bytes(&self) -> usize {
        0
    }

    fn validate(&self, _rows: usize, _cols: usize) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_is_exact_with_ties() {
        // Points 1 and 3 are both at distance 1 from the query
        let data = Dataset::new(vec![5.0, 1.0, 9.0, -1.0, 0.5], 5, 1).unwrap();
        let q = [0.0];
        let mut state = SearchState::new(&q, data.rows(), 3, None);
        LinearScan.search(&data, &mut state);
        assert_eq!(state.into_results(), vec![(0.25, 4), (1.0, 1), (1.0, 3)]);
    }
}
