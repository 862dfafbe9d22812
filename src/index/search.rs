// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Per-query search state shared by every index family.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::dataset::Dataset;
use crate::distance::squared_euclidean;

// =============================================================================
// Result collector
// =============================================================================

/// Candidate ordered by `(distance, id)`; the heap top is the worst kept result.
#[derive(Debug, Clone, Copy)]
struct Scored {
    dist: f64,
    id: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Keeps the `k` best `(squared distance, id)` pairs seen so far.
pub(crate) struct KnnCollector {
    k: usize,
    heap: BinaryHeap<Scored>,
}

impl KnnCollector {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    /// Offer a candidate. Callers are responsible for not offering an id twice.
    #[inline]
    pub(crate) fn add(&mut self, dist: f64, id: usize) {
        let candidate = Scored { dist, id };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if candidate < *worst {
                *worst = candidate;
            }
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Squared distance of the k-th best result, or infinity while not full.
    #[inline]
    pub(crate) fn worst(&self) -> f64 {
        if self.is_full() {
            self.heap.peek().map(|s| s.dist).unwrap_or(f64::INFINITY)
        } else {
            f64::INFINITY
        }
    }

    /// Results nearest first, ties by ascending id.
    pub(crate) fn into_sorted(self) -> Vec<(f64, usize)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|s| (s.dist, s.id))
            .collect()
    }
}

// =============================================================================
// Visited points
// =============================================================================

/// Fixed-size bitset over dataset rows.
pub(crate) struct VisitedSet {
    words: Vec<u64>,
}

impl VisitedSet {
    pub(crate) fn new(rows: usize) -> Self {
        Self {
            words: vec![0; (rows + 63) / 64],
        }
    }

    /// Mark `id`; returns true if it was not already marked.
    #[inline]
    pub(crate) fn insert(&mut self, id: usize) -> bool {
        let word = &mut self.words[id / 64];
        let bit = 1u64 << (id % 64);
        let fresh = *word & bit == 0;
        *word |= bit;
        fresh
    }
}

// =============================================================================
// Branch heap
// =============================================================================

/// Unexplored branch waiting in the best-bin-first queue.
///
/// Ordered so that `BinaryHeap` pops the *lowest* priority first.
pub(crate) struct Branch<P> {
    pub(crate) priority: f64,
    pub(crate) payload: P,
}

impl<P> PartialEq for Branch<P> {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
    }
}

impl<P> Eq for Branch<P> {}

impl<P> PartialOrd for Branch<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Branch<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: smaller priority = higher in the max-heap
        other.priority.total_cmp(&self.priority)
    }
}

pub(crate) type BranchHeap<P> = BinaryHeap<Branch<P>>;

// =============================================================================
// Search state
// =============================================================================

/// Everything one query accumulates while walking an index.
pub(crate) struct SearchState<'q> {
    pub(crate) query: &'q [f64],
    pub(crate) results: KnnCollector,
    visited: VisitedSet,
    checks: usize,
    max_checks: Option<usize>,
}

impl<'q> SearchState<'q> {
    pub(crate) fn new(query: &'q [f64], rows: usize, k: usize, max_checks: Option<usize>) -> Self {
        Self {
            query,
            results: KnnCollector::new(k),
            visited: VisitedSet::new(rows),
            checks: 0,
            max_checks,
        }
    }

    /// True once the budget is spent and `k` results are held.
    #[inline]
    pub(crate) fn exhausted(&self) -> bool {
        match self.max_checks {
            Some(max) => self.checks >= max && self.results.is_full(),
            None => false,
        }
    }

    /// True when nothing at squared distance ≥ `bound` can enter the results.
    #[inline]
    pub(crate) fn can_prune(&self, bound: f64) -> bool {
        self.results.is_full() && bound > self.results.worst()
    }

    /// Compute the distance to `id` unless it was already examined.
    #[inline]
    pub(crate) fn examine(&mut self, data: &Dataset, id: usize) {
        if self.visited.insert(id) {
            self.checks += 1;
            let dist = squared_euclidean(self.query, data.point(id));
            self.results.add(dist, id);
        }
    }

    /// Number of distinct points examined so far.
    #[cfg(test)]
    pub(crate) fn checks(&self) -> usize {
        self.checks
    }

    pub(crate) fn into_results(self) -> Vec<(f64, usize)> {
        self.results.into_sorted()
    }
}
