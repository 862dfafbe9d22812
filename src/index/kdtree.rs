// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Randomized kd-tree forest.
//!
//! Each tree splits at the median of a dimension drawn at random from the
//! few highest-variance dimensions of the node's points, so the trees of a
//! forest partition space differently. Leaves hold a single point.
//!
//! Search is best-bin-first: every tree is descended once toward the query,
//! the branches not taken wait in one shared min-heap ordered by the
//! accumulated squared cut distance, and the closest pending branch of any
//! tree is resumed next until the check budget is spent.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::search::{Branch, BranchHeap, SearchState};
use super::SearchStructure;
use crate::dataset::Dataset;
use crate::error::{AnnError, Result};
use crate::params::KdTreeParams;

/// Points sampled per node when estimating per-dimension variance.
const SAMPLE_MEAN: usize = 100;

/// Number of top-variance dimensions the split dimension is drawn from.
const RAND_DIM: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum KdNode {
    Leaf {
        point: usize,
    },
    Split {
        dim: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

/// One tree; nodes live in an arena with the root at slot 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KdTree {
    nodes: Vec<KdNode>,
}

/// Forest of independently randomized kd-trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KdForest {
    trees: Vec<KdTree>,
}

/// Pending kd branch: a subtree plus the largest single cut separating it from the query.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KdBranch {
    tree: usize,
    node: usize,
    bound: f64,
}

impl KdForest {
    pub(crate) fn build<R: Rng>(data: &Dataset, params: &KdTreeParams, rng: &mut R) -> Self {
        let mut ids: Vec<usize> = (0..data.rows()).collect();
        let trees = (0..params.trees)
            .map(|_| {
                ids.shuffle(rng);
                KdTree::build(data, &mut ids, rng)
            })
            .collect();
        Self { trees }
    }

    #[cfg(test)]
    pub(crate) fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Descend every tree from its root, queueing the far side of each split.
    pub(crate) fn seed<P: From<KdBranch>>(
        &self,
        data: &Dataset,
        state: &mut SearchState<'_>,
        heap: &mut BranchHeap<P>,
    ) {
        for tree in 0..self.trees.len() {
            let root = KdBranch {
                tree,
                node: 0,
                bound: 0.0,
            };
            self.descend(data, root, 0.0, state, heap);
        }
    }

    /// Continue a branch popped from the heap, unless it can no longer improve the results.
    pub(crate) fn resume<P: From<KdBranch>>(
        &self,
        data: &Dataset,
        branch: KdBranch,
        priority: f64,
        state: &mut SearchState<'_>,
        heap: &mut BranchHeap<P>,
    ) {
        if state.can_prune(branch.bound) {
            return;
        }
        self.descend(data, branch, priority, state, heap);
    }

    fn descend<P: From<KdBranch>>(
        &self,
        data: &Dataset,
        branch: KdBranch,
        priority: f64,
        state: &mut SearchState<'_>,
        heap: &mut BranchHeap<P>,
    ) {
        let nodes = &self.trees[branch.tree].nodes;
        let mut node = branch.node;
        loop {
            match nodes[node] {
                KdNode::Leaf { point } => {
                    if !state.exhausted() {
                        state.examine(data, point);
                    }
                    return;
                }
                KdNode::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let diff = state.query[dim] - value;
                    let (near, far) = if diff < 0.0 {
                        (left, right)
                    } else {
                        (right, left)
                    };
                    let cut = diff * diff;
                    let far_bound = branch.bound.max(cut);
                    if !state.can_prune(far_bound) {
                        heap.push(Branch {
                            priority: priority + cut,
                            payload: KdBranch {
                                tree: branch.tree,
                                node: far,
                                bound: far_bound,
                            }
                            .into(),
                        });
                    }
                    node = near;
                }
            }
        }
    }
}

impl SearchStructure for KdForest {
    fn search(&self, data: &Dataset, state: &mut SearchState<'_>) {
        let mut heap = BranchHeap::<KdBranch>::new();
        self.seed(data, state, &mut heap);
        while let Some(Branch { priority, payload }) = heap.pop() {
            if state.exhausted() {
                break;
            }
            self.resume(data, payload, priority, state, &mut heap);
        }
    }

    fn memory_bytes(&self) -> usize {
        self.trees
            .iter()
            .map(|t| t.nodes.len() * std::mem::size_of::<KdNode>())
            .sum()
    }

    fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        if self.trees.is_empty() {
            return Err(AnnError::CorruptIndexFile(
                "kdtree: forest has no trees".to_string(),
            ));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(rows, cols)
                .map_err(|msg| AnnError::CorruptIndexFile(format!("kdtree {}: {}", t, msg)))?;
        }
        Ok(())
    }
}

impl KdTree {
    fn build<R: Rng>(data: &Dataset, ids: &mut [usize], rng: &mut R) -> Self {
        let mut nodes = Vec::with_capacity(2 * ids.len());
        divide(data, ids, rng, &mut nodes);
        Self { nodes }
    }

    /// Every leaf must name a distinct row and every row must appear once.
    /// Children are always stored after their parent.
    fn validate(&self, rows: usize, cols: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        let mut seen = vec![false; rows];
        let mut leaves = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                KdNode::Leaf { point } => {
                    if point >= rows {
                        return Err(format!("leaf {} references row {} of {}", i, point, rows));
                    }
                    if std::mem::replace(&mut seen[point], true) {
                        return Err(format!("row {} stored twice", point));
                    }
                    leaves += 1;
                }
                KdNode::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    if dim >= cols || !value.is_finite() {
                        return Err(format!("node {} has an invalid split", i));
                    }
                    let len = self.nodes.len();
                    if left <= i || right <= i || left >= len || right >= len {
                        return Err(format!("node {} has dangling children", i));
                    }
                }
            }
        }
        if leaves != rows {
            return Err(format!("{} leaves for {} rows", leaves, rows));
        }
        Ok(())
    }
}

/// Build the subtree over `ids` and return its slot.
fn divide<R: Rng>(
    data: &Dataset,
    ids: &mut [usize],
    rng: &mut R,
    nodes: &mut Vec<KdNode>,
) -> usize {
    let slot = nodes.len();
    if ids.len() == 1 {
        nodes.push(KdNode::Leaf { point: ids[0] });
        return slot;
    }

    // Reserve the slot so the parent precedes its children
    nodes.push(KdNode::Leaf { point: usize::MAX });

    let dim = split_dimension(data, ids, rng);
    let mid = ids.len() / 2;
    ids.select_nth_unstable_by(mid, |&a, &b| data.point(a)[dim].total_cmp(&data.point(b)[dim]));
    let value = data.point(ids[mid])[dim];

    let (lower, upper) = ids.split_at_mut(mid);
    let left = divide(data, lower, rng, nodes);
    let right = divide(data, upper, rng, nodes);
    nodes[slot] = KdNode::Split {
        dim,
        value,
        left,
        right,
    };
    slot
}

/// Pick one of the `RAND_DIM` highest-variance dimensions at random.
fn split_dimension<R: Rng>(data: &Dataset, ids: &[usize], rng: &mut R) -> usize {
    let cols = data.cols();
    let sample = &ids[..ids.len().min(SAMPLE_MEAN)];
    let n = sample.len() as f64;

    let mut mean = vec![0.0; cols];
    for &id in sample {
        for (m, v) in mean.iter_mut().zip(data.point(id)) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut variance = vec![0.0; cols];
    for &id in sample {
        for ((s, v), m) in variance.iter_mut().zip(data.point(id)).zip(&mean) {
            let d = v - m;
            *s += d * d;
        }
    }

    let mut dims: Vec<usize> = (0..cols).collect();
    dims.sort_by(|&a, &b| variance[b].total_cmp(&variance[a]).then(a.cmp(&b)));
    dims[rng.gen_range(0..RAND_DIM.min(cols))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::linear::LinearScan;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn grid(n: usize) -> Dataset {
        let mut values = Vec::new();
        for i in 0..n {
            for j in 0..n {
                values.push(i as f64);
                values.push(j as f64 * 0.5);
                values.push(((i * 7 + j * 3) % 11) as f64);
            }
        }
        Dataset::new(values, n * n, 3).unwrap()
    }

    fn run<S: SearchStructure>(
        s: &S,
        data: &Dataset,
        q: &[f64],
        k: usize,
        cap: Option<usize>,
    ) -> Vec<(f64, usize)> {
        let mut state = SearchState::new(q, data.rows(), k, cap);
        s.search(data, &mut state);
        state.into_results()
    }

    #[test]
    fn test_every_tree_covers_every_row() {
        let data = grid(9);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let forest = KdForest::build(&data, &KdTreeParams::default().trees(3), &mut rng);
        assert_eq!(forest.tree_count(), 3);
        assert!(forest.validate(data.rows(), data.cols()).is_ok());
        for tree in &forest.trees {
            // n leaves and n - 1 splits
            assert_eq!(tree.nodes.len(), 2 * data.rows() - 1);
        }
    }

    #[test]
    fn test_unlimited_search_is_exact() {
        let data = grid(10);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let forest = KdForest::build(&data, &KdTreeParams::default().trees(2), &mut rng);
        for q in [[3.3, 1.1, 4.0], [-2.0, 9.0, 0.0], [5.0, 2.5, 6.0]] {
            assert_eq!(
                run(&forest, &data, &q, 7, None),
                run(&LinearScan, &data, &q, 7, None)
            );
        }
    }

    #[test]
    fn test_budget_still_returns_k() {
        let data = grid(8);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let forest = KdForest::build(&data, &KdTreeParams::default(), &mut rng);
        let found = run(&forest, &data, &[1.0, 1.0, 1.0], 10, Some(1));
        assert_eq!(found.len(), 10);
    }

    #[test]
    fn test_duplicate_points() {
        let data = Dataset::new(vec![1.0; 40], 20, 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let forest = KdForest::build(&data, &KdTreeParams::default(), &mut rng);
        assert!(forest.validate(20, 2).is_ok());
        let found = run(&forest, &data, &[1.0, 1.0], 4, None);
        assert_eq!(found, vec![(0.0, 0), (0.0, 1), (0.0, 2), (0.0, 3)]);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let data = grid(6);
        let a = KdForest::build(&data, &KdTreeParams::default(), &mut ChaCha8Rng::seed_from_u64(1));
        let b = KdForest::build(&data, &KdTreeParams::default(), &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(format!("{:?}", a), format!("{:?}", b));
    }

    #[test]
    fn test_validate_rejects_bad_leaf() {
        let data = grid(4);
        let params = KdTreeParams::default().trees(1);
        let mut forest = KdForest::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(2));
        let last = forest.trees[0].nodes.len() - 1;
        forest.trees[0].nodes[last] = KdNode::Leaf { point: 999 };
        assert!(matches!(
            forest.validate(data.rows(), data.cols()),
            Err(AnnError::CorruptIndexFile(_))
        ));
    }
}
