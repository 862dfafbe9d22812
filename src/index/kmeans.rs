// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Hierarchical k-means tree.
//!
//! Every internal node clusters its points into `branching` groups with
//! Lloyd's algorithm and recurses into each group. A node with fewer than
//! `branching` points, or whose points have fewer than `branching` distinct
//! positions, becomes a leaf.
//!
//! Each node records its pivot (centroid), radius and variance. Search
//! descends toward the closest pivot and queues the siblings with priority
//! `dist²(q, pivot) - cb_index * variance`. A node is skipped when the ball
//! around its pivot cannot hold anything closer than the current k-th result.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::search::{Branch, BranchHeap, SearchState};
use super::SearchStructure;
use crate::dataset::Dataset;
use crate::distance::squared_euclidean;
use crate::error::{AnnError, Result};
use crate::params::{CenterInit, KMeansParams};

/// Lloyd rounds allowed when `iterations == 0` asks for convergence.
const MAX_CONVERGENCE_ROUNDS: usize = 10_000;

/// Relative slack applied to ball bounds to absorb rounding in `sqrt`.
const BALL_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Children {
    Points(Vec<usize>),
    Nodes(Vec<usize>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KMeansNode {
    pivot: Vec<f64>,
    radius: f64,
    variance: f64,
    size: usize,
    children: Children,
}

/// k-means tree; nodes live in an arena with the root at slot 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KMeansTree {
    nodes: Vec<KMeansNode>,
    cb_index: f64,
}

/// Pending k-means branch and a lower bound on any squared distance inside it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KMeansBranch {
    node: usize,
    bound: f64,
}

impl KMeansTree {
    pub(crate) fn build<R: Rng>(data: &Dataset, params: &KMeansParams, rng: &mut R) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            cb_index: params.cb_index,
        };
        tree.grow(data, (0..data.rows()).collect(), params, rng);
        tree
    }

    fn grow<R: Rng>(
        &mut self,
        data: &Dataset,
        ids: Vec<usize>,
        params: &KMeansParams,
        rng: &mut R,
    ) -> usize {
        let (pivot, radius, variance) = describe(data, &ids);
        let slot = self.nodes.len();
        self.nodes.push(KMeansNode {
            pivot,
            radius,
            variance,
            size: ids.len(),
            children: Children::Points(Vec::new()),
        });

        let groups = if ids.len() < params.branching {
            None
        } else {
            cluster(data, &ids, params, rng)
        };
        let children = match groups {
            None => Children::Points(ids),
            Some(groups) => Children::Nodes(
                groups
                    .into_iter()
                    .map(|group| self.grow(data, group, params, rng))
                    .collect(),
            ),
        };
        self.nodes[slot].children = children;
        slot
    }

    /// Branch for the root node.
    pub(crate) fn root(&self, query: &[f64]) -> KMeansBranch {
        KMeansBranch {
            node: 0,
            bound: self.ball_bound(0, squared_euclidean(query, &self.nodes[0].pivot)),
        }
    }

    /// Lower bound on the squared distance from a query at `dist_sq` from the
    /// pivot of `node` to any point inside it.
    fn ball_bound(&self, node: usize, dist_sq: f64) -> f64 {
        let dist = dist_sq.sqrt();
        let radius = self.nodes[node].radius;
        let gap = dist - radius - BALL_SLACK * (dist + radius);
        if gap > 0.0 {
            gap * gap
        } else {
            0.0
        }
    }

    /// Descend from a pending branch to a leaf, queueing the siblings along the way.
    pub(crate) fn resume<P: From<KMeansBranch>>(
        &self,
        data: &Dataset,
        branch: KMeansBranch,
        state: &mut SearchState<'_>,
        heap: &mut BranchHeap<P>,
    ) {
        if state.can_prune(branch.bound) {
            return;
        }
        let mut node = branch.node;
        loop {
            match &self.nodes[node].children {
                Children::Points(points) => {
                    if state.exhausted() {
                        return;
                    }
                    for &id in points {
                        state.examine(data, id);
                    }
                    return;
                }
                Children::Nodes(children) => {
                    let dists: Vec<f64> = children
                        .iter()
                        .map(|&c| squared_euclidean(state.query, &self.nodes[c].pivot))
                        .collect();
                    let best = argmin(&dists);

                    for (i, (&child, &dist)) in children.iter().zip(&dists).enumerate() {
                        if i == best {
                            continue;
                        }
                        let bound = self.ball_bound(child, dist);
                        if state.can_prune(bound) {
                            continue;
                        }
                        heap.push(Branch {
                            priority: dist - self.cb_index * self.nodes[child].variance,
                            payload: KMeansBranch { node: child, bound }.into(),
                        });
                    }

                    let next = children[best];
                    if state.can_prune(self.ball_bound(next, dists[best])) {
                        return;
                    }
                    node = next;
                }
            }
        }
    }
}

impl SearchStructure for KMeansTree {
    fn search(&self, data: &Dataset, state: &mut SearchState<'_>) {
        let mut heap = BranchHeap::<KMeansBranch>::new();
        self.resume(data, self.root(state.query), state, &mut heap);
        while let Some(Branch { payload, .. }) = heap.pop() {
            if state.exhausted() {
                break;
            }
            self.resume(data, payload, state, &mut heap);
        }
    }

    fn memory_bytes(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| {
                let children = match &n.children {
                    Children::Points(ids) | Children::Nodes(ids) => ids.len(),
                };
                std::mem::size_of::<KMeansNode>()
                    + n.pivot.len() * std::mem::size_of::<f64>()
                    + children * std::mem::size_of::<usize>()
            })
            .sum()
    }

    fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        let corrupt = |msg: String| AnnError::CorruptIndexFile(format!("kmeans: {}", msg));
        if self.nodes.is_empty() {
            return Err(corrupt("tree has no nodes".to_string()));
        }
        if !self.cb_index.is_finite() {
            return Err(corrupt("non-finite cb_index".to_string()));
        }
        let mut seen = vec![false; rows];
        let mut stored = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.pivot.len() != cols
                || !node.radius.is_finite()
                || !node.variance.is_finite()
            {
                return Err(corrupt(format!("node {} has an invalid pivot", i)));
            }
            match &node.children {
                Children::Points(ids) => {
                    for &id in ids {
                        if id >= rows {
                            return Err(corrupt(format!(
                                "node {} references row {} of {}",
                                i, id, rows
                            )));
                        }
                        if std::mem::replace(&mut seen[id], true) {
                            return Err(corrupt(format!("row {} stored twice", id)));
                        }
                    }
                    stored += ids.len();
                }
                Children::Nodes(children) => {
                    if children.is_empty()
                        || children.iter().any(|&c| c <= i || c >= self.nodes.len())
                    {
                        return Err(corrupt(format!("node {} has dangling children", i)));
                    }
                }
            }
        }
        if stored != rows {
            return Err(corrupt(format!("{} rows stored, expected {}", stored, rows)));
        }
        Ok(())
    }
}

// =============================================================================
// Clustering
// =============================================================================

/// Centroid, radius (max distance to a member) and variance (mean squared distance).
fn describe(data: &Dataset, ids: &[usize]) -> (Vec<f64>, f64, f64) {
    let mut pivot = vec![0.0; data.cols()];
    for &id in ids {
        for (p, v) in pivot.iter_mut().zip(data.point(id)) {
            *p += v;
        }
    }
    let n = ids.len() as f64;
    pivot.iter_mut().for_each(|p| *p /= n);

    // Running mean keeps the variance finite however many members there are
    let mut radius_sq: f64 = 0.0;
    let mut variance = 0.0;
    for &id in ids {
        let d = squared_euclidean(data.point(id), &pivot);
        radius_sq = radius_sq.max(d);
        variance += d / n;
    }
    (pivot, radius_sq.sqrt(), variance)
}

/// Split `ids` into `branching` non-empty groups, or `None` when the points
/// have fewer than `branching` distinct positions.
fn cluster<R: Rng>(
    data: &Dataset,
    ids: &[usize],
    params: &KMeansParams,
    rng: &mut R,
) -> Option<Vec<Vec<usize>>> {
    let k = params.branching;
    let seeds = choose_centers(data, ids, k, params.centers_init, rng);
    if seeds.len() < k {
        return None;
    }

    let mut centers: Vec<Vec<f64>> = seeds.iter().map(|&id| data.point(id).to_vec()).collect();
    let mut assignment: Vec<usize> = ids
        .iter()
        .map(|&id| nearest_center(&centers, data.point(id)))
        .collect();

    let rounds = if params.iterations == 0 {
        MAX_CONVERGENCE_ROUNDS
    } else {
        params.iterations
    };
    for _ in 0..rounds {
        refill_empty(data, ids, &mut assignment, &centers);
        update_centers(data, ids, &assignment, &mut centers);

        let mut changed = false;
        for (slot, &id) in assignment.iter_mut().zip(ids) {
            let c = nearest_center(&centers, data.point(id));
            if c != *slot {
                *slot = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    refill_empty(data, ids, &mut assignment, &centers);

    let mut groups = vec![Vec::new(); k];
    for (&c, &id) in assignment.iter().zip(ids) {
        groups[c].push(id);
    }
    Some(groups)
}

/// Up to `k` ids with pairwise distinct coordinates.
fn choose_centers<R: Rng>(
    data: &Dataset,
    ids: &[usize],
    k: usize,
    init: CenterInit,
    rng: &mut R,
) -> Vec<usize> {
    match init {
        CenterInit::Random => {
            let mut order = ids.to_vec();
            order.shuffle(rng);
            let mut chosen: Vec<usize> = Vec::with_capacity(k);
            for id in order {
                if chosen.len() == k {
                    break;
                }
                let distinct = chosen
                    .iter()
                    .all(|&c| squared_euclidean(data.point(c), data.point(id)) > 0.0);
                if distinct {
                    chosen.push(id);
                }
            }
            chosen
        }
        CenterInit::Gonzales => {
            let first = ids[rng.gen_range(0..ids.len())];
            let mut chosen = vec![first];
            let mut closest = distances_to(data, ids, first);
            while chosen.len() < k {
                let Some((pos, far)) = argmax(&closest) else {
                    break;
                };
                if far <= 0.0 {
                    break;
                }
                chosen.push(ids[pos]);
                tighten(data, ids, ids[pos], &mut closest);
            }
            chosen
        }
        CenterInit::KMeansPP => {
            let first = ids[rng.gen_range(0..ids.len())];
            let mut chosen = vec![first];
            let mut closest = distances_to(data, ids, first);
            while chosen.len() < k {
                // Weights relative to the largest, so the total cannot overflow
                let Some((_, far)) = argmax(&closest) else {
                    break;
                };
                if far <= 0.0 {
                    break;
                }
                let total: f64 = closest.iter().map(|d| d / far).sum();
                let mut target = rng.gen::<f64>() * total;
                let mut pick = None;
                for (pos, &d) in closest.iter().enumerate() {
                    let weight = d / far;
                    if weight <= 0.0 {
                        continue;
                    }
                    pick = Some(pos);
                    if target < weight {
                        break;
                    }
                    target -= weight;
                }
                let Some(pos) = pick else {
                    break;
                };
                chosen.push(ids[pos]);
                tighten(data, ids, ids[pos], &mut closest);
            }
            chosen
        }
    }
}

fn distances_to(data: &Dataset, ids: &[usize], center: usize) -> Vec<f64> {
    ids.iter()
        .map(|&id| squared_euclidean(data.point(id), data.point(center)))
        .collect()
}

fn tighten(data: &Dataset, ids: &[usize], center: usize, closest: &mut [f64]) {
    for (d, &id) in closest.iter_mut().zip(ids) {
        *d = d.min(squared_euclidean(data.point(id), data.point(center)));
    }
}

fn nearest_center(centers: &[Vec<f64>], point: &[f64]) -> usize {
    let dists: Vec<f64> = centers.iter().map(|c| squared_euclidean(point, c)).collect();
    argmin(&dists)
}

fn update_centers(data: &Dataset, ids: &[usize], assignment: &[usize], centers: &mut [Vec<f64>]) {
    let mut sums = vec![vec![0.0; data.cols()]; centers.len()];
    let mut counts = vec![0usize; centers.len()];
    for (&c, &id) in assignment.iter().zip(ids) {
        counts[c] += 1;
        for (s, v) in sums[c].iter_mut().zip(data.point(id)) {
            *s += v;
        }
    }
    for ((center, sum), &count) in centers.iter_mut().zip(sums).zip(&counts) {
        if count > 0 {
            let n = count as f64;
            for (c, s) in center.iter_mut().zip(sum) {
                *c = s / n;
            }
        }
    }
}

/// Give every empty cluster the point farthest from the center of the largest cluster.
fn refill_empty(data: &Dataset, ids: &[usize], assignment: &mut [usize], centers: &[Vec<f64>]) {
    let mut counts = vec![0usize; centers.len()];
    for &c in assignment.iter() {
        counts[c] += 1;
    }
    for empty in 0..centers.len() {
        if counts[empty] > 0 {
            continue;
        }
        let largest = (0..counts.len())
            .max_by(|&a, &b| counts[a].cmp(&counts[b]).then(b.cmp(&a)))
            .unwrap_or(0);
        if counts[largest] < 2 {
            break;
        }
        let mut farthest = None;
        let mut farthest_dist = f64::NEG_INFINITY;
        for (pos, (&c, &id)) in assignment.iter().zip(ids).enumerate() {
            if c == largest {
                let d = squared_euclidean(data.point(id), &centers[largest]);
                if d > farthest_dist {
                    farthest_dist = d;
                    farthest = Some(pos);
                }
            }
        }
        if let Some(pos) = farthest {
            assignment[pos] = empty;
            counts[largest] -= 1;
            counts[empty] += 1;
        }
    }
}

/// Index of the smallest value, lowest index on ties.
fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v < values[best] {
            best = i;
        }
    }
    best
}

/// Position and value of the largest entry, lowest index on ties.
fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best
}
