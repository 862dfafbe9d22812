// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! kd-forest and k-means tree searched as one structure.
//!
//! Both halves push their pending branches into a single heap, share the
//! visited-point set and the check budget, and feed one result collector.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::kdtree::{KdBranch, KdForest};
use super::kmeans::{KMeansBranch, KMeansTree};
use super::search::{Branch, BranchHeap, SearchState};
use super::SearchStructure;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::params::CompositeParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CompositeForest {
    kdtree: KdForest,
    kmeans: KMeansTree,
}

enum CompositeBranch {
    Kd(KdBranch),
    KMeans(KMeansBranch),
}

impl From<KdBranch> for CompositeBranch {
    fn from(branch: KdBranch) -> Self {
        CompositeBranch::Kd(branch)
    }
}

impl From<KMeansBranch> for CompositeBranch {
    fn from(branch: KMeansBranch) -> Self {
        CompositeBranch::KMeans(branch)
    }
}

impl CompositeForest {
    pub(crate) fn build<R: Rng>(data: &Dataset, params: &CompositeParams, rng: &mut R) -> Self {
        let kdtree = KdForest::build(data, &params.kdtree(), rng);
        let kmeans = KMeansTree::build(data, &params.kmeans(), rng);
        Self { kdtree, kmeans }
    }
}

impl SearchStructure for CompositeForest {
    fn search(&self, data: &Dataset, state: &mut SearchState<'_>) {
        let mut heap = BranchHeap::<CompositeBranch>::new();
        self.kdtree.seed(data, state, &mut heap);
        self.kmeans
            .resume(data, self.kmeans.root(state.query), state, &mut heap);

        while let Some(Branch { priority, payload }) = heap.pop() {
            if state.exhausted() {
                break;
            }
            match payload {
                CompositeBranch::Kd(branch) => {
                    self.kdtree
                        .resume(data, branch, priority, state, &mut heap)
                }
                CompositeBranch::KMeans(branch) => {
                    self.kmeans.resume(data, branch, state, &mut heap)
                }
            }
        }
    }

    fn memory_bytes(&self) -> usize {
        self.kdtree.memory_bytes() + self.kmeans.memory_bytes()
    }

    fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        self.kdtree.validate(rows, cols)?;
        self.kmeans.validate(rows, cols)
    }
}
