// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Index configuration.
//!
//! [`IndexParams`] is a closed set of variants, one per index family, each
//! carrying its own tunables. Every parameter struct has a `Default` with the
//! engine's standard values plus builder-style setters:
//!
//! ```rust
//! use nnsearch::{IndexParams, KMeansParams, CenterInit};
//!
//! let params = IndexParams::KMeans(
//!     KMeansParams::default()
//!         .branching(16)
//!         .iterations(5)
//!         .centers_init(CenterInit::KMeansPP),
//! );
//! assert!(params.validate().is_ok());
//! ```
//!
//! The search-time effort budget is a separate [`Checks`] value passed to
//! every query.

use serde::{Deserialize, Serialize};

use crate::error::{AnnError, Result};

/// Budget used when a query asks for [`Checks::Autotuned`] on an index that
/// was not produced by autotuning.
pub const DEFAULT_CHECKS: usize = 32;

/// Largest supported LSH key, in bits.
pub const MAX_LSH_KEY_SIZE: usize = 64;

// =============================================================================
// Family tag
// =============================================================================

/// Index family tag, recorded in every built index and every index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexFamily {
    /// Exhaustive scan.
    Linear,
    /// Randomized kd-tree forest.
    KdTree,
    /// Hierarchical k-means tree.
    KMeans,
    /// kd-forest and k-means tree searched together.
    Composite,
    /// Multi-probe locality-sensitive hashing.
    Lsh,
    /// Selection procedure; never the family of a built index.
    Autotuned,
}

impl IndexFamily {
    /// Byte written to the index file header.
    pub fn tag(self) -> u8 {
        match self {
            IndexFamily::Linear => 0,
            IndexFamily::KdTree => 1,
            IndexFamily::KMeans => 2,
            IndexFamily::Composite => 3,
            IndexFamily::Lsh => 4,
            IndexFamily::Autotuned => 5,
        }
    }

    /// Inverse of [`IndexFamily::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(IndexFamily::Linear),
            1 => Some(IndexFamily::KdTree),
            2 => Some(IndexFamily::KMeans),
            3 => Some(IndexFamily::Composite),
            4 => Some(IndexFamily::Lsh),
            5 => Some(IndexFamily::Autotuned),
            _ => None,
        }
    }

    /// Lower-case name used in logs and by the CLI.
    pub fn name(self) -> &'static str {
        match self {
            IndexFamily::Linear => "linear",
            IndexFamily::KdTree => "kdtree",
            IndexFamily::KMeans => "kmeans",
            IndexFamily::Composite => "composite",
            IndexFamily::Lsh => "lsh",
            IndexFamily::Autotuned => "autotuned",
        }
    }
}

impl std::fmt::Display for IndexFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Per-family parameters
// =============================================================================

/// How k-means picks its initial centers at each tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CenterInit {
    /// Distinct points drawn uniformly at random.
    #[default]
    Random,
    /// Farthest-first traversal starting from a random point.
    Gonzales,
    /// k-means++ seeding (probability proportional to squared distance).
    KMeansPP,
}

/// Randomized kd-tree forest parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KdTreeParams {
    /// Number of independent randomized trees (≥ 1). Default: 4.
    pub trees: usize,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self { trees: 4 }
    }
}

impl KdTreeParams {
    /// Set the number of trees.
    pub fn trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.trees == 0 {
            return Err(AnnError::InvalidParams(
                "kdtree: trees must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hierarchical k-means tree parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    /// Clusters per internal node (≥ 2). Default: 32.
    pub branching: usize,
    /// Lloyd iterations per node; 0 runs until assignments stop changing. Default: 11.
    pub iterations: usize,
    /// Initial center policy. Default: [`CenterInit::Random`].
    pub centers_init: CenterInit,
    /// Cluster-boundary weight (≥ 0). Larger values explore high-variance
    /// neighbouring clusters earlier. Default: 0.2.
    pub cb_index: f64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            branching: 32,
            iterations: 11,
            centers_init: CenterInit::Random,
            cb_index: 0.2,
        }
    }
}

impl KMeansParams {
    /// Set the branching factor.
    pub fn branching(mut self, branching: usize) -> Self {
        self.branching = branching;
        self
    }

    /// Set the per-node iteration cap (0 = until convergence).
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the center initialisation policy.
    pub fn centers_init(mut self, centers_init: CenterInit) -> Self {
        self.centers_init = centers_init;
        self
    }

    /// Set the cluster-boundary weight.
    pub fn cb_index(mut self, cb_index: f64) -> Self {
        self.cb_index = cb_index;
        self
    }

    fn validate(&self, family: &str) -> Result<()> {
        if self.branching < 2 {
            return Err(AnnError::InvalidParams(format!(
                "{}: branching must be at least 2, got {}",
                family, self.branching
            )));
        }
        if !self.cb_index.is_finite() || self.cb_index < 0.0 {
            return Err(AnnError::InvalidParams(format!(
                "{}: cb_index must be finite and non-negative, got {}",
                family, self.cb_index
            )));
        }
        Ok(())
    }
}

/// Composite (kd-forest + k-means tree) parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeParams {
    /// Number of randomized kd-trees (≥ 1). Default: 4.
    pub trees: usize,
    /// Clusters per k-means node (≥ 2). Default: 32.
    pub branching: usize,
    /// Lloyd iterations per node; 0 = until convergence. Default: 11.
    pub iterations: usize,
    /// Initial center policy. Default: [`CenterInit::Random`].
    pub centers_init: CenterInit,
    /// Cluster-boundary weight (≥ 0). Default: 0.2.
    pub cb_index: f64,
}

impl Default for CompositeParams {
    fn default() -> Self {
        let kd = KdTreeParams::default();
        let km = KMeansParams::default();
        Self {
            trees: kd.trees,
            branching: km.branching,
            iterations: km.iterations,
            centers_init: km.centers_init,
            cb_index: km.cb_index,
        }
    }
}

impl CompositeParams {
    /// The kd-forest half of the composite.
    pub fn kdtree(&self) -> KdTreeParams {
        KdTreeParams { trees: self.trees }
    }

    /// The k-means half of the composite.
    pub fn kmeans(&self) -> KMeansParams {
        KMeansParams {
            branching: self.branching,
            iterations: self.iterations,
            centers_init: self.centers_init,
            cb_index: self.cb_index,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.trees == 0 {
            return Err(AnnError::InvalidParams(
                "composite: trees must be at least 1".to_string(),
            ));
        }
        self.kmeans().validate("composite")
    }
}

/// Multi-probe LSH parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LshParams {
    /// Number of hash tables (≥ 1). Default: 12.
    pub table_count: usize,
    /// Bits per hash key (1..=64). Default: 20.
    pub key_size: usize,
    /// Hamming radius of neighbouring buckets probed (0..=key_size). Default: 2.
    pub multi_probe_level: usize,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            table_count: 12,
            key_size: 20,
            multi_probe_level: 2,
        }
    }
}

impl LshParams {
    /// Set the number of tables.
    pub fn table_count(mut self, table_count: usize) -> Self {
        self.table_count = table_count;
        self
    }

    /// Set the key size in bits.
    pub fn key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    /// Set the multi-probe level.
    pub fn multi_probe_level(mut self, level: usize) -> Self {
        self.multi_probe_level = level;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.table_count == 0 {
            return Err(AnnError::InvalidParams(
                "lsh: table_count must be at least 1".to_string(),
            ));
        }
        if self.key_size == 0 || self.key_size > MAX_LSH_KEY_SIZE {
            return Err(AnnError::InvalidParams(format!(
                "lsh: key_size must be between 1 and {}, got {}",
                MAX_LSH_KEY_SIZE, self.key_size
            )));
        }
        if self.multi_probe_level > self.key_size {
            return Err(AnnError::InvalidParams(format!(
                "lsh: multi_probe_level must be at most key_size {}, got {}",
                self.key_size, self.multi_probe_level
            )));
        }
        Ok(())
    }
}

/// Autotuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutotunedParams {
    /// Required recall in [0, 1]. Default: 0.8.
    pub target_precision: f64,
    /// Weight of build time relative to search time (≥ 0). Default: 0.01.
    pub build_weight: f64,
    /// Weight of index memory relative to time (≥ 0). Default: 0.
    pub memory_weight: f64,
    /// Fraction of the dataset used for tuning, in (0, 1]. Default: 0.1.
    pub sample_fraction: f64,
}

impl Default for AutotunedParams {
    fn default() -> Self {
        Self {
            target_precision: 0.8,
            build_weight: 0.01,
            memory_weight: 0.0,
            sample_fraction: 0.1,
        }
    }
}

impl AutotunedParams {
    /// Set the target recall.
    pub fn target_precision(mut self, target: f64) -> Self {
        self.target_precision = target;
        self
    }

    /// Set the build time weight.
    pub fn build_weight(mut self, weight: f64) -> Self {
        self.build_weight = weight;
        self
    }

    /// Set the memory weight.
    pub fn memory_weight(mut self, weight: f64) -> Self {
        self.memory_weight = weight;
        self
    }

    /// Set the sampled fraction of the dataset.
    pub fn sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = fraction;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.target_precision) {
            return Err(AnnError::InvalidParams(format!(
                "autotuned: target_precision must be in [0, 1], got {}",
                self.target_precision
            )));
        }
        if !self.build_weight.is_finite() || self.build_weight < 0.0 {
            return Err(AnnError::InvalidParams(format!(
                "autotuned: build_weight must be finite and non-negative, got {}",
                self.build_weight
            )));
        }
        if !self.memory_weight.is_finite() || self.memory_weight < 0.0 {
            return Err(AnnError::InvalidParams(format!(
                "autotuned: memory_weight must be finite and non-negative, got {}",
                self.memory_weight
            )));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(AnnError::InvalidParams(format!(
                "autotuned: sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        Ok(())
    }
}

// =============================================================================
// IndexParams
// =============================================================================

/// Configuration for one index family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IndexParams {
    /// Exhaustive scan; no parameters.
    Linear,
    /// Randomized kd-tree forest.
    KdTree(KdTreeParams),
    /// Hierarchical k-means tree.
    KMeans(KMeansParams),
    /// kd-forest and k-means tree searched cooperatively.
    Composite(CompositeParams),
    /// Multi-probe LSH.
    Lsh(LshParams),
    /// Pick the best of the other families by sampling.
    Autotuned(AutotunedParams),
}

impl IndexParams {
    /// Family tag of these parameters.
    pub fn family(&self) -> IndexFamily {
        match self {
            IndexParams::Linear => IndexFamily::Linear,
            IndexParams::KdTree(_) => IndexFamily::KdTree,
            IndexParams::KMeans(_) => IndexFamily::KMeans,
            IndexParams::Composite(_) => IndexFamily::Composite,
            IndexParams::Lsh(_) => IndexFamily::Lsh,
            IndexParams::Autotuned(_) => IndexFamily::Autotuned,
        }
    }

    /// Check every parameter against its documented domain.
    ///
    /// Fails with [`AnnError::InvalidParams`] naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        match self {
            IndexParams::Linear => Ok(()),
            IndexParams::KdTree(p) => p.validate(),
            IndexParams::KMeans(p) => p.validate("kmeans"),
            IndexParams::Composite(p) => p.validate(),
            IndexParams::Lsh(p) => p.validate(),
            IndexParams::Autotuned(p) => p.validate(),
        }
    }
}

// =============================================================================
// Search budget
// =============================================================================

/// Per-query effort budget for the tree-based families.
///
/// Counts distinct dataset points examined, summed over every tree of a
/// forest (and over both halves of a composite index). Search always keeps
/// going past the budget until `k` results are held. Linear and LSH indices
/// ignore the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checks {
    /// Stop after examining this many points.
    Limited(usize),
    /// Explore every branch that could still improve the result (exact search).
    Unlimited,
    /// Use the budget found by autotuning, or [`DEFAULT_CHECKS`].
    Autotuned,
}

impl Checks {
    /// Resolve to a concrete cap; `None` means no cap.
    pub(crate) fn resolve(self, tuned: Option<usize>) -> Option<usize> {
        match self {
            Checks::Limited(n) => Some(n),
            Checks::Unlimited => None,
            Checks::Autotuned => Some(tuned.unwrap_or(DEFAULT_CHECKS)),
        }
    }
}

impl Default for Checks {
    fn default() -> Self {
        Checks::Limited(DEFAULT_CHECKS)
    }
}

impl From<usize> for Checks {
    fn from(checks: usize) -> Self {
        Checks::Limited(checks)
    }
}
