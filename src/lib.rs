// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! # nnsearch
//!
//! Approximate nearest-neighbour search over dense `f64` vectors under
//! Euclidean distance.
//!
//! ## Features
//!
//! ### Index families
//! - **Linear** - exhaustive scan, exact
//! - **KdTree** - forest of randomized kd-trees searched best-bin-first
//! - **KMeans** - hierarchical k-means tree with cluster-boundary weighting
//! - **Composite** - kd-forest and k-means tree sharing one search budget
//! - **Lsh** - multi-probe locality-sensitive hashing
//! - **Autotuned** - picks the cheapest family and budget meeting a target recall
//!
//! ### Around the indices
//! - **[`Checks`]** - per-query effort budget trading speed for recall
//! - **[`save`] / [`load`]** - checksummed index files, written atomically
//! - **[`words::WordVectors`]** - nearest-word lookup with an on-disk index cache
//! - **[`distance`]** - the Euclidean kernels every family ranks by
//!
//! ## Architecture
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Dataset`] | Immutable, `Arc`-shared `rows × cols` point matrix |
//! | [`IndexParams`] | One parameter struct per family |
//! | [`IndexBuilder`] | Validates parameters and builds an [`Index`] |
//! | [`Index`] | Immutable, `Send + Sync` search structure bound to its dataset |
//! | [`ResultSet`] | `qrows × k` neighbour ids and distances |
//!
//! Every index keeps a handle on the dataset it was built over, so the
//! points live as long as any index needs them. Indices are never mutated
//! after construction and may be queried from any number of threads.
//!
//! ## Quick Start
//!
//! ```rust
//! use nnsearch::{build_kdtree, query, Checks, Dataset, KdTreeParams, Result};
//!
//! fn main() -> Result<()> {
//!     let points: Vec<f64> = (0..1000).map(|i| (i % 97) as f64 * 0.1).collect();
//!     let data = Dataset::new(points, 250, 4)?;
//!
//!     let index = build_kdtree(&data, KdTreeParams::default().trees(4))?;
//!
//!     let queries = Dataset::new(vec![0.5, 1.0, 1.5, 2.0], 1, 4)?;
//!     let results = query(&index, &queries, 5, Checks::Limited(64))?;
//!
//!     for hit in results.neighbors(0) {
//!         println!("row {} at distance {:.3}", hit.index, hit.distance);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Persistence
//!
//! ```rust,no_run
//! use nnsearch::{build_linear, load, save, Dataset};
//!
//! let data = Dataset::new(vec![0.0, 1.0, 2.0, 3.0], 2, 2).unwrap();
//! let index = build_linear(&data).unwrap();
//! save(&index, "points.nnix").unwrap();
//!
//! // The dataset is not stored; supply the same one again
//! let restored = load("points.nnix", &data).unwrap();
//! assert_eq!(restored.family(), index.family());
//! ```

pub mod builder;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod index;
pub mod params;
pub mod persistence;
pub mod result;
pub mod words;

pub use builder::IndexBuilder;
pub use dataset::Dataset;
pub use error::{AnnError, Result};
pub use index::{Index, TuningSummary, TUNING_NEIGHBORS};
pub use params::{
    AutotunedParams, CenterInit, Checks, CompositeParams, IndexFamily, IndexParams, KMeansParams,
    KdTreeParams, LshParams, DEFAULT_CHECKS,
};
pub use persistence::{inspect, load, load_as, save, IndexHeader, FORMAT_VERSION};
pub use result::{Neighbor, ResultSet, NO_NEIGHBOR};
pub use words::{Delimiter, WordTable, WordVectors};

/// Build an exhaustive-scan index.
pub fn build_linear(dataset: &Dataset) -> Result<Index> {
    IndexBuilder::new(IndexParams::Linear).build(dataset)
}

/// Build a randomized kd-tree forest.
pub fn build_kdtree(dataset: &Dataset, params: KdTreeParams) -> Result<Index> {
    IndexBuilder::new(IndexParams::KdTree(params)).build(dataset)
}

/// Build a hierarchical k-means tree.
pub fn build_kmeans(dataset: &Dataset, params: KMeansParams) -> Result<Index> {
    IndexBuilder::new(IndexParams::KMeans(params)).build(dataset)
}

/// Build a kd-forest plus k-means tree searched together.
pub fn build_composite(dataset: &Dataset, params: CompositeParams) -> Result<Index> {
    IndexBuilder::new(IndexParams::Composite(params)).build(dataset)
}

/// Build a multi-probe LSH index.
pub fn build_lsh(dataset: &Dataset, params: LshParams) -> Result<Index> {
    IndexBuilder::new(IndexParams::Lsh(params)).build(dataset)
}

/// Pick and build the cheapest configuration meeting `params.target_precision`.
///
/// The returned index has the winning family; [`Checks::Autotuned`] then
/// uses the budget found during tuning.
pub fn build_autotuned(dataset: &Dataset, params: AutotunedParams) -> Result<Index> {
    IndexBuilder::new(IndexParams::Autotuned(params)).build(dataset)
}

/// Query `index` with every row of `queries`. See [`Index::query`].
pub fn query(
    index: &Index,
    queries: &Dataset,
    k: usize,
    checks: impl Into<Checks>,
) -> Result<ResultSet> {
    index.query(queries, k, checks)
}
