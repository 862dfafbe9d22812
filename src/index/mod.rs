// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Index families and the immutable [`Index`] handle.
//!
//! | Family | Structure | Honors `checks` |
//! |--------|-----------|-----------------|
//! | Linear | exhaustive scan | no |
//! | KdTree | randomized kd-forest | yes |
//! | KMeans | hierarchical k-means tree | yes |
//! | Composite | kd-forest + k-means tree, one heap | yes |
//! | Lsh | multi-probe hash tables | no |
//!
//! Autotuning picks one of these and returns an ordinary index of that
//! family.

pub(crate) mod autotune;
mod composite;
mod kdtree;
mod kmeans;
mod linear;
mod lsh;
pub(crate) mod search;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::{check_magnitude, Dataset};
use crate::error::{AnnError, Result};
use crate::params::{Checks, IndexFamily, IndexParams};
use crate::result::{Neighbor, ResultSet};

pub use autotune::{TuningSummary, TUNING_NEIGHBORS};

use composite::CompositeForest;
use kdtree::KdForest;
use kmeans::KMeansTree;
use linear::LinearScan;
use lsh::LshTables;
use search::SearchState;

/// Behaviour shared by every built search structure.
pub(crate) trait SearchStructure {
    /// Walk the structure for `state.query`, feeding candidates into `state`.
    fn search(&self, data: &Dataset, state: &mut SearchState<'_>);

    /// Bytes held by the structure itself, excluding the dataset.
    fn memory_bytes(&self) -> usize;

    /// Check a deserialized structure against the dataset shape.
    fn validate(&self, rows: usize, cols: usize) -> Result<()>;
}

/// Built structure of one concrete family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Structure {
    Linear(LinearScan),
    KdTree(KdForest),
    KMeans(KMeansTree),
    Composite(CompositeForest),
    Lsh(LshTables),
}

impl Structure {
    /// Build the structure for concrete (non-autotuned) parameters.
    pub(crate) fn build<R: Rng>(params: &IndexParams, data: &Dataset, rng: &mut R) -> Result<Self> {
        Ok(match params {
            IndexParams::Linear => Structure::Linear(LinearScan),
            IndexParams::KdTree(p) => Structure::KdTree(KdForest::build(data, p, rng)),
            IndexParams::KMeans(p) => Structure::KMeans(KMeansTree::build(data, p, rng)),
            IndexParams::Composite(p) => {
                Structure::Composite(CompositeForest::build(data, p, rng))
            }
            IndexParams::Lsh(p) => Structure::Lsh(LshTables::build(data, p, rng)),
            IndexParams::Autotuned(_) => {
                return Err(AnnError::InvalidParams(
                    "autotuned parameters have no structure of their own".to_string(),
                ))
            }
        })
    }

    pub(crate) fn family(&self) -> IndexFamily {
        match self {
            Structure::Linear(_) => IndexFamily::Linear,
            Structure::KdTree(_) => IndexFamily::KdTree,
            Structure::KMeans(_) => IndexFamily::KMeans,
            Structure::Composite(_) => IndexFamily::Composite,
            Structure::Lsh(_) => IndexFamily::Lsh,
        }
    }

    /// True for the tree families, whose recall depends on the check budget.
    pub(crate) fn uses_checks(&self) -> bool {
        matches!(
            self,
            Structure::KdTree(_) | Structure::KMeans(_) | Structure::Composite(_)
        )
    }

    fn as_search(&self) -> &dyn SearchStructure {
        match self {
            Structure::Linear(s) => s,
            Structure::KdTree(s) => s,
            Structure::KMeans(s) => s,
            Structure::Composite(s) => s,
            Structure::Lsh(s) => s,
        }
    }

    /// `k` nearest rows of `data` as `(squared distance, id)`, nearest first.
    pub(crate) fn search(
        &self,
        data: &Dataset,
        query: &[f64],
        k: usize,
        max_checks: Option<usize>,
    ) -> Vec<(f64, usize)> {
        let mut state = SearchState::new(query, data.rows(), k, max_checks);
        self.as_search().search(data, &mut state);
        state.into_results()
    }

    pub(crate) fn memory_bytes(&self) -> usize {
        self.as_search().memory_bytes()
    }

    pub(crate) fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        self.as_search().validate(rows, cols)
    }
}

/// An immutable, queryable nearest-neighbour index.
///
/// An `Index` keeps a shared handle on the [`Dataset`] it was built over, so
/// the points stay alive and unchanged for its whole lifetime. It is
/// `Send + Sync`: any number of threads may query it concurrently.
///
/// # Example
///
/// ```rust
/// use nnsearch::{Checks, Dataset, IndexBuilder, IndexParams, KdTreeParams};
///
/// let data = Dataset::new((0..200).map(|i| (i % 17) as f64).collect(), 100, 2).unwrap();
/// let index = IndexBuilder::new(IndexParams::KdTree(KdTreeParams::default()))
///     .seed(7)
///     .build(&data)
///     .unwrap();
///
/// let hits = index.knn(&[3.0, 4.0], 3, Checks::Unlimited).unwrap();
/// assert_eq!(hits.len(), 3);
/// assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
/// ```
#[derive(Debug, Clone)]
pub struct Index {
    dataset: Dataset,
    params: IndexParams,
    structure: Structure,
    tuning: Option<TuningSummary>,
}

impl Index {
    pub(crate) fn from_parts(
        dataset: Dataset,
        params: IndexParams,
        structure: Structure,
        tuning: Option<TuningSummary>,
    ) -> Self {
        Self {
            dataset,
            params,
            structure,
            tuning,
        }
    }

    /// Family of the built structure. Never [`IndexFamily::Autotuned`].
    pub fn family(&self) -> IndexFamily {
        self.structure.family()
    }

    /// Parameters the structure was built with. For an autotuned index these
    /// are the winning candidate's parameters.
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Point dimension.
    pub fn dim(&self) -> usize {
        self.dataset.cols()
    }

    /// Number of indexed points.
    pub fn rows(&self) -> usize {
        self.dataset.rows()
    }

    /// The dataset this index searches.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Outcome of autotuning, if this index was produced by it.
    pub fn tuning(&self) -> Option<&TuningSummary> {
        self.tuning.as_ref()
    }

    /// Check budget chosen by autotuning, used by [`Checks::Autotuned`].
    pub fn tuned_checks(&self) -> Option<usize> {
        self.tuning.as_ref().and_then(|t| t.checks)
    }

    /// Bytes held by the search structure, excluding the dataset.
    pub fn memory_bytes(&self) -> usize {
        self.structure.memory_bytes()
    }

    pub(crate) fn structure(&self) -> &Structure {
        &self.structure
    }

    fn check_k(&self, k: usize) -> Result<()> {
        if k == 0 || k > self.rows() {
            return Err(AnnError::InvalidK { k, rows: self.rows() });
        }
        Ok(())
    }

    /// Find the `k` nearest indexed points for every row of `queries`.
    ///
    /// Row `i` of the result answers query row `i`, nearest first, with ties
    /// broken by ascending point id.
    ///
    /// # Errors
    ///
    /// - [`AnnError::InvalidK`] if `k == 0` or `k > self.rows()`
    /// - [`AnnError::DimensionMismatch`] if `queries.cols() != self.dim()`
    pub fn query(
        &self,
        queries: &Dataset,
        k: usize,
        checks: impl Into<Checks>,
    ) -> Result<ResultSet> {
        self.check_k(k)?;
        self.check_dim(queries.cols())?;
        let cap = checks.into().resolve(self.tuned_checks());

        let mut results = ResultSet::with_shape(queries.rows(), k);
        for (row, query) in queries.iter_rows().enumerate() {
            let found = self.structure.search(&self.dataset, query, k, cap);
            results.fill_row(row, &found);
        }
        Ok(results)
    }

    /// Like [`Index::query`], spreading the query rows over `threads` scoped threads.
    ///
    /// Results are identical to the sequential call.
    pub fn query_parallel(
        &self,
        queries: &Dataset,
        k: usize,
        checks: impl Into<Checks>,
        threads: usize,
    ) -> Result<ResultSet> {
        self.check_k(k)?;
        self.check_dim(queries.cols())?;
        let cap = checks.into().resolve(self.tuned_checks());
        let threads = threads.clamp(1, queries.rows());
        let chunk = (queries.rows() + threads - 1) / threads;

        let rows: Vec<&[f64]> = queries.iter_rows().collect();
        let found: Vec<Vec<(f64, usize)>> = std::thread::scope(|scope| {
            let handles: Vec<_> = rows
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move || {
                        part.iter()
                            .map(|q| self.structure.search(&self.dataset, q, k, cap))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });

        let mut results = ResultSet::with_shape(queries.rows(), k);
        for (row, hits) in found.iter().enumerate() {
            results.fill_row(row, hits);
        }
        Ok(results)
    }

    /// Nearest neighbours of a single query vector.
    ///
    /// # Errors
    ///
    /// As [`Index::query`], plus [`AnnError::InvalidDataset`] for values a
    /// [`Dataset`] would reject.
    pub fn knn(&self, query: &[f64], k: usize, checks: impl Into<Checks>) -> Result<Vec<Neighbor>> {
        self.check_k(k)?;
        self.check_dim(query.len())?;
        if query.iter().any(|v| !v.is_finite()) {
            return Err(AnnError::InvalidDataset(
                "query contains non-finite values".to_string(),
            ));
        }
        check_magnitude(query, query.len())?;
        let cap = checks.into().resolve(self.tuned_checks());
        Ok(self
            .structure
            .search(&self.dataset, query, k, cap)
            .into_iter()
            .map(|(dist, index)| Neighbor {
                index,
                distance: dist.sqrt(),
            })
            .collect())
    }

    fn check_dim(&self, got: usize) -> Result<()> {
        if got != self.dim() {
            return Err(AnnError::DimensionMismatch {
                expected: self.dim(),
                got,
            });
        }
        Ok(())
    }
}
