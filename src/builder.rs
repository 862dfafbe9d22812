// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Index construction.

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::index::{autotune, Index, Structure};
use crate::params::IndexParams;

/// Builds an [`Index`] over a [`Dataset`].
///
/// Parameters are validated before any work starts, and a failed build
/// returns nothing partial. Randomized families draw from a ChaCha8 stream;
/// fix it with [`IndexBuilder::seed`] for reproducible builds.
///
/// ```rust
/// use nnsearch::{Dataset, IndexBuilder, IndexFamily, IndexParams, LshParams};
///
/// let data = Dataset::new((0..64).map(|i| i as f64).collect(), 32, 2).unwrap();
/// let index = IndexBuilder::new(IndexParams::Lsh(LshParams::default().key_size(8)))
///     .seed(42)
///     .build(&data)
///     .unwrap();
/// assert_eq!(index.family(), IndexFamily::Lsh);
/// ```
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    params: IndexParams,
    seed: Option<u64>,
}

impl IndexBuilder {
    pub fn new(params: IndexParams) -> Self {
        Self { params, seed: None }
    }

    /// Seed the construction RNG.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the index. The returned index shares `dataset`'s buffer.
    ///
    /// # Errors
    ///
    /// - [`AnnError::InvalidParams`](crate::AnnError::InvalidParams) for out-of-domain parameters
    /// - [`AnnError::NoFeasibleConfiguration`](crate::AnnError::NoFeasibleConfiguration) when
    ///   autotuning cannot sample enough rows
    pub fn build(&self, dataset: &Dataset) -> Result<Index> {
        self.params.validate()?;

        let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let start = Instant::now();

        let index = match self.params {
            IndexParams::Autotuned(params) => autotune::tune(dataset, &params, &mut rng)?,
            params => {
                let structure = Structure::build(&params, dataset, &mut rng)?;
                Index::from_parts(dataset.clone(), params, structure, None)
            }
        };

        info!(
            family = %index.family(),
            rows = dataset.rows(),
            dim = dataset.cols(),
            seed,
            memory_bytes = index.memory_bytes(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "index built"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnError;
    use crate::params::{Checks, IndexFamily, KMeansParams, KdTreeParams};

    fn data() -> Dataset {
        Dataset::new((0..120).map(|i| ((i * 37) % 101) as f64).collect(), 40, 3).unwrap()
    }

    #[test]
    fn test_invalid_params_rejected_before_build() {
        let err = IndexBuilder::new(IndexParams::KMeans(KMeansParams::default().branching(1)))
            .build(&data())
            .unwrap_err();
        assert!(matches!(err, AnnError::InvalidParams(_)));
    }

    #[test]
    fn test_index_shares_dataset() {
        let data = data();
        let index = IndexBuilder::new(IndexParams::Linear).build(&data).unwrap();
        assert!(index.dataset().shares_buffer(&data));
        assert_eq!(index.family(), IndexFamily::Linear);
        assert_eq!(index.dim(), 3);
        assert_eq!(index.rows(), 40);
    }

    #[test]
    fn test_seeded_builds_agree() {
        let data = data();
        let params = IndexParams::KdTree(KdTreeParams::default().trees(2));
        let a = IndexBuilder::new(params).seed(9).build(&data).unwrap();
        let b = IndexBuilder::new(params).seed(9).build(&data).unwrap();
        let queries = data.select_rows(&[0, 7, 19]).unwrap();
        assert_eq!(
            a.query(&queries, 4, Checks::Limited(3)).unwrap(),
            b.query(&queries, 4, Checks::Limited(3)).unwrap()
        );
    }
}
