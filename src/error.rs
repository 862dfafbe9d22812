// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Error types for index construction, search and persistence.
//!
//! This module provides:
//! - [`AnnError`] - The error enum returned by every fallible operation
//! - [`Result<T>`] - A type alias for `std::result::Result<T, AnnError>`
//!
//! No operation retries internally: a rejected build or load reports the
//! failure and leaves nothing half-constructed behind.

use crate::params::IndexFamily;

/// Result type alias for nnsearch operations.
///
/// This is equivalent to `std::result::Result<T, AnnError>`.
pub type Result<T> = std::result::Result<T, AnnError>;

/// Errors reported by dataset construction, index building, search and persistence.
///
/// # Examples
///
/// ```rust
/// use nnsearch::{AnnError, Dataset, IndexBuilder, IndexParams, KdTreeParams};
///
/// let dataset = Dataset::new(vec![0.0, 1.0, 2.0, 3.0], 2, 2).unwrap();
/// let params = IndexParams::KdTree(KdTreeParams { trees: 0 });
///
/// match IndexBuilder::new(params).build(&dataset) {
///     Err(AnnError::InvalidParams(msg)) => println!("rejected: {}", msg),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AnnError {
    /// A parameter lies outside its documented domain.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The dataset (or query batch) buffer is malformed.
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Query or stored index dimension disagrees with the bound dataset.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension the index or dataset requires
        expected: usize,
        /// Dimension actually supplied
        got: usize,
    },

    /// Row index outside `[0, rows)`.
    #[error("Row {index} out of range (dataset has {rows} rows)")]
    OutOfRange {
        /// Requested row
        index: usize,
        /// Number of rows in the dataset
        rows: usize,
    },

    /// Requested neighbor count is zero or exceeds the number of indexed points.
    #[error("Invalid k: {k} (must be between 1 and {rows})")]
    InvalidK {
        /// Requested neighbor count
        k: usize,
        /// Number of indexed points
        rows: usize,
    },

    /// Structural corruption detected while loading an index file.
    #[error("Corrupt index file: {0}")]
    CorruptIndexFile(String),

    /// The index file holds a different family than the caller asked for.
    #[error("Index family mismatch: expected {expected}, found {found}")]
    FamilyMismatch {
        /// Family the caller expected
        expected: IndexFamily,
        /// Family recorded in the file
        found: IndexFamily,
    },

    /// The dataset supplied at load time has a different point count than at build time.
    #[error("Row count mismatch: index was built over {expected} rows, dataset has {got}")]
    RowCountMismatch {
        /// Row count recorded in the index file
        expected: usize,
        /// Row count of the supplied dataset
        got: usize,
    },

    /// I/O error while reading or writing an index or data file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while encoding an index payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Autotuning could not evaluate any candidate configuration.
    #[error("No feasible configuration: {0}")]
    NoFeasibleConfiguration(String),

    /// Malformed line in a word-vector text file.
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnnError::InvalidK { k: 0, rows: 10 };
        assert_eq!(err.to_string(), "Invalid k: 0 (must be between 1 and 10)");

        let err = AnnError::DimensionMismatch {
            expected: 8,
            got: 4,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 8, got 4");

        let err = AnnError::FamilyMismatch {
            expected: IndexFamily::KdTree,
            found: IndexFamily::Lsh,
        };
        assert_eq!(
            err.to_string(),
            "Index family mismatch: expected kdtree, found lsh"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AnnError = io.into();
        assert!(matches!(err, AnnError::Io(_)));
    }
}
