// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Immutable row-major point matrix shared between indices.
//!
//! A [`Dataset`] owns its buffer through an [`Arc`], so cloning one is cheap
//! and never copies the points. Every [`Index`](crate::Index) keeps such a
//! handle, which keeps the buffer alive and unmodified for as long as any
//! index built over it exists.
//!
//! # Example
//!
//! ```rust
//! use nnsearch::Dataset;
//!
//! let data = Dataset::new(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0], 3, 2).unwrap();
//! assert_eq!(data.rows(), 3);
//! assert_eq!(data.row(1).unwrap(), &[1.0, 1.0]);
//! assert!(data.row(3).is_err());
//! ```

use std::sync::Arc;

use crate::error::{AnnError, Result};

/// Immutable `rows × cols` matrix of finite `f64` values.
#[derive(Clone)]
pub struct Dataset {
    data: Arc<[f64]>,
    rows: usize,
    cols: usize,
}

impl Dataset {
    /// Wrap a flat row-major buffer.
    ///
    /// Fails with [`AnnError::InvalidDataset`] when `rows` or `cols` is zero,
    /// when `data.len() != rows * cols`, when any value is NaN or infinite, or
    /// when a value's magnitude exceeds [`Dataset::max_abs_value`].
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(AnnError::InvalidDataset(format!(
                "shape must be non-empty, got {} x {}",
                rows, cols
            )));
        }
        let expected = rows.checked_mul(cols).ok_or_else(|| {
            AnnError::InvalidDataset(format!("shape {} x {} overflows", rows, cols))
        })?;
        if data.len() != expected {
            return Err(AnnError::InvalidDataset(format!(
                "buffer holds {} values, shape {} x {} needs {}",
                data.len(),
                rows,
                cols,
                expected
            )));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(AnnError::InvalidDataset(format!(
                "non-finite value at row {}, column {}",
                pos / cols,
                pos % cols
            )));
        }
        check_magnitude(&data, cols)?;

        Ok(Self {
            data: data.into(),
            rows,
            cols,
        })
    }

    /// Build a dataset from individual rows, which must all have the same length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(AnnError::InvalidDataset(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, rows.len(), cols)
    }

    /// Largest magnitude a coordinate may have in a `cols`-dimensional dataset.
    ///
    /// Any two points within this bound are less than `f64::MAX / 4` apart in
    /// squared distance, so distances and cluster statistics stay finite.
    pub fn max_abs_value(cols: usize) -> f64 {
        (f64::MAX / (16.0 * cols.max(1) as f64)).sqrt()
    }

    /// Number of points.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Dimension of every point.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow row `index` without copying.
    pub fn row(&self, index: usize) -> Result<&[f64]> {
        if index >= self.rows {
            return Err(AnnError::OutOfRange {
                index,
                rows: self.rows,
            });
        }
        Ok(self.point(index))
    }

    /// Row access for ids the caller has already validated.
    #[inline]
    pub(crate) fn point(&self, index: usize) -> &[f64] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    /// The whole buffer in row-major order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.cols)
    }

    /// True when both handles point at the same buffer.
    pub fn shares_buffer(&self, other: &Dataset) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copy every row out into owned vectors.
    pub fn to_owned_rows(&self) -> Vec<Vec<f64>> {
        self.iter_rows().map(|r| r.to_vec()).collect()
    }

    /// Copy the listed rows, in order, into a new dataset.
    pub fn select_rows(&self, ids: &[usize]) -> Result<Dataset> {
        let mut data = Vec::with_capacity(ids.len() * self.cols);
        for &id in ids {
            data.extend_from_slice(self.row(id)?);
        }
        Dataset::new(data, ids.len(), self.cols)
    }

    /// Size of the point buffer in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

/// Reject values whose squared distances could overflow `f64`.
pub(crate) fn check_magnitude(values: &[f64], cols: usize) -> Result<()> {
    let limit = Dataset::max_abs_value(cols);
    match values.iter().position(|v| v.abs() > limit) {
        Some(pos) => Err(AnnError::InvalidDataset(format!(
            "value {:e} at row {}, column {} exceeds the magnitude limit {:e}",
            values[pos],
            pos / cols,
            pos % cols,
            limit
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_shape() {
        assert!(matches!(
            Dataset::new(vec![1.0, 2.0, 3.0], 2, 2),
            Err(AnnError::InvalidDataset(_))
        ));
        assert!(matches!(
            Dataset::new(vec![], 0, 3),
            Err(AnnError::InvalidDataset(_))
        ));
        assert!(matches!(
            Dataset::new(vec![], 3, 0),
            Err(AnnError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_new_rejects_non_finite() {
        let err = Dataset::new(vec![0.0, f64::NAN, 1.0, 2.0], 2, 2).unwrap_err();
        assert!(err.to_string().contains("row 0, column 1"));
        assert!(Dataset::new(vec![f64::INFINITY], 1, 1).is_err());
    }

    #[test]
    fn test_new_rejects_huge_magnitudes() {
        let limit = Dataset::max_abs_value(3);
        assert!(limit > 1e153 && limit < 1e154);
        assert!(Dataset::new(vec![1e150, -1e150, 0.0], 1, 3).is_ok());

        let err = Dataset::new(vec![0.0, 0.0, 0.0, 1.0, 1e200, 2.0], 2, 3).unwrap_err();
        assert!(matches!(err, AnnError::InvalidDataset(_)));
        assert!(err.to_string().contains("row 1, column 1"));

        // Wider points leave less room per coordinate
        assert!(Dataset::max_abs_value(1000) < Dataset::max_abs_value(3));
    }

    #[test]
    fn test_row_access() {
        let data = Dataset::new((0..12).map(|i| i as f64).collect(), 4, 3).unwrap();
        assert_eq!(data.row(0).unwrap(), &[0.0, 1.0, 2.0]);
        assert_eq!(data.row(3).unwrap(), &[9.0, 10.0, 11.0]);
        assert!(matches!(
            data.row(4),
            Err(AnnError::OutOfRange { index: 4, rows: 4 })
        ));
    }

    #[test]
    fn test_from_rows_ragged() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Dataset::from_rows(&rows).is_err());

        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let data = Dataset::from_rows(&rows).unwrap();
        assert_eq!(data.to_owned_rows(), rows);
    }

    #[test]
    fn test_clone_shares_buffer() {
        let data = Dataset::new(vec![1.0; 6], 3, 2).unwrap();
        let other = data.clone();
        assert!(data.shares_buffer(&other));

        let copy = data.select_rows(&[0, 1, 2]).unwrap();
        assert!(!data.shares_buffer(&copy));
        assert_eq!(copy.as_slice(), data.as_slice());
    }

    #[test]
    fn test_select_rows_out_of_range() {
        let data = Dataset::new(vec![1.0; 6], 3, 2).unwrap();
        assert!(matches!(
            data.select_rows(&[0, 5]),
            Err(AnnError::OutOfRange { index: 5, rows: 3 })
        ));
    }
}
