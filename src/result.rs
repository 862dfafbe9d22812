// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Query results.
//!
//! A [`ResultSet`] holds `qrows × k` neighbours in two row-major buffers,
//! mirroring the shape of the query batch: row `i` of `indices` and
//! `distances` answers query row `i`, nearest first.

/// Sentinel id marking a missing neighbour slot.
pub const NO_NEIGHBOR: usize = usize::MAX;

/// One neighbour of a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row of the point in the indexed dataset.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f64,
}

/// Neighbours for a batch of queries.
///
/// Invariant: within each row, distances are non-decreasing and equal
/// distances are ordered by ascending point id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    rows: usize,
    k: usize,
    indices: Vec<usize>,
    distances: Vec<f64>,
}

impl ResultSet {
    /// Empty result table of the given shape, filled with sentinels.
    pub(crate) fn with_shape(rows: usize, k: usize) -> Self {
        Self {
            rows,
            k,
            indices: vec![NO_NEIGHBOR; rows * k],
            distances: vec![f64::INFINITY; rows * k],
        }
    }

    /// Write one query's neighbours, given as `(squared distance, id)` nearest first.
    pub(crate) fn fill_row(&mut self, row: usize, found: &[(f64, usize)]) {
        let start = row * self.k;
        for (slot, &(dist_sq, id)) in found.iter().take(self.k).enumerate() {
            self.indices[start + slot] = id;
            self.distances[start + slot] = dist_sq.sqrt();
        }
    }

    /// Number of query rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Neighbours per query row.
    pub fn k(&self) -> usize {
        self.k
    }

    /// All neighbour ids, row-major (`rows × k`).
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// All neighbour distances, row-major (`rows × k`).
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Neighbour ids of query `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.rows()`.
    pub fn indices_row(&self, row: usize) -> &[usize] {
        &self.indices[row * self.k..(row + 1) * self.k]
    }

    /// Neighbour distances of query `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.rows()`.
    pub fn distances_row(&self, row: usize) -> &[f64] {
        &self.distances[row * self.k..(row + 1) * self.k]
    }

    /// Neighbours of query `row`, skipping empty slots.
    pub fn neighbors(&self, row: usize) -> impl Iterator<Item = Neighbor> + '_ {
        self.indices_row(row)
            .iter()
            .zip(self.distances_row(row))
            .filter(|(&index, _)| index != NO_NEIGHBOR)
            .map(|(&index, &distance)| Neighbor { index, distance })
    }

    /// Split into the raw `(indices, distances)` buffers.
    pub fn into_parts(self) -> (Vec<usize>, Vec<f64>) {
        (self.indices, self.distances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_row_and_sentinels() {
        let mut rs = ResultSet::with_shape(2, 3);
        rs.fill_row(0, &[(0.0, 4), (4.0, 1), (9.0, 7)]);
        rs.fill_row(1, &[(1.0, 2)]);

        assert_eq!(rs.indices_row(0), &[4, 1, 7]);
        assert_eq!(rs.distances_row(0), &[0.0, 2.0, 3.0]);
        assert_eq!(rs.indices_row(1), &[2, NO_NEIGHBOR, NO_NEIGHBOR]);
        assert!(rs.distances_row(1)[1].is_infinite());
        assert_eq!(rs.neighbors(1).count(), 1);
    }
}
