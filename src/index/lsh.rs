// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Multi-probe locality-sensitive hashing.
//!
//! Each table hashes a point to a `key_size`-bit key: bit `i` is set when the
//! point lies on the positive side of hyperplane `i`. Plane normals are drawn
//! from a standard normal distribution and normalized; each plane is offset
//! to the median projection of the indexed points, so bits split L2 data
//! roughly in half.
//!
//! A query probes its own bucket and every bucket within Hamming distance
//! `multi_probe_level` in every table, and ranks the union of candidates by
//! exact distance. Probe masks are precomputed while there are at most
//! [`MAX_PROBE_MASKS`] of them; a table with fewer occupied buckets than
//! masks is scanned bucket by bucket instead, which finds the same
//! candidates. When that yields fewer than `k` candidates, the remaining
//! occupied buckets are visited nearest key first until `k` are held.

use std::collections::HashMap;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::search::SearchState;
use super::SearchStructure;
use crate::dataset::Dataset;
use crate::error::{AnnError, Result};
use crate::params::LshParams;

/// Largest number of probe masks precomputed at build time.
const MAX_PROBE_MASKS: usize = 1 << 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LshTable {
    /// Plane normals, `key_size × dim`, row-major.
    planes: Vec<f64>,
    /// Projection threshold per plane.
    offsets: Vec<f64>,
    buckets: HashMap<u64, Vec<usize>>,
}

/// Hash tables plus the probe masks shared by all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LshTables {
    dim: usize,
    key_size: usize,
    multi_probe_level: usize,
    tables: Vec<LshTable>,
    /// Every key delta with at most `multi_probe_level` bits set, fewest bits
    /// first. Empty when there would be more than [`MAX_PROBE_MASKS`].
    xor_masks: Vec<u64>,
}

impl LshTables {
    pub(crate) fn build<R: Rng>(data: &Dataset, params: &LshParams, rng: &mut R) -> Self {
        let dim = data.cols();
        let tables = (0..params.table_count)
            .map(|_| LshTable::build(data, params.key_size, rng))
            .collect();
        Self {
            dim,
            key_size: params.key_size,
            multi_probe_level: params.multi_probe_level,
            tables,
            xor_masks: probe_masks(params.key_size, params.multi_probe_level),
        }
    }

    fn probe(&self, data: &Dataset, keys: &[u64], state: &mut SearchState<'_>) {
        for (table, &key) in self.tables.iter().zip(keys) {
            if self.xor_masks.is_empty() || self.xor_masks.len() > table.buckets.len() {
                for (&bucket_key, bucket) in &table.buckets {
                    if (bucket_key ^ key).count_ones() as usize <= self.multi_probe_level {
                        for &id in bucket {
                            state.examine(data, id);
                        }
                    }
                }
                continue;
            }
            for &mask in &self.xor_masks {
                if let Some(bucket) = table.buckets.get(&(key ^ mask)) {
                    for &id in bucket {
                        state.examine(data, id);
                    }
                }
            }
        }
    }

    /// Visit the buckets outside the probe radius, nearest key first, until `k` results are held.
    fn widen(&self, data: &Dataset, keys: &[u64], state: &mut SearchState<'_>) {
        let mut far: Vec<(u32, usize, u64)> = Vec::new();
        for (t, (table, &key)) in self.tables.iter().zip(keys).enumerate() {
            for &bucket_key in table.buckets.keys() {
                let hamming = (bucket_key ^ key).count_ones();
                if hamming as usize > self.multi_probe_level {
                    far.push((hamming, t, bucket_key));
                }
            }
        }
        far.sort_unstable();

        for (_, t, bucket_key) in far {
            if state.results.is_full() {
                break;
            }
            if let Some(bucket) = self.tables[t].buckets.get(&bucket_key) {
                for &id in bucket {
                    state.examine(data, id);
                }
            }
        }
    }
}

impl SearchStructure for LshTables {
    fn search(&self, data: &Dataset, state: &mut SearchState<'_>) {
        let keys: Vec<u64> = self.tables.iter().map(|t| t.key(state.query)).collect();
        self.probe(data, &keys, state);
        if !state.results.is_full() {
            self.widen(data, &keys, state);
        }
    }

    fn memory_bytes(&self) -> usize {
        let f = std::mem::size_of::<f64>();
        let u = std::mem::size_of::<usize>();
        let tables: usize = self
            .tables
            .iter()
            .map(|t| {
                let buckets: usize = t
                    .buckets
                    .values()
                    .map(|ids| {
                        std::mem::size_of::<u64>()
                            + std::mem::size_of::<Vec<usize>>()
                            + ids.len() * u
                    })
                    .sum();
                (t.planes.len() + t.offsets.len()) * f + buckets
            })
            .sum();
        tables + self.xor_masks.len() * std::mem::size_of::<u64>()
    }

    fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        let corrupt = |msg: String| AnnError::CorruptIndexFile(format!("lsh: {}", msg));
        if self.dim != cols {
            return Err(corrupt(format!("planes have dimension {}, expected {}", self.dim, cols)));
        }
        if self.tables.is_empty() || self.key_size == 0 || self.key_size > 64 {
            return Err(corrupt("invalid table layout".to_string()));
        }
        if self.multi_probe_level > self.key_size
            || self.xor_masks != probe_masks(self.key_size, self.multi_probe_level)
        {
            return Err(corrupt("probe masks do not match the key size".to_string()));
        }
        for (t, table) in self.tables.iter().enumerate() {
            if table.planes.len() != self.key_size * cols || table.offsets.len() != self.key_size {
                return Err(corrupt(format!("table {} has malformed planes", t)));
            }
            if table.planes.iter().chain(&table.offsets).any(|v| !v.is_finite()) {
                return Err(corrupt(format!("table {} has non-finite planes", t)));
            }
            let mut stored = 0;
            for (&key, ids) in &table.buckets {
                if self.key_size < 64 && key >> self.key_size != 0 {
                    return Err(corrupt(format!("table {} has an out-of-range key", t)));
                }
                if let Some(&id) = ids.iter().find(|&&id| id >= rows) {
                    return Err(corrupt(format!("table {} references row {} of {}", t, id, rows)));
                }
                stored += ids.len();
            }
            if stored != rows {
                return Err(corrupt(format!(
                    "table {} stores {} rows, expected {}",
                    t, stored, rows
                )));
            }
        }
        Ok(())
    }
}

impl LshTable {
    fn build<R: Rng>(data: &Dataset, key_size: usize, rng: &mut R) -> Self {
        let dim = data.cols();
        let mut planes: Vec<f64> = (0..key_size * dim)
            .map(|_| rng.sample(StandardNormal))
            .collect();

        // Normalize each plane
        for plane in planes.chunks_exact_mut(dim) {
            let norm = plane.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > 1e-10 {
                for x in plane.iter_mut() {
                    *x /= norm;
                }
            }
        }

        let mut offsets = Vec::with_capacity(key_size);
        let mut projections = vec![0.0; data.rows()];
        let mid = data.rows() / 2;
        for plane in planes.chunks_exact(dim) {
            for (p, row) in projections.iter_mut().zip(data.iter_rows()) {
                *p = dot(row, plane);
            }
            let (_, median, _) = projections.select_nth_unstable_by(mid, f64::total_cmp);
            offsets.push(*median);
        }

        let mut table = Self {
            planes,
            offsets,
            buckets: HashMap::new(),
        };
        for (id, row) in data.iter_rows().enumerate() {
            let key = table.key(row);
            table.buckets.entry(key).or_default().push(id);
        }
        table
    }

    fn key(&self, vector: &[f64]) -> u64 {
        let dim = vector.len();
        let mut key = 0u64;
        let planes = self.planes.chunks_exact(dim).zip(&self.offsets);
        for (bit, (plane, &offset)) in planes.enumerate() {
            if dot(vector, plane) > offset {
                key |= 1 << bit;
            }
        }
        key
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Number of `key_size`-bit masks with at most `level` bits set, if it fits in `usize`.
fn mask_count(key_size: usize, level: usize) -> Option<usize> {
    let mut total: usize = 0;
    let mut choose: u128 = 1;
    for bits in 0..=level.min(key_size) {
        if bits > 0 {
            // C(n, b) = C(n, b - 1) * (n - b + 1) / b, exact in u128 for n <= 64
            choose = choose * (key_size - bits + 1) as u128 / bits as u128;
        }
        total = total.checked_add(usize::try_from(choose).ok()?)?;
    }
    Some(total)
}

/// All `key_size`-bit masks with at most `level` bits set, ordered by bit
/// count, or nothing when there are more than [`MAX_PROBE_MASKS`].
fn probe_masks(key_size: usize, level: usize) -> Vec<u64> {
    match mask_count(key_size, level) {
        Some(n) if n <= MAX_PROBE_MASKS => {}
        _ => return Vec::new(),
    }
    let mut masks = Vec::new();
    for bits in 0..=level {
        push_combinations(key_size, bits, 0, 0, &mut masks);
    }
    masks
}

fn push_combinations(
    key_size: usize,
    remaining: usize,
    start: usize,
    mask: u64,
    out: &mut Vec<u64>,
) {
    if remaining == 0 {
        out.push(mask);
        return;
    }
    for bit in start..key_size {
        push_combinations(key_size, remaining - 1, bit + 1, mask | 1 << bit, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn random_data(rows: usize, cols: usize, seed: u64) -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let values = (0..rows * cols).map(|_| rng.gen_range(0.0..1.0)).collect();
        Dataset::new(values, rows, cols).unwrap()
    }

    #[test]
    fn test_probe_masks() {
        assert_eq!(probe_masks(4, 0), vec![0]);
        assert_eq!(probe_masks(3, 1), vec![0, 1, 2, 4]);
        let masks = probe_masks(20, 2);
        assert_eq!(masks.len(), 1 + 20 + 190);
        assert!(masks.windows(2).all(|w| w[0].count_ones() <= w[1].count_ones()));
        assert_eq!(probe_masks(16, 4).len(), 1 + 16 + 120 + 560 + 1820);
        assert!(probe_masks(64, 5).is_empty());
    }

    #[test]
    fn test_mask_count() {
        assert_eq!(mask_count(3, 1), Some(4));
        assert_eq!(mask_count(20, 2), Some(211));
        assert_eq!(mask_count(8, 8), Some(256));
        assert_eq!(mask_count(64, 3), Some(1 + 64 + 2016 + 41664));
        assert_eq!(mask_count(64, 64), None);
    }

    /// Scanning occupied buckets finds the same candidates as probing masks.
    #[test]
    fn test_bucket_scan_matches_mask_probe() {
        let data = random_data(300, 6, 10);
        let params = LshParams::default().table_count(3).key_size(10).multi_probe_level(1);
        let masked = LshTables::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(11));
        assert!(masked
            .tables
            .iter()
            .all(|t| masked.xor_masks.len() <= t.buckets.len()));
        let mut scanned = masked.clone();
        scanned.xor_masks.clear();

        for q in [data.row(4).unwrap(), data.row(250).unwrap(), &[0.5; 6][..]] {
            let mut a = SearchState::new(q, data.rows(), 15, None);
            let mut b = SearchState::new(q, data.rows(), 15, None);
            masked.search(&data, &mut a);
            scanned.search(&data, &mut b);
            assert_eq!(a.into_results(), b.into_results());
        }
    }

    #[test]
    fn test_full_probe_level_is_exact() {
        let data = random_data(120, 4, 12);
        let params = LshParams::default().table_count(1).key_size(12).multi_probe_level(12);
        let index = LshTables::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(13));
        assert!(index.validate(120, 4).is_ok());

        let q = [0.3, 0.7, 0.1, 0.9];
        let mut state = SearchState::new(&q, data.rows(), 120, None);
        index.search(&data, &mut state);
        assert_eq!(state.into_results().len(), 120);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = random_data(50, 8, 1);
        let params = LshParams::default().table_count(3).key_size(8);
        let a = LshTables::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(42));
        let b = LshTables::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(42));
        let q: Vec<f64> = (0..8).map(|i| i as f64 / 8.0).collect();
        for (ta, tb) in a.tables.iter().zip(&b.tables) {
            assert_eq!(ta.key(&q), tb.key(&q));
        }
    }

    #[test]
    fn test_median_offsets_balance_bits() {
        let data = random_data(201, 4, 2);
        let params = LshParams::default().table_count(1).key_size(6);
        let index = LshTables::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(3));
        let table = &index.tables[0];
        for bit in 0..6 {
            let set = data.iter_rows().filter(|r| table.key(r) & (1 << bit) != 0).count();
            // Strictly above the median of 201 projections
            assert_eq!(set, 100);
        }
    }

    #[test]
    fn test_always_returns_k() {
        let data = random_data(10, 5, 4);
        let params = LshParams::default().table_count(2).key_size(16).multi_probe_level(0);
        let index = LshTables::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(5));
        assert!(index.validate(10, 5).is_ok());

        let q = [100.0, -100.0, 100.0, -100.0, 100.0];
        let mut state = SearchState::new(&q, data.rows(), 10, None);
        index.search(&data, &mut state);
        let found = state.into_results();
        assert_eq!(found.len(), 10);
        let mut ids: Vec<usize> = found.iter().map(|&(_, id)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_indexed_point_finds_itself() {
        let data = random_data(100, 6, 6);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let index = LshTables::build(&data, &LshParams::default(), &mut rng);
        for id in [0, 17, 99] {
            let q = data.row(id).unwrap();
            let mut state = SearchState::new(q, data.rows(), 1, None);
            index.search(&data, &mut state);
            assert_eq!(state.into_results(), vec![(0.0, id)]);
        }
    }

    #[test]
    fn test_validate_rejects_wrong_row_count() {
        let data = random_data(20, 3, 8);
        let params = LshParams::default().key_size(4);
        let index = LshTables::build(&data, &params, &mut ChaCha8Rng::seed_from_u64(9));
        assert!(index.validate(20, 3).is_ok());
        assert!(index.validate(21, 3).is_err());
        assert!(index.validate(20, 4).is_err());
    }
}
