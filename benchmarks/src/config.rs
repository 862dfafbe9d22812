// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Benchmark configuration and synthetic data.

use nnsearch::{
    AutotunedParams, CompositeParams, Dataset, IndexParams, KMeansParams, KdTreeParams, LshParams,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Shape and effort settings shared by every family in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub rows: usize,
    pub dim: usize,
    pub queries: usize,
    pub k: usize,
    pub checks: usize,
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            rows: 10_000,
            dim: 32,
            queries: 200,
            k: 10,
            checks: 128,
            seed: 42,
        }
    }
}

/// Uniform points in `[-1, 1)^dim` from a seeded ChaCha8 stream.
pub fn uniform_dataset(rows: usize, dim: usize, seed: u64) -> nnsearch::Result<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..rows * dim)
        .map(|_| rng.gen::<f64>() * 2.0 - 1.0)
        .collect();
    Dataset::new(data, rows, dim)
}

/// Families benchmarked by default, labelled for the report.
pub fn default_families() -> Vec<(String, IndexParams)> {
    vec![
        ("linear".to_string(), IndexParams::Linear),
        (
            "kdtree(4)".to_string(),
            IndexParams::KdTree(KdTreeParams::default().trees(4)),
        ),
        (
            "kdtree(8)".to_string(),
            IndexParams::KdTree(KdTreeParams::default().trees(8)),
        ),
        (
            "kmeans(32)".to_string(),
            IndexParams::KMeans(KMeansParams::default().branching(32).iterations(5)),
        ),
        (
            "composite".to_string(),
            IndexParams::Composite(CompositeParams {
                iterations: 5,
                ..CompositeParams::default()
            }),
        ),
        (
            "lsh(12x20)".to_string(),
            IndexParams::Lsh(LshParams::default()),
        ),
        (
            "autotuned(0.9)".to_string(),
            IndexParams::Autotuned(AutotunedParams::default().target_precision(0.9)),
        ),
    ]
}

/// Parse a comma-separated family list; unknown names are rejected.
pub fn parse_families(list: &str) -> Result<Vec<(String, IndexParams)>, String> {
    let all = default_families();
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            all.iter()
                .find(|(label, _)| label == name || label.split('(').next() == Some(name))
                .cloned()
                .ok_or_else(|| format!("Unknown family: {}", name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_dataset_is_seeded() {
        let a = uniform_dataset(50, 4, 7).unwrap();
        let b = uniform_dataset(50, 4, 7).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        assert!(a.as_slice().iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn test_parse_families() {
        let picked = parse_families("linear, lsh").unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].1, IndexParams::Linear);
        assert!(parse_families("kdtree(8)").is_ok());
        assert!(parse_families("hnsw").is_err());
    }
}
