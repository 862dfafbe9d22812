// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Benchmark report generation: a plain-text table or JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::BenchConfig;

/// Measurements for one index family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub label: String,
    /// Family actually built (differs from the label for autotuned runs)
    pub family: String,
    pub build_ms: f64,
    pub memory_bytes: usize,
    pub queries_per_sec: f64,
    pub latency_mean_us: f64,
    pub latency_p50_us: f64,
    pub latency_p99_us: f64,
    /// Mean fraction of the exact k nearest neighbours found.
    pub recall: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuned_checks: Option<usize>,
}

/// Complete report of one run.
#[derive(Debug, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub nnsearch_version: String,
    pub config: BenchConfig,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    pub fn new(config: BenchConfig, results: Vec<BenchmarkResult>) -> Self {
        Self {
            nnsearch_version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            results,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Render the results as an aligned text table.
    pub fn table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} points x {} dims, {} queries, k = {}, checks = {}\n\n",
            self.config.rows,
            self.config.dim,
            self.config.queries,
            self.config.k,
            self.config.checks
        ));
        out.push_str(&format!(
            "{:<16} {:<10} {:>11} {:>12} {:>11} {:>11} {:>11} {:>8}\n",
            "Index", "Family", "Build (ms)", "Memory (KB)", "QPS", "p50 (us)", "p99 (us)", "Recall"
        ));
        out.push_str(&format!("{}\n", "-".repeat(97)));
        for r in &self.results {
            out.push_str(&format!(
                "{:<16} {:<10} {:>11.1} {:>12.1} {:>11.0} {:>11.1} {:>11.1} {:>8.3}\n",
                r.label,
                r.family,
                r.build_ms,
                r.memory_bytes as f64 / 1024.0,
                r.queries_per_sec,
                r.latency_p50_us,
                r.latency_p99_us,
                r.recall
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BenchmarkReport {
        BenchmarkReport::new(
            BenchConfig::default(),
            vec![BenchmarkResult {
                label: "kdtree(4)".to_string(),
                family: "kdtree".to_string(),
                build_ms: 12.5,
                memory_bytes: 4096,
                queries_per_sec: 10_000.0,
                latency_mean_us: 100.0,
                latency_p50_us: 90.0,
                latency_p99_us: 250.0,
                recall: 0.93,
                tuned_checks: None,
            }],
        )
    }

    #[test]
    fn test_json_roundtrip() {
        let json = sample().to_json().unwrap();
        assert!(!json.contains("tuned_checks"));
        let back: BenchmarkReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.results.len(), 1);
        assert_eq!(back.results[0].label, "kdtree(4)");
    }

    #[test]
    fn test_table_lists_every_result() {
        let table = sample().table();
        assert!(table.contains("kdtree(4)"));
        assert!(table.contains("0.930"));
    }

    #[test]
    fn test_save_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        sample().save_json(&path).unwrap();
        assert!(path.exists());
    }
}
