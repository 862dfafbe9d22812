// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! nnsearch Benchmark Suite
//!
//! Builds every index family over the same synthetic dataset and measures
//! build time, query latency and recall against an exact linear scan.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use nnsearch::{Checks, Dataset, IndexBuilder, IndexParams, ResultSet};
use tracing_subscriber::EnvFilter;

mod config;
mod report;

pub use config::*;
pub use report::*;

/// nnsearch Benchmark Suite
#[derive(Parser, Debug)]
#[command(name = "nnsearch-bench")]
#[command(about = "Benchmark suite for nnsearch index families")]
struct Cli {
    /// Number of indexed points
    #[arg(long, default_value = "10000")]
    rows: usize,

    /// Point dimension
    #[arg(long, default_value = "32")]
    dim: usize,

    /// Number of search queries
    #[arg(long, default_value = "200")]
    queries: usize,

    /// Number of nearest neighbours to retrieve
    #[arg(short, default_value = "10")]
    k: usize,

    /// Check budget for the tree families
    #[arg(long, default_value = "128")]
    checks: usize,

    /// Seed for data generation and index construction
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Families to run (comma-separated, e.g. "linear,kdtree,lsh")
    #[arg(long)]
    families: Option<String>,

    /// Print the report as JSON instead of a table
    #[arg(long, default_value = "false")]
    json: bool,

    /// Also write the JSON report to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Calculate latency percentiles from a list of durations
pub fn calculate_percentiles(mut latencies: Vec<Duration>) -> (f64, f64) {
    if latencies.is_empty() {
        return (0.0, 0.0);
    }

    latencies.sort();
    let len = latencies.len();

    let p50 = latencies[len * 50 / 100].as_secs_f64() * 1_000_000.0;
    let p99 = latencies[len * 99 / 100].as_secs_f64() * 1_000_000.0;

    (p50, p99)
}

/// Mean fraction of the exact neighbours of each query row found in `found`.
pub fn recall(exact: &ResultSet, found: &ResultSet) -> f64 {
    let rows = exact.rows();
    if rows == 0 {
        return 1.0;
    }
    let total: f64 = (0..rows)
        .map(|r| {
            let truth = exact.indices_row(r);
            let hits = found
                .indices_row(r)
                .iter()
                .filter(|id| truth.contains(id))
                .count();
            hits as f64 / truth.len() as f64
        })
        .sum();
    total / rows as f64
}

fn run_family(
    label: &str,
    params: IndexParams,
    data: &Dataset,
    queries: &Dataset,
    exact: &ResultSet,
    config: &BenchConfig,
) -> nnsearch::Result<BenchmarkResult> {
    let start = Instant::now();
    let index = IndexBuilder::new(params).seed(config.seed).build(data)?;
    let build = start.elapsed();

    let checks = if matches!(params, IndexParams::Autotuned(_)) {
        Checks::Autotuned
    } else {
        Checks::Limited(config.checks)
    };

    let mut latencies = Vec::with_capacity(queries.rows());
    let total = Instant::now();
    for q in queries.iter_rows() {
        let op = Instant::now();
        index.knn(q, config.k, checks)?;
        latencies.push(op.elapsed());
    }
    let total = total.elapsed();

    let batch = index.query(queries, config.k, checks)?;

    let mean = total.as_secs_f64() * 1_000_000.0 / queries.rows().max(1) as f64;
    let (p50, p99) = calculate_percentiles(latencies);

    Ok(BenchmarkResult {
        label: label.to_string(),
        family: index.family().to_string(),
        build_ms: build.as_secs_f64() * 1000.0,
        memory_bytes: index.memory_bytes(),
        queries_per_sec: queries.rows() as f64 / total.as_secs_f64().max(f64::EPSILON),
        latency_mean_us: mean,
        latency_p50_us: p50,
        latency_p99_us: p99,
        recall: recall(exact, &batch),
        tuned_checks: index.tuned_checks(),
    })
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = BenchConfig {
        rows: cli.rows,
        dim: cli.dim,
        queries: cli.queries,
        k: cli.k,
        checks: cli.checks,
        seed: cli.seed,
    };
    let families = match &cli.families {
        Some(list) => parse_families(list)?,
        None => default_families(),
    };

    let data = uniform_dataset(config.rows, config.dim, config.seed)?;
    let queries = uniform_dataset(config.queries, config.dim, config.seed.wrapping_add(1))?;

    let linear = IndexBuilder::new(IndexParams::Linear).build(&data)?;
    let exact = linear.query(&queries, config.k, Checks::Unlimited)?;

    let mut results = Vec::with_capacity(families.len());
    for (label, params) in families {
        if !cli.json {
            eprintln!("Running {}...", label);
        }
        results.push(run_family(&label, params, &data, &queries, &exact, &config)?);
    }

    let report = BenchmarkReport::new(config, results);
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.table());
    }
    if let Some(path) = &cli.output {
        report.save_json(path)?;
        if !cli.json {
            println!("\nReport written to {}", path.display());
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
