// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Automatic family and parameter selection.
//!
//! A random sample of the dataset is indexed with every candidate
//! configuration. For the tree families the smallest check budget reaching
//! the target recall is searched for (doubling, then bisecting); each
//! candidate's build time, per-query search time and memory ratio are then
//! folded into one cost:
//!
//! ```text
//! time_cost = search_time + build_weight * build_time
//! cost      = time_cost / best_time_cost + memory_weight * structure_bytes / sample_bytes
//! ```
//!
//! The cheapest candidate meeting the target wins; when none does, the one
//! with the highest recall wins. The winner is rebuilt over the full dataset
//! and its check budget re-estimated there.

use std::time::Instant;

use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Index, Structure};
use crate::dataset::Dataset;
use crate::error::{AnnError, Result};
use crate::params::{AutotunedParams, IndexParams, KMeansParams, KdTreeParams, LshParams};

/// Neighbours per test query used to measure recall.
pub const TUNING_NEIGHBORS: usize = 5;

/// Upper bound on the number of test queries.
const MAX_TEST_QUERIES: usize = 100;

/// What autotuning decided, kept with the index and persisted with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningSummary {
    /// Requested recall.
    pub target_precision: f64,
    /// Recall of the winner measured on the sample.
    pub recall: f64,
    /// Check budget for the tree families; `None` for Linear and LSH.
    pub checks: Option<usize>,
    /// Number of configurations evaluated.
    pub candidates: usize,
    /// Rows in the tuning sample.
    pub sample_rows: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    params: IndexParams,
    build_time: f64,
    search_time: f64,
    memory_ratio: f64,
    recall: f64,
    checks: Option<usize>,
}

/// Configurations tried on the sample, in evaluation order.
fn candidate_grid() -> Vec<IndexParams> {
    let mut grid = vec![IndexParams::Linear];
    for trees in [1, 4, 8, 16] {
        grid.push(IndexParams::KdTree(KdTreeParams::default().trees(trees)));
    }
    for branching in [16, 32, 64] {
        for iterations in [1, 5, 10] {
            grid.push(IndexParams::KMeans(
                KMeansParams::default()
                    .branching(branching)
                    .iterations(iterations),
            ));
        }
    }
    for (table_count, key_size) in [(4, 12), (8, 16), (12, 20)] {
        grid.push(IndexParams::Lsh(
            LshParams::default()
                .table_count(table_count)
                .key_size(key_size)
                .multi_probe_level(2),
        ));
    }
    grid
}

/// Tune over `data` and build the winning configuration over all of it.
pub(crate) fn tune<R: Rng>(data: &Dataset, params: &AutotunedParams, rng: &mut R) -> Result<Index> {
    let rows = data.rows();
    let sample_rows = ((rows as f64 * params.sample_fraction).ceil() as usize).clamp(1, rows);
    if sample_rows < TUNING_NEIGHBORS {
        return Err(AnnError::NoFeasibleConfiguration(format!(
            "a sample of {} rows cannot rank {} neighbours; raise sample_fraction or add data",
            sample_rows, TUNING_NEIGHBORS
        )));
    }

    let sample_ids = sample(rng, rows, sample_rows).into_vec();
    let sample_data = data.select_rows(&sample_ids)?;
    let query_ids = test_queries(rows, &sample_ids, rng);
    let queries = data.select_rows(&query_ids)?;
    let truth = ground_truth(&sample_data, &queries);

    info!(
        rows,
        sample_rows,
        test_queries = queries.rows(),
        target_precision = params.target_precision,
        "autotuning index"
    );

    let grid = candidate_grid();
    let mut candidates = Vec::with_capacity(grid.len());
    for candidate in &grid {
        candidates.push(evaluate(
            candidate,
            &sample_data,
            &queries,
            &truth,
            params.target_precision,
            rng,
        )?);
    }

    let winner = select(&candidates, params).ok_or_else(|| {
        AnnError::NoFeasibleConfiguration("no candidate configuration was evaluated".to_string())
    })?;
    info!(
        family = %winner.params.family(),
        recall = winner.recall,
        checks = ?winner.checks,
        "autotuning selected configuration"
    );

    let structure = Structure::build(&winner.params, data, rng)?;
    let checks = if structure.uses_checks() {
        let full_truth = ground_truth(data, &queries);
        Some(optimal_checks(&structure, data, &queries, &full_truth, params.target_precision))
    } else {
        None
    };

    let summary = TuningSummary {
        target_precision: params.target_precision,
        recall: winner.recall,
        checks,
        candidates: candidates.len(),
        sample_rows,
    };
    Ok(Index::from_parts(data.clone(), winner.params, structure, Some(summary)))
}

/// About one tenth of the sample, preferring rows outside it.
fn test_queries<R: Rng>(rows: usize, sample_ids: &[usize], rng: &mut R) -> Vec<usize> {
    let count = (sample_ids.len() / 10).clamp(1, MAX_TEST_QUERIES);
    let mut in_sample = vec![false; rows];
    for &id in sample_ids {
        in_sample[id] = true;
    }
    let outside: Vec<usize> = (0..rows).filter(|&id| !in_sample[id]).collect();
    let pool: &[usize] = if outside.len() >= count {
        &outside
    } else {
        sample_ids
    };
    sample(rng, pool.len(), count)
        .into_iter()
        .map(|i| pool[i])
        .collect()
}

fn ground_truth(data: &Dataset, queries: &Dataset) -> Vec<Vec<usize>> {
    let k = TUNING_NEIGHBORS.min(data.rows());
    run_queries(&Structure::Linear(super::linear::LinearScan), data, queries, k, None)
}

fn run_queries(
    structure: &Structure,
    data: &Dataset,
    queries: &Dataset,
    k: usize,
    checks: Option<usize>,
) -> Vec<Vec<usize>> {
    queries
        .iter_rows()
        .map(|q| {
            structure
                .search(data, q, k, checks)
                .into_iter()
                .map(|(_, id)| id)
                .collect()
        })
        .collect()
}

/// Fraction of true neighbours found, averaged over queries.
fn recall(found: &[Vec<usize>], truth: &[Vec<usize>]) -> f64 {
    let mut hits = 0;
    let mut total = 0;
    for (f, t) in found.iter().zip(truth) {
        hits += f.iter().filter(|id| t.contains(id)).count();
        total += t.len();
    }
    if total == 0 {
        return 1.0;
    }
    hits as f64 / total as f64
}

/// Smallest check budget whose recall reaches `target`.
fn optimal_checks(
    structure: &Structure,
    data: &Dataset,
    queries: &Dataset,
    truth: &[Vec<usize>],
    target: f64,
) -> usize {
    let k = TUNING_NEIGHBORS.min(data.rows());
    let rows = data.rows();
    let reaches = |checks: usize| {
        recall(&run_queries(structure, data, queries, k, Some(checks)), truth) >= target
    };

    let mut hi = 1;
    while !reaches(hi) {
        if hi >= rows {
            return rows;
        }
        hi = (hi * 2).min(rows);
    }

    let mut lo = hi / 2;
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if reaches(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

fn evaluate<R: Rng>(
    params: &IndexParams,
    data: &Dataset,
    queries: &Dataset,
    truth: &[Vec<usize>],
    target: f64,
    rng: &mut R,
) -> Result<Candidate> {
    let start = Instant::now();
    let structure = Structure::build(params, data, rng)?;
    let build_time = start.elapsed().as_secs_f64();

    let checks = if structure.uses_checks() {
        Some(optimal_checks(&structure, data, queries, truth, target))
    } else {
        None
    };

    let k = TUNING_NEIGHBORS.min(data.rows());
    let start = Instant::now();
    let found = run_queries(&structure, data, queries, k, checks);
    let search_time = start.elapsed().as_secs_f64() / queries.rows() as f64;

    let candidate = Candidate {
        params: *params,
        build_time,
        search_time,
        memory_ratio: structure.memory_bytes() as f64 / data.memory_bytes() as f64,
        recall: recall(&found, truth),
        checks,
    };
    debug!(
        family = %params.family(),
        params = ?params,
        build_time = candidate.build_time,
        search_time = candidate.search_time,
        memory_ratio = candidate.memory_ratio,
        recall = candidate.recall,
        checks = ?candidate.checks,
        "evaluated candidate"
    );
    Ok(candidate)
}

/// Cheapest candidate meeting the target, else the highest recall.
fn select<'a>(candidates: &'a [Candidate], params: &AutotunedParams) -> Option<&'a Candidate> {
    let time_cost = |c: &Candidate| c.search_time + params.build_weight * c.build_time;
    let feasible: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.recall >= params.target_precision)
        .collect();
    let pool: Vec<&Candidate> = if feasible.is_empty() {
        candidates.iter().collect()
    } else {
        feasible.clone()
    };

    let best_time = pool
        .iter()
        .map(|&c| time_cost(c))
        .fold(f64::INFINITY, f64::min)
        .max(f64::MIN_POSITIVE);
    let cost = |c: &Candidate| time_cost(c) / best_time + params.memory_weight * c.memory_ratio;

    if feasible.is_empty() {
        pool.into_iter().reduce(|best, c| {
            let better =
                c.recall > best.recall || (c.recall == best.recall && cost(c) < cost(best));
            if better {
                c
            } else {
                best
            }
        })
    } else {
        feasible
            .into_iter()
            .reduce(|best, c| if cost(c) < cost(best) { c } else { best })
    }
}
