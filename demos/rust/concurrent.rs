//! Concurrent Query Demo
//!
//! This demo shows that a built index is shared read-only between threads:
//! - Many threads querying one index with std::thread::scope
//! - `Index::query_parallel` splitting a batch across threads
//! - Verifying every thread saw the same answers as a sequential run
//!
//! Run with: cargo run --example concurrent

use nnsearch::{build_composite, Checks, CompositeParams, Dataset, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

const THREADS: usize = 8;
const QUERIES_PER_THREAD: usize = 250;

fn main() -> Result<()> {
    println!("=== nnsearch Concurrent Query Demo ===\n");

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let rows = 20_000;
    let dim = 12;
    let data = Dataset::new((0..rows * dim).map(|_| rng.gen::<f64>()).collect(), rows, dim)?;

    println!("1. Building a composite index over {} points...", rows);
    let index = build_composite(&data, CompositeParams { iterations: 5, ..Default::default() })?;
    println!("   ✓ {} KB\n", index.memory_bytes() / 1024);

    let ids: Vec<usize> = (0..THREADS * QUERIES_PER_THREAD).map(|i| (i * 7919) % rows).collect();
    let queries = data.select_rows(&ids)?;
    let sequential = index.query(&queries, 5, Checks::Limited(64))?;

    // 2. Scoped threads sharing &Index
    println!("2. {} threads x {} queries...", THREADS, QUERIES_PER_THREAD);
    let mismatches = AtomicUsize::new(0);
    let start = Instant::now();
    std::thread::scope(|s| {
        for t in 0..THREADS {
            let index = &index;
            let queries = &queries;
            let sequential = &sequential;
            let mismatches = &mismatches;
            s.spawn(move || {
                for r in t * QUERIES_PER_THREAD..(t + 1) * QUERIES_PER_THREAD {
                    let Ok(q) = queries.row(r) else { continue };
                    match index.knn(q, 5, Checks::Limited(64)) {
                        Ok(hits) => {
                            let ids: Vec<usize> = hits.iter().map(|h| h.index).collect();
                            if ids != sequential.indices_row(r) {
                                mismatches.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(_) => {
                            mismatches.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });
    println!(
        "   ✓ {:?}, {} mismatches\n",
        start.elapsed(),
        mismatches.load(Ordering::Relaxed)
    );

    // 3. Built-in batch splitting
    println!("3. query_parallel over {} threads...", THREADS);
    let start = Instant::now();
    let parallel = index.query_parallel(&queries, 5, Checks::Limited(64), THREADS)?;
    println!(
        "   ✓ {:?}, identical to sequential: {}",
        start.elapsed(),
        parallel == sequential
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
