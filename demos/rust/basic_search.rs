//! Basic Search Demo
//!
//! This demo builds every index family over the same random points and
//! compares what each one finds against an exact linear scan:
//! - Building indices with the free functions and with `IndexBuilder`
//! - Querying a batch with a check budget
//! - Trading checks for recall
//!
//! Run with: cargo run --example basic_search

use nnsearch::{
    build_kdtree, build_kmeans, build_linear, build_lsh, query, Checks, Dataset, IndexBuilder,
    IndexParams, KMeansParams, KdTreeParams, LshParams, Result, ResultSet,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

const ROWS: usize = 5000;
const DIM: usize = 16;
const QUERIES: usize = 50;
const K: usize = 10;

fn random_points(rows: usize, seed: u64) -> Result<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..rows * DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Dataset::new(data, rows, DIM)
}

fn recall(exact: &ResultSet, found: &ResultSet) -> f64 {
    let mut hits = 0;
    for r in 0..exact.rows() {
        let truth = exact.indices_row(r);
        hits += found
            .indices_row(r)
            .iter()
            .filter(|id| truth.contains(id))
            .count();
    }
    hits as f64 / (exact.rows() * exact.k()) as f64
}

fn main() -> Result<()> {
    println!("=== nnsearch Basic Search Demo ===\n");

    // 1. Data
    println!("1. Generating {} points in {} dimensions...", ROWS, DIM);
    let data = random_points(ROWS, 1)?;
    let queries = random_points(QUERIES, 2)?;
    println!("   ✓ {} queries ready\n", queries.rows());

    // 2. Exact answers
    println!("2. Linear scan (exact)...");
    let linear = build_linear(&data)?;
    let start = Instant::now();
    let exact = query(&linear, &queries, K, Checks::Unlimited)?;
    println!("   ✓ {:?} for {} queries", start.elapsed(), QUERIES);
    let first: Vec<_> = exact.neighbors(0).take(3).collect();
    for hit in &first {
        println!("     row {:>5}  distance {:.4}", hit.index, hit.distance);
    }
    println!();

    // 3. Approximate families
    println!("3. Approximate indices at 128 checks:");
    let indices = vec![
        ("kdtree", build_kdtree(&data, KdTreeParams::default().trees(4))?),
        (
            "kmeans",
            build_kmeans(&data, KMeansParams::default().branching(16).iterations(5))?,
        ),
        ("lsh", build_lsh(&data, LshParams::default())?),
    ];
    for (name, index) in &indices {
        let start = Instant::now();
        let found = query(index, &queries, K, Checks::Limited(128))?;
        println!(
            "   {:<8} recall {:.3}  in {:?}  ({} KB)",
            name,
            recall(&exact, &found),
            start.elapsed(),
            index.memory_bytes() / 1024
        );
    }
    println!();

    // 4. Checks vs recall
    println!("4. kd-forest recall as the budget grows:");
    let kd = IndexBuilder::new(IndexParams::KdTree(KdTreeParams::default().trees(8)))
        .seed(7)
        .build(&data)?;
    for checks in [16, 64, 256, 1024] {
        let found = kd.query(&queries, K, Checks::Limited(checks))?;
        println!("   checks {:>5}  recall {:.3}", checks, recall(&exact, &found));
    }
    let found = kd.query(&queries, K, Checks::Unlimited)?;
    println!("   unlimited     recall {:.3}", recall(&exact, &found));

    println!("\n=== Demo Complete ===");
    Ok(())
}
