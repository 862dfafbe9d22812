//! Word Vectors Demo
//!
//! This demo runs nearest-word lookups over a small embedding file:
//! - Writing a `word v1 v2 ...` text file
//! - Opening it with an on-disk index cache
//! - Reopening, which loads the cached index instead of rebuilding
//!
//! Run with: cargo run --example word_vectors

use nnsearch::{Delimiter, IndexParams, KdTreeParams, Result, WordVectors};
use std::io::Write;

const VOCAB: &[(&str, [f64; 3])] = &[
    ("cat", [0.9, 0.1, 0.0]),
    ("dog", [0.85, 0.15, 0.05]),
    ("kitten", [0.92, 0.05, 0.02]),
    ("puppy", [0.8, 0.2, 0.1]),
    ("car", [0.0, 0.9, 0.4]),
    ("truck", [0.05, 0.95, 0.5]),
    ("bicycle", [0.1, 0.7, 0.2]),
    ("apple", [0.3, 0.0, 0.9]),
    ("banana", [0.35, 0.05, 0.85]),
    ("cherry", [0.25, 0.0, 0.95]),
];

fn main() -> Result<()> {
    println!("=== nnsearch Word Vectors Demo ===\n");

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vectors.txt");
    let mut file = std::fs::File::create(&path)?;
    for (word, v) in VOCAB {
        writeln!(file, "{} {} {} {}", word, v[0], v[1], v[2])?;
    }
    drop(file);

    let params = IndexParams::KdTree(KdTreeParams::default().trees(2));

    // 1. First open builds and caches
    println!("1. Opening {}...", path.display());
    let words = WordVectors::open(&path, params, Delimiter::Whitespace)?;
    let cache = WordVectors::index_path(&path);
    println!("   ✓ {} words, cache at {}\n", words.len(), cache.display());

    // 2. Lookups
    println!("2. Nearest words:");
    for query in ["cat", "truck", "cherry", "zebra"] {
        let near = words.nearest(query, 3)?;
        if near.is_empty() {
            println!("   {:<8} (unknown)", query);
            continue;
        }
        let list: Vec<String> = near
            .iter()
            .map(|(w, d)| format!("{} ({:.3})", w, d))
            .collect();
        println!("   {:<8} {}", query, list.join(", "));
    }
    println!();

    // 3. Second open reuses the cache
    println!("3. Reopening...");
    let modified = std::fs::metadata(&cache)?.modified()?;
    let again = WordVectors::open(&path, params, Delimiter::Whitespace)?;
    let unchanged = std::fs::metadata(&cache)?.modified()? == modified;
    println!("   ✓ {} words, cache reused: {}", again.len(), unchanged);

    println!("\n=== Demo Complete ===");
    Ok(())
}
