//! Persistence Demo
//!
//! This demo shows how built indices are saved and restored:
//! - Saving an index (the dataset itself is never written)
//! - Inspecting a file header without decoding it
//! - Loading against the original dataset
//! - The errors reported for a mismatched dataset or a damaged file
//!
//! Run with: cargo run --example persistence

use nnsearch::{
    build_kmeans, inspect, load, load_as, save, AnnError, Checks, Dataset, IndexFamily,
    KMeansParams, Result,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn main() -> Result<()> {
    println!("=== nnsearch Persistence Demo ===\n");

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("points.nnix");

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let data = Dataset::new((0..2000 * 8).map(|_| rng.gen::<f64>()).collect(), 2000, 8)?;

    // 1. Build and save
    println!("1. Building a k-means tree and saving it...");
    let index = build_kmeans(&data, KMeansParams::default().branching(8))?;
    save(&index, &path)?;
    let size = std::fs::metadata(&path)?.len();
    println!("   ✓ {} ({} bytes)\n", path.display(), size);

    // 2. Inspect
    println!("2. Header:");
    let header = inspect(&path)?;
    println!("   version {}", header.version);
    println!("   family  {}", header.family);
    println!("   shape   {} x {}\n", header.rows, header.dim);

    // 3. Load and compare
    println!("3. Loading against the same dataset...");
    let restored = load_as(&path, &data, IndexFamily::KMeans)?;
    let q = data.row(17)?;
    let before = index.knn(q, 5, Checks::Limited(64))?;
    let after = restored.knn(q, 5, Checks::Limited(64))?;
    assert_eq!(before, after);
    println!("   ✓ identical results for row 17\n");

    // 4. Failure modes
    println!("4. Error cases:");
    let narrow = Dataset::new(vec![0.0; 2000 * 4], 2000, 4)?;
    match load(&path, &narrow) {
        Err(AnnError::DimensionMismatch { expected, got }) => {
            println!("   ✓ wrong dimension: expected {}, got {}", expected, got)
        }
        other => println!("   unexpected: {:?}", other.map(|i| i.family())),
    }

    match load_as(&path, &data, IndexFamily::Lsh) {
        Err(e @ AnnError::FamilyMismatch { .. }) => println!("   ✓ {}", e),
        other => println!("   unexpected: {:?}", other.map(|i| i.family())),
    }

    let mut bytes = std::fs::read(&path)?;
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&path, &bytes)?;
    match load(&path, &data) {
        Err(e @ AnnError::CorruptIndexFile(_)) => println!("   ✓ {}", e),
        other => println!("   unexpected: {:?}", other.map(|i| i.family())),
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
