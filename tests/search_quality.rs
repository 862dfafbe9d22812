//! Recall and ordering tests for the approximate index families.
//!
//! Recall is measured against a linear scan over the same data. Tree
//! families must never lose recall when the check budget grows, and must be
//! exact when the budget is unlimited.

use nnsearch::{
    CenterInit, Checks, CompositeParams, Dataset, Index, IndexBuilder, IndexParams, KMeansParams,
    KdTreeParams, LshParams, ResultSet,
};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Uniform points in the unit cube.
fn uniform(rows: usize, dim: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..rows * dim).map(|_| rng.gen::<f64>()).collect();
    Dataset::new(data, rows, dim).unwrap()
}

fn build(params: IndexParams, data: &Dataset, seed: u64) -> Index {
    IndexBuilder::new(params).seed(seed).build(data).unwrap()
}

fn exact(data: &Dataset, queries: &Dataset, k: usize) -> ResultSet {
    build(IndexParams::Linear, data, 0)
        .query(queries, k, Checks::Unlimited)
        .unwrap()
}

/// Number of true neighbours found, summed over all query rows.
fn hits(truth: &ResultSet, found: &ResultSet) -> usize {
    (0..truth.rows())
        .map(|r| {
            let t = truth.indices_row(r);
            found.indices_row(r).iter().filter(|id| t.contains(id)).count()
        })
        .sum()
}

fn recall(truth: &ResultSet, found: &ResultSet) -> f64 {
    hits(truth, found) as f64 / (truth.rows() * truth.k()) as f64
}

fn tree_families() -> Vec<IndexParams> {
    vec![
        IndexParams::KdTree(KdTreeParams::default().trees(4)),
        IndexParams::KMeans(KMeansParams::default().branching(8).iterations(5)),
        IndexParams::KMeans(
            KMeansParams::default()
                .branching(4)
                .iterations(0)
                .centers_init(CenterInit::KMeansPP),
        ),
        IndexParams::Composite(CompositeParams {
            trees: 2,
            branching: 6,
            iterations: 3,
            centers_init: CenterInit::Gonzales,
            cb_index: 0.4,
        }),
    ]
}

/// 1000 uniform points in R^8, four trees, k = 5, 64 checks.
///
/// Mean recall for this configuration sits just above 0.9 (about 0.91), and
/// small query batches regularly land below it. The bound here is relaxed on
/// purpose to 0.88 over an aggregate of 1000 queries from five independent
/// forests; the strict 0.9 bound is held at 128 checks below.
#[test]
fn test_kdtree_recall_at_64_checks() {
    let data = uniform(1000, 8, 1);
    let queries = uniform(200, 8, 2);
    let truth = exact(&data, &queries, 5);

    let mut found = 0;
    for seed in 0..5 {
        let index = build(IndexParams::KdTree(KdTreeParams::default().trees(4)), &data, seed);
        let results = index.query(&queries, 5, Checks::Limited(64)).unwrap();
        found += hits(&truth, &results);
    }
    let recall = found as f64 / (5 * 200 * 5) as f64;
    assert!(recall >= 0.88, "recall {:.3}", recall);
}

#[test]
fn test_kdtree_recall_at_128_checks() {
    let data = uniform(1000, 8, 3);
    let queries = uniform(100, 8, 4);
    let truth = exact(&data, &queries, 5);

    let index = build(IndexParams::KdTree(KdTreeParams::default().trees(4)), &data, 7);
    let results = index.query(&queries, 5, Checks::Limited(128)).unwrap();
    let recall = recall(&truth, &results);
    assert!(recall >= 0.9, "recall {:.3}", recall);
}

#[test]
fn test_recall_never_drops_as_checks_grow() {
    let data = uniform(400, 6, 5);
    let queries = uniform(40, 6, 6);
    let truth = exact(&data, &queries, 8);

    for params in tree_families() {
        let index = build(params, &data, 11);
        let mut previous = 0;
        for checks in [1, 2, 4, 8, 16, 32, 64, 128, 256, 512] {
            let results = index.query(&queries, 8, Checks::Limited(checks)).unwrap();
            let found = hits(&truth, &results);
            assert!(
                found >= previous,
                "{:?}: {} hits at {} checks after {}",
                params.family(),
                found,
                checks,
                previous
            );
            previous = found;
        }
        let full = index.query(&queries, 8, Checks::Unlimited).unwrap();
        assert!(hits(&truth, &full) >= previous);
    }
}

#[test]
fn test_unlimited_checks_are_exact() {
    let data = uniform(500, 5, 8);
    let queries = uniform(30, 5, 9);

    for k in [1, 7, 25] {
        let truth = exact(&data, &queries, k);
        for params in tree_families() {
            let index = build(params, &data, 3);
            let results = index.query(&queries, k, Checks::Unlimited).unwrap();
            assert_eq!(results, truth, "{:?} k={}", params.family(), k);
        }
    }
}

#[test]
fn test_budget_covering_every_row_is_exact() {
    let data = uniform(300, 4, 10);
    let queries = uniform(20, 4, 11);
    let truth = exact(&data, &queries, 6);

    for params in tree_families() {
        let index = build(params, &data, 5);
        let results = index.query(&queries, 6, Checks::Limited(300)).unwrap();
        assert_eq!(results, truth, "{:?}", params.family());
    }
}

#[test]
fn test_unlimited_exact_with_duplicates() {
    // Four copies of every point: ties must still come back in row order.
    let base = uniform(50, 3, 12);
    let rows: Vec<Vec<f64>> = (0..4).flat_map(|_| base.to_owned_rows()).collect();
    let data = Dataset::from_rows(&rows).unwrap();
    let queries = base.select_rows(&[0, 10, 49]).unwrap();
    let truth = exact(&data, &queries, 9);

    for params in tree_families() {
        let index = build(params, &data, 1);
        let results = index.query(&queries, 9, Checks::Unlimited).unwrap();
        assert_eq!(results, truth, "{:?}", params.family());
    }
}

#[test]
fn test_every_family_returns_k_neighbours() {
    let data = uniform(250, 4, 13);
    let queries = uniform(15, 4, 14);
    let mut families = tree_families();
    families.push(IndexParams::Linear);
    families.push(IndexParams::Lsh(LshParams::default().key_size(10)));

    for params in families {
        let index = build(params, &data, 2);
        let results = index.query(&queries, 12, Checks::Limited(1)).unwrap();
        assert_eq!(results.rows(), 15);
        assert_eq!(results.k(), 12);
        for r in 0..results.rows() {
            assert_eq!(results.neighbors(r).count(), 12, "{:?}", params.family());
        }
    }
}

fn arb_params() -> impl Strategy<Value = IndexParams> {
    prop_oneof![
        Just(IndexParams::Linear),
        (1usize..5).prop_map(|t| IndexParams::KdTree(KdTreeParams::default().trees(t))),
        (2usize..6, 0usize..4).prop_map(|(b, i)| IndexParams::KMeans(
            KMeansParams::default().branching(b).iterations(i)
        )),
        (1usize..3, 2usize..5).prop_map(|(t, b)| IndexParams::Composite(CompositeParams {
            trees: t,
            branching: b,
            iterations: 2,
            ..CompositeParams::default()
        })),
        (1usize..6, 1usize..12, 0usize..2).prop_map(|(t, bits, level)| IndexParams::Lsh(
            LshParams::default()
                .table_count(t)
                .key_size(bits)
                .multi_probe_level(level)
        )),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Distances come back non-decreasing, ties ordered by row, for any family and budget.
    #[test]
    fn prop_distances_sorted(
        params in arb_params(),
        rows in 1usize..80,
        dim in 1usize..5,
        seed in any::<u64>(),
        k_seed in 0usize..100,
        checks in 1usize..64,
    ) {
        let data = uniform(rows, dim, seed);
        let queries = uniform(5, dim, seed.wrapping_add(1));
        let k = 1 + k_seed % rows;
        let index = build(params, &data, seed);

        let results = index.query(&queries, k, Checks::Limited(checks)).unwrap();
        for r in 0..results.rows() {
            let ids = results.indices_row(r);
            let dists = results.distances_row(r);
            for i in 1..k {
                prop_assert!(
                    dists[i - 1] < dists[i] || (dists[i - 1] == dists[i] && ids[i - 1] < ids[i]),
                    "row {} slot {}: {:?} / {:?}", r, i, dists, ids
                );
            }
        }
    }
}
