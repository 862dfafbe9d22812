//! Parameter validation tests.
//!
//! Out-of-domain parameters must be rejected with `InvalidParams` before any
//! construction work starts.

use nnsearch::{
    build_autotuned, build_composite, build_kdtree, build_kmeans, build_lsh, AnnError,
    AutotunedParams, CompositeParams, Dataset, IndexBuilder, IndexParams, KMeansParams,
    KdTreeParams, LshParams, DEFAULT_CHECKS,
};
use proptest::prelude::*;

fn data() -> Dataset {
    Dataset::new((0..200).map(|i| ((i * 17) % 23) as f64).collect(), 50, 4).unwrap()
}

fn assert_invalid(result: nnsearch::Result<nnsearch::Index>) {
    match result {
        Err(AnnError::InvalidParams(msg)) => assert!(!msg.is_empty()),
        Err(other) => panic!("expected InvalidParams, got {:?}", other),
        Ok(index) => panic!("expected InvalidParams, built {:?}", index.family()),
    }
}

#[test]
fn test_kdtree_needs_a_tree() {
    assert_invalid(build_kdtree(&data(), KdTreeParams { trees: 0 }));
    assert!(build_kdtree(&data(), KdTreeParams { trees: 1 }).is_ok());
}

#[test]
fn test_kmeans_domain() {
    assert_invalid(build_kmeans(&data(), KMeansParams::default().branching(0)));
    assert_invalid(build_kmeans(&data(), KMeansParams::default().branching(1)));
    assert_invalid(build_kmeans(&data(), KMeansParams::default().cb_index(-0.1)));
    assert_invalid(build_kmeans(&data(), KMeansParams::default().cb_index(f64::INFINITY)));
    assert!(build_kmeans(&data(), KMeansParams::default().branching(2).iterations(0)).is_ok());
}

#[test]
fn test_composite_domain() {
    let bad_trees = CompositeParams {
        trees: 0,
        ..CompositeParams::default()
    };
    let bad_branching = CompositeParams {
        branching: 1,
        ..CompositeParams::default()
    };
    assert_invalid(build_composite(&data(), bad_trees));
    assert_invalid(build_composite(&data(), bad_branching));
}

#[test]
fn test_lsh_domain() {
    assert_invalid(build_lsh(&data(), LshParams::default().table_count(0)));
    assert_invalid(build_lsh(&data(), LshParams::default().key_size(0)));
    assert_invalid(build_lsh(&data(), LshParams::default().key_size(65)));
    assert_invalid(build_lsh(
        &data(),
        LshParams::default().key_size(2).multi_probe_level(3),
    ));
    assert!(build_lsh(&data(), LshParams::default().multi_probe_level(4)).is_ok());
    assert!(build_lsh(&data(), LshParams::default().key_size(64).multi_probe_level(64)).is_ok());
}

#[test]
fn test_autotuned_domain() {
    assert_invalid(build_autotuned(&data(), AutotunedParams::default().target_precision(1.5)));
    assert_invalid(build_autotuned(&data(), AutotunedParams::default().target_precision(-0.1)));
    assert_invalid(build_autotuned(&data(), AutotunedParams::default().build_weight(-1.0)));
    assert_invalid(build_autotuned(&data(), AutotunedParams::default().memory_weight(f64::NAN)));
    assert_invalid(build_autotuned(&data(), AutotunedParams::default().sample_fraction(0.0)));
    assert_invalid(build_autotuned(&data(), AutotunedParams::default().sample_fraction(1.01)));
}

#[test]
fn test_defaults() {
    assert_eq!(KdTreeParams::default().trees, 4);
    let lsh = LshParams::default();
    assert_eq!((lsh.table_count, lsh.key_size, lsh.multi_probe_level), (12, 20, 2));
    let tuned = AutotunedParams::default();
    assert_eq!(tuned.target_precision, 0.8);
    assert_eq!(tuned.build_weight, 0.01);
    assert_eq!(tuned.memory_weight, 0.0);
    assert_eq!(tuned.sample_fraction, 0.1);
    assert_eq!(DEFAULT_CHECKS, 32);
}

#[test]
fn test_invalid_dataset_shapes() {
    assert!(matches!(
        Dataset::new(vec![], 0, 3),
        Err(AnnError::InvalidDataset(_))
    ));
    assert!(matches!(
        Dataset::new(vec![1.0, 2.0, 3.0], 2, 2),
        Err(AnnError::InvalidDataset(_))
    ));
    assert!(matches!(
        Dataset::new(vec![1.0, f64::NAN], 1, 2),
        Err(AnnError::InvalidDataset(_))
    ));
    assert!(matches!(
        Dataset::from_rows(&[vec![1.0, 2.0], vec![3.0]]),
        Err(AnnError::InvalidDataset(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Validation agrees with the documented LSH domain for every combination.
    #[test]
    fn prop_lsh_validation(tables in 0usize..4, bits in 0usize..70, level in 0usize..70) {
        let params = IndexParams::Lsh(
            LshParams::default()
                .table_count(tables)
                .key_size(bits)
                .multi_probe_level(level),
        );
        let valid = tables >= 1 && (1..=64).contains(&bits) && level <= bits;
        prop_assert_eq!(params.validate().is_ok(), valid);
    }

    /// A failed validation never produces an index.
    #[test]
    fn prop_kmeans_branching(branching in 0usize..6) {
        let params = IndexParams::KMeans(KMeansParams::default().branching(branching));
        let result = IndexBuilder::new(params)
            .seed(1)
            .build(&data());
        prop_assert_eq!(result.is_ok(), branching >= 2);
    }
}
