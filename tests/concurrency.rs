//! Concurrent query tests.
//!
//! Built indices are immutable and shared between threads without locks;
//! every thread must see exactly the sequential answers.

use nnsearch::{
    Checks, CompositeParams, Dataset, Index, IndexBuilder, IndexParams, KMeansParams,
    KdTreeParams, LshParams, ResultSet,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::thread;

fn uniform(rows: usize, dim: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..rows * dim).map(|_| rng.gen::<f64>()).collect();
    Dataset::new(data, rows, dim).unwrap()
}

fn families() -> Vec<IndexParams> {
    vec![
        IndexParams::Linear,
        IndexParams::KdTree(KdTreeParams::default().trees(4)),
        IndexParams::KMeans(KMeansParams::default().branching(8).iterations(3)),
        IndexParams::Composite(CompositeParams {
            branching: 8,
            iterations: 3,
            ..CompositeParams::default()
        }),
        IndexParams::Lsh(LshParams::default().key_size(12)),
    ]
}

#[test]
fn test_index_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Index>();
    assert_send_sync::<Dataset>();
    assert_send_sync::<ResultSet>();
}

#[test]
fn test_threads_share_one_index() {
    let data = uniform(2000, 6, 1);
    let queries = uniform(64, 6, 2);

    for params in families() {
        let index = Arc::new(IndexBuilder::new(params).seed(3).build(&data).unwrap());
        let expected = index.query(&queries, 5, Checks::Limited(48)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = Arc::clone(&index);
                let queries = queries.clone();
                thread::spawn(move || index.query(&queries, 5, Checks::Limited(48)).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected, "{:?}", params.family());
        }
    }
}

#[test]
fn test_scoped_single_queries_match_batch() {
    let data = uniform(1500, 4, 4);
    let queries = uniform(100, 4, 5);
    let index = IndexBuilder::new(IndexParams::KdTree(KdTreeParams::default()))
        .seed(6)
        .build(&data)
        .unwrap();
    let expected = index.query(&queries, 3, Checks::Limited(32)).unwrap();

    thread::scope(|s| {
        for t in 0..4 {
            let index = &index;
            let queries = &queries;
            let expected = &expected;
            s.spawn(move || {
                for r in (t..queries.rows()).step_by(4) {
                    let hits = index.knn(queries.row(r).unwrap(), 3, Checks::Limited(32)).unwrap();
                    let ids: Vec<usize> = hits.iter().map(|h| h.index).collect();
                    assert_eq!(&ids[..], expected.indices_row(r));
                }
            });
        }
    });
}

#[test]
fn test_query_parallel_matches_sequential() {
    let data = uniform(1000, 5, 7);
    let queries = uniform(37, 5, 8);

    for params in families() {
        let index = IndexBuilder::new(params).seed(9).build(&data).unwrap();
        let sequential = index.query(&queries, 6, Checks::Limited(20)).unwrap();
        for threads in [1, 3, 8, 100] {
            let parallel = index.query_parallel(&queries, 6, Checks::Limited(20), threads).unwrap();
            assert_eq!(parallel, sequential, "{:?} threads={}", params.family(), threads);
        }
    }
}

#[test]
fn test_independent_indices_built_concurrently() {
    let data = uniform(800, 4, 10);
    let queries = uniform(10, 4, 11);

    let built: Vec<(IndexParams, ResultSet)> = thread::scope(|s| {
        let handles: Vec<_> = families()
            .into_iter()
            .map(|params| {
                let data = &data;
                let queries = &queries;
                s.spawn(move || {
                    let index = IndexBuilder::new(params).seed(12).build(data).unwrap();
                    (params, index.query(queries, 4, Checks::Unlimited).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (params, results) in built {
        let again = IndexBuilder::new(params)
            .seed(12)
            .build(&data)
            .unwrap()
            .query(&queries, 4, Checks::Unlimited)
            .unwrap();
        assert_eq!(results, again, "{:?}", params.family());
    }
}

#[test]
fn test_dataset_outlives_caller_handle() {
    let index = {
        let data = uniform(300, 3, 13);
        IndexBuilder::new(IndexParams::Linear).build(&data).unwrap()
    };
    let hits = index
        .knn(&[0.5, 0.5, 0.5], 3, Checks::Unlimited)
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(index.dataset().rows(), 300);
}
