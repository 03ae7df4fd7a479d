//! Engine behavior shared by the brute-force and ANN backends.

use std::collections::BTreeSet;

use crate::common::{FixtureEmbedder, engine, random_vectors};
use ragsearch::{EntryKey, FetchCount, Metric, SearchError, SearchMethod};

const METHODS: [SearchMethod; 2] = [SearchMethod::BruteForce, SearchMethod::Ann];

#[tokio::test]
async fn test_literal_two_dimensional_scenario() {
    for method in METHODS {
        let embedder = FixtureEmbedder::new(2)
            .pin("zero", vec![1.0, 0.0])
            .pin("one", vec![0.0, 1.0])
            .pin("two", vec![0.9, 0.1]);
        let mut engine = engine(embedder, method);
        for text in ["zero", "one", "two"] {
            engine.add(text, "").await.unwrap();
        }

        let fetch_key = engine.incremental_search_vector(vec![1.0, 0.0], "").unwrap();
        let batch = engine.incremental_fetch_keys(fetch_key, FetchCount::Next(2)).unwrap();

        assert_eq!(batch.items, vec![0, 2], "{method}");
        assert!(batch.distances[0].abs() < 1e-6);
        assert!((batch.distances[1] - 0.006_116).abs() < 1e-3, "{method}: {}", batch.distances[1]);
        assert!(!batch.completed);
        engine.incremental_search_complete(fetch_key);
    }
}

#[tokio::test]
async fn test_brute_force_matches_ground_truth_bit_for_bit() {
    let vectors = random_vectors(200, 16, 7);
    let query = random_vectors(1, 16, 99).remove(0);
    let mut engine = engine(FixtureEmbedder::new(16), SearchMethod::BruteForce);
    for (i, vector) in vectors.iter().enumerate() {
        engine.add_encoded(&format!("v{i}"), vector.clone(), "").unwrap();
    }

    let mut truth: Vec<(EntryKey, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i as EntryKey, Metric::Cos.distance(&query, v)))
        .collect();
    truth.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let fetch_key = engine.incremental_search_vector(query, "").unwrap();
    let batch = engine.incremental_fetch_keys(fetch_key, FetchCount::Next(200)).unwrap();

    let keys: Vec<EntryKey> = truth.iter().map(|(k, _)| *k).collect();
    let distances: Vec<u32> = truth.iter().map(|(_, d)| d.to_bits()).collect();
    assert_eq!(batch.items, keys);
    assert_eq!(batch.distances.iter().map(|d| d.to_bits()).collect::<Vec<_>>(), distances);
    assert!(batch.completed);
}

#[tokio::test]
async fn test_ann_returns_every_key_in_distance_order() {
    let vectors = random_vectors(500, 16, 11);
    let query = random_vectors(1, 16, 12).remove(0);

    let mut ann = engine(FixtureEmbedder::new(16), SearchMethod::Ann);
    let mut exact = engine(FixtureEmbedder::new(16), SearchMethod::BruteForce);
    for (i, vector) in vectors.iter().enumerate() {
        ann.add_encoded(&format!("v{i}"), vector.clone(), "").unwrap();
        exact.add_encoded(&format!("v{i}"), vector.clone(), "").unwrap();
    }

    let fetch_key = ann.incremental_search_vector(query.clone(), "").unwrap();
    let batch = ann.incremental_fetch_keys(fetch_key, FetchCount::All).unwrap();
    assert!(batch.completed);
    assert_eq!(batch.len(), 500);
    assert!(batch.distances.windows(2).all(|w| w[0] <= w[1]));
    let returned: BTreeSet<EntryKey> = batch.items.iter().copied().collect();
    assert_eq!(returned.len(), 500);

    // Top-10 recall against the exact ranking
    let fetch_key = ann.incremental_search_vector(query.clone(), "").unwrap();
    let approximate = ann.incremental_fetch_keys(fetch_key, FetchCount::Next(10)).unwrap();
    let fetch_key = exact.incremental_search_vector(query, "").unwrap();
    let truth = exact.incremental_fetch_keys(fetch_key, FetchCount::Next(10)).unwrap();
    let hits = approximate.items.iter().filter(|k| truth.items.contains(k)).count();
    assert!(hits >= 9, "recall {hits}/10");
}

#[tokio::test]
async fn test_single_step_fetches_match_fetch_all() {
    // Large enough that the ANN index spreads the group over many lists
    for method in METHODS {
        let vectors = random_vectors(3000, 8, 3);
        let query = random_vectors(1, 8, 4).remove(0);
        let mut engine = engine(FixtureEmbedder::new(8), method);
        for (i, vector) in vectors.into_iter().enumerate() {
            engine.add_encoded(&format!("v{i}"), vector, "").unwrap();
        }

        let all_key = engine.incremental_search_vector(query.clone(), "").unwrap();
        let all = engine.incremental_fetch_keys(all_key, FetchCount::All).unwrap();
        assert!(all.completed);

        let step_key = engine.incremental_search_vector(query, "").unwrap();
        let mut stepped = Vec::new();
        let mut distances = Vec::new();
        loop {
            let batch = engine.incremental_fetch_keys(step_key, FetchCount::Next(1)).unwrap();
            assert!(batch.len() <= 1);
            stepped.extend(batch.items);
            distances.extend(batch.distances);
            if batch.completed {
                break;
            }
        }

        assert_eq!(all.len(), 3000, "{method}");
        assert_eq!(stepped, all.items, "{method}");
        assert!(distances.windows(2).all(|w| w[0] <= w[1]), "{method}");
        assert!(matches!(
            engine.incremental_fetch_keys(step_key, FetchCount::Next(1)),
            Err(SearchError::UnknownCursor { .. })
        ));
    }
}

#[tokio::test]
async fn test_keys_stay_unique_across_removals() {
    for method in METHODS {
        let mut engine = engine(FixtureEmbedder::new(8), method);
        let mut issued = BTreeSet::new();
        for round in 0..5 {
            for i in 0..10 {
                let key = engine.add(&format!("round {round} item {i}"), "").await.unwrap();
                assert!(issued.insert(key), "key {key} issued twice");
            }
            let victims: Vec<EntryKey> = engine.keys_in_group("").step_by(2).collect();
            for key in victims {
                assert!(engine.remove(key));
            }
        }
        assert_eq!(issued.len(), 50);
        assert_eq!(engine.count(), engine.keys_in_group("").count());
    }
}

#[tokio::test]
async fn test_groups_partition_live_keys() {
    let mut engine = engine(FixtureEmbedder::new(8), SearchMethod::Ann);
    let groups = ["", "docs", "notes"];
    for i in 0..30 {
        engine.add(&format!("entry number {i}"), groups[i % 3]).await.unwrap();
    }
    engine.remove(4);
    engine.remove_text("entry number 5", "notes");

    let mut seen = BTreeSet::new();
    for group in groups {
        for key in engine.keys_in_group(group) {
            assert!(seen.insert(key), "key {key} in two groups");
            assert_eq!(engine.group_of(key), Some(group));
        }
    }
    assert_eq!(seen.len(), engine.count());
    assert_eq!(engine.count(), 28);

    // A search never leaves its group
    let fetch_key = engine.incremental_search("entry number", "docs").await.unwrap();
    let batch = engine.incremental_fetch_keys(fetch_key, FetchCount::All).unwrap();
    assert_eq!(batch.len(), engine.count_group("docs"));
    assert!(batch.items.iter().all(|&key| engine.group_of(key) == Some("docs")));
}

#[tokio::test]
async fn test_removed_entries_are_skipped_by_text_fetch() {
    let mut engine = engine(FixtureEmbedder::new(8), SearchMethod::BruteForce);
    for text in ["alpha", "beta", "gamma"] {
        engine.add(text, "").await.unwrap();
    }
    let fetch_key = engine.incremental_search("alpha", "").await.unwrap();
    engine.remove(0);

    let batch = engine.incremental_fetch(fetch_key, FetchCount::All).unwrap();
    assert_eq!(batch.len(), 2);
    assert!(!batch.items.contains(&"alpha".to_string()));
}
