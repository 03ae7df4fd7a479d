//! Archive round trips through real files.

use std::sync::Arc;

use crate::common::{FixtureEmbedder, exact_params};
use ragsearch::{
    ArchiveReader, ChunkingMethod, FetchCount, Metric, Rag, SearchError, SearchMethod, SentenceSplitter, Splitter,
};
use tempfile::TempDir;

const CORPUS: &[(&str, &str)] = &[
    ("Rust has ownership. Borrowing is checked at compile time.", "lang"),
    ("Python is dynamically typed. It has a garbage collector.", "lang"),
    ("Bread needs flour, water and yeast. Let it rise overnight.", "food"),
    ("Pasta cooks in salted water. Drain it before serving.", "food"),
    ("Compilers turn source code into machine code.", ""),
];

fn rag(method: SearchMethod, chunked: bool) -> Rag<FixtureEmbedder> {
    let splitter = chunked.then(|| Splitter::Sentence(SentenceSplitter::default()));
    Rag::with_splitter(Arc::new(FixtureEmbedder::new(32)), method, exact_params(Metric::Cos), splitter).unwrap()
}

#[tokio::test]
async fn test_round_trip_preserves_counts_texts_and_results() {
    for method in [SearchMethod::BruteForce, SearchMethod::Ann] {
        for chunked in [false, true] {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("store").join("index.tar.gz");

            let mut source = rag(method, chunked);
            let mut keys = Vec::new();
            for (text, group) in CORPUS {
                keys.push(source.add(text, group).await.unwrap());
            }
            source.remove(keys[1]);
            source.save(&path).unwrap();

            let mut restored = rag(method, chunked);
            restored.add("stale entry that the load replaces", "").await.unwrap();
            restored.clear();
            assert!(restored.load(&path).unwrap());

            assert_eq!(restored.count(), source.count(), "{method} chunked={chunked}");
            assert_eq!(restored.group_counts(), source.group_counts());
            for &key in &keys {
                assert_eq!(restored.get(key), source.get(key));
            }
            for (query, group) in [("compile time ownership", "lang"), ("water", "food"), ("code", "")] {
                assert_eq!(
                    restored.search(query, 3, group).await.unwrap(),
                    source.search(query, 3, group).await.unwrap(),
                    "{method} chunked={chunked} query={query}"
                );
            }
        }
    }
}

#[tokio::test]
async fn test_cursors_are_not_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.tar.gz");

    let mut source = rag(SearchMethod::BruteForce, false);
    source.add("something", "").await.unwrap();
    let fetch_key = source.incremental_search("something", "").await.unwrap();
    source.save(&path).unwrap();

    let mut restored = rag(SearchMethod::BruteForce, false);
    restored.load(&path).unwrap();
    assert!(matches!(
        restored.incremental_fetch_keys(fetch_key, FetchCount::All),
        Err(SearchError::UnknownCursor { .. })
    ));
    // New cursors do not collide with keys handed out before the save
    assert!(restored.incremental_search("something", "").await.unwrap() > fetch_key);
}

#[tokio::test]
async fn test_truncated_archive_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.tar.gz");

    let mut source = rag(SearchMethod::Ann, false);
    for i in 0..50 {
        source.add(&format!("entry {i} of the archive"), "").await.unwrap();
    }
    source.save(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let mut target = rag(SearchMethod::Ann, false);
    target.add("kept", "").await.unwrap();
    assert!(target.load(&path).is_err());
    assert_eq!(target.count(), 1);
    assert_eq!(target.get(0).as_deref(), Some("kept"));
}

#[tokio::test]
async fn test_archive_entries_are_named_by_owner() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.tar.gz");

    let mut chunked = Rag::new(
        Arc::new(FixtureEmbedder::new(8)),
        SearchMethod::Ann,
        ChunkingMethod::Sentence,
    )
    .unwrap();
    chunked.add("One. Two.", "").await.unwrap();
    chunked.save(&path).unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    for name in [
        "AnnSearch/entries",
        "AnnSearch/groups",
        "AnnSearch/counters",
        "AnnSearch/index",
        "SentenceSplitter/phrases",
    ] {
        assert!(reader.contains(name), "missing {name}");
    }
}
