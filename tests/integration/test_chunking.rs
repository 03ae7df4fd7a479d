//! Splitters and the phrase layer.

use std::sync::Arc;

use crate::common::{FixtureEmbedder, engine, exact_params};
use ragsearch::{
    ChunkingLayer, FetchCount, Metric, SearchEngine, SearchMethod, SentenceSplitter, Splitter, TokenSplitter,
    WordSplitter, spans_to_strings,
};

const SAMPLES: &[&str] = &[
    "",
    "single",
    "Plain sentence without a stop",
    "One. Two! Three? Four: five; six\nseven\r\neight",
    "   leading spaces... and trailing   ",
    "...!!!",
    "Ünïcödé wörds — with dashes, «quotes» and emoji 🚀 here.",
    "tabs\tand\nnew\n\nlines\n",
    "a.b.c.d.e.f.g",
];

fn splitters() -> Vec<Splitter> {
    vec![
        Splitter::Sentence(SentenceSplitter::default()),
        Splitter::Word(WordSplitter::new(1).unwrap()),
        Splitter::Word(WordSplitter::new(4).unwrap()),
        Splitter::Token(TokenSplitter::new(1).unwrap()),
        Splitter::Token(TokenSplitter::new(6).unwrap()),
    ]
}

#[tokio::test]
async fn test_splitters_reproduce_their_input() {
    let embedder = FixtureEmbedder::new(4);
    for splitter in splitters() {
        for &sample in SAMPLES {
            let spans = splitter.split(sample, &embedder).await.unwrap();
            assert_eq!(spans_to_strings(sample, &spans).concat(), sample, "{splitter:?}");
            assert!(spans.iter().all(|span| !span.is_empty()), "{splitter:?} on {sample:?}");
            assert!(spans.windows(2).all(|w| w[0].end == w[1].start));
        }
    }
}

#[tokio::test]
async fn test_get_returns_added_text_for_every_splitter() {
    for splitter in splitters() {
        for method in [SearchMethod::BruteForce, SearchMethod::Ann] {
            let mut layer = ChunkingLayer::new(engine(FixtureEmbedder::new(8), method), splitter.clone());
            let mut keys = Vec::new();
            for &sample in SAMPLES {
                keys.push(layer.add(sample, "").await.unwrap());
            }
            for (&sample, key) in SAMPLES.iter().zip(keys) {
                assert_eq!(layer.get(key).as_deref(), Some(sample), "{splitter:?}");
            }
            assert_eq!(layer.count(), SAMPLES.len());
        }
    }
}

/// Every sentence of "A B C" lies close to the query; "far away" does not.
fn abc_embedder() -> FixtureEmbedder {
    FixtureEmbedder::new(3)
        .pin("A ", vec![1.0, 0.0, 0.0])
        .pin("B ", vec![0.99, 0.14, 0.0])
        .pin("C", vec![0.98, 0.2, 0.0])
        .pin("far ", vec![0.0, 0.0, 1.0])
        .pin("away", vec![0.0, 0.1, 1.0])
        .pin("query", vec![1.0, 0.0, 0.0])
}

#[tokio::test]
async fn test_phrase_returned_once_when_all_sentences_match() {
    let splitter = Splitter::Sentence(SentenceSplitter::new(" ").unwrap());

    for method in [SearchMethod::BruteForce, SearchMethod::Ann] {
        let search = SearchEngine::new(Arc::new(abc_embedder()), method, exact_params(Metric::Cos)).unwrap();
        let mut layer = ChunkingLayer::new(search, splitter.clone());
        let phrase = layer.add("A B C", "").await.unwrap();
        let other = layer.add("far away", "").await.unwrap();
        assert_eq!(layer.search_engine().count(), 5);

        let fetch_key = layer.incremental_search("query", "").await.unwrap();
        let first = layer.incremental_fetch_keys(fetch_key, FetchCount::Next(1)).unwrap();
        assert_eq!(first.items, vec![phrase], "{method}");
        assert!(!first.completed);

        let rest = layer.incremental_fetch_keys(fetch_key, FetchCount::Next(5)).unwrap();
        assert_eq!(rest.items, vec![other], "{method}");
        assert!(rest.completed);

        // With chunks returned, each sentence comes back on its own
        layer.set_return_chunks(true);
        let fetch_key = layer.incremental_search("query", "").await.unwrap();
        let chunks = layer.incremental_fetch(fetch_key, FetchCount::Next(3)).unwrap();
        assert_eq!(chunks.items, vec!["A ", "B ", "C"], "{method}");
        layer.incremental_search_complete(fetch_key);
    }
}

#[tokio::test]
async fn test_phrase_pages_match_fetch_all() {
    let texts = [
        "The cat sat. It purred loudly.",
        "Dogs bark at night. Cats sleep all day. Birds sing.",
        "Nothing related here.",
        "A cat and a dog met. They became friends.",
    ];
    let mut layer = ChunkingLayer::new(
        engine(FixtureEmbedder::new(16), SearchMethod::BruteForce),
        Splitter::Sentence(SentenceSplitter::default()),
    );
    for text in texts {
        layer.add(text, "").await.unwrap();
    }

    let all_key = layer.incremental_search("cat", "").await.unwrap();
    let all = layer.incremental_fetch_keys(all_key, FetchCount::All).unwrap();
    assert!(all.completed);
    assert_eq!(all.len(), texts.len());

    let step_key = layer.incremental_search("cat", "").await.unwrap();
    let mut stepped = Vec::new();
    loop {
        let batch = layer.incremental_fetch_keys(step_key, FetchCount::Next(1)).unwrap();
        stepped.extend(batch.items);
        if batch.completed {
            break;
        }
    }
    assert_eq!(stepped, all.items);
    assert_eq!(layer.open_cursors(), 0);
}

#[tokio::test]
async fn test_remove_text_and_groups() {
    let mut layer = ChunkingLayer::new(
        engine(FixtureEmbedder::new(8), SearchMethod::Ann),
        Splitter::Word(WordSplitter::new(2).unwrap()),
    );
    layer.add("shared words in a phrase", "a").await.unwrap();
    layer.add("shared words in a phrase", "b").await.unwrap();
    layer.add("another phrase entirely", "a").await.unwrap();

    assert_eq!(layer.remove_text("shared words in a phrase", "a"), 1);
    assert_eq!(layer.remove_text("shared words in a", "b"), 0);
    assert_eq!(layer.count_group("a"), 1);
    assert_eq!(layer.count_group("b"), 1);
    // 3 chunks remain for "b", 2 for "another phrase entirely"
    assert_eq!(layer.search_engine().count(), 5);

    let (texts, _) = layer.search("shared", 5, "a").await.unwrap();
    assert_eq!(texts, vec!["another phrase entirely"]);
}
