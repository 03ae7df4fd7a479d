//! Chunking layer: phrases in, sentences indexed, phrases out.
//!
//! Each added phrase is split into sentences and every sentence becomes an
//! engine entry. Searches run over sentences; results are mapped back to
//! the owning phrase and deduplicated per cursor so a phrase is returned
//! at most once, at the rank of its closest sentence.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::archive::{ArchiveReader, ArchiveWriter, entry_name};
use crate::chunking::phrases::{PhraseKey, PhraseRecord, PhraseSnapshot, PhraseTable, content_hash};
use crate::embedding::Embedder;
use crate::error::{SearchError, SearchResult};
use crate::search::{EntryKey, FetchBatch, FetchCount, FetchKey, SearchEngine};
use crate::split::{Splitter, spans_to_strings};

const PHRASES_ENTRY: &str = "phrases";

#[derive(Debug)]
enum LayerCursor {
    /// Sentence keys passed straight through
    Chunks,
    Phrases(PhraseCursor),
}

#[derive(Debug, Default)]
struct PhraseCursor {
    /// Phrases already queued or returned by this cursor
    emitted: HashSet<PhraseKey>,
    /// Mapped results not yet handed out, closest first
    pending: VecDeque<(PhraseKey, f32)>,
    /// The inner sentence cursor has completed and been released
    inner_done: bool,
}

/// Search over phrases built on a sentence-level [`SearchEngine`].
pub struct ChunkingLayer<E> {
    search: SearchEngine<E>,
    splitter: Splitter,
    phrases: PhraseTable,
    return_chunks: bool,
    cursors: HashMap<FetchKey, LayerCursor>,
}

impl<E: Embedder> ChunkingLayer<E> {
    pub fn new(search: SearchEngine<E>, splitter: Splitter) -> Self {
        Self {
            search,
            splitter,
            phrases: PhraseTable::new(),
            return_chunks: false,
            cursors: HashMap::new(),
        }
    }

    pub fn search_engine(&self) -> &SearchEngine<E> {
        &self.search
    }

    pub fn splitter(&self) -> &Splitter {
        &self.splitter
    }

    pub fn phrases(&self) -> &PhraseTable {
        &self.phrases
    }

    /// When set, searches opened afterwards return sentences instead of
    /// phrases. Cursors already open keep their mode.
    pub fn set_return_chunks(&mut self, return_chunks: bool) {
        self.return_chunks = return_chunks;
    }

    pub fn return_chunks(&self) -> bool {
        self.return_chunks
    }

    /// Sentences `text` would be stored as.
    pub async fn split(&self, text: &str) -> SearchResult<Vec<String>> {
        let spans = self.splitter.split(text, self.search.embedder().as_ref()).await?;
        Ok(spans_to_strings(text, &spans)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Splits `text`, stores its sentences and returns the phrase key.
    ///
    /// All sentences are encoded before anything is stored, so an encoding
    /// failure leaves the layer unchanged.
    pub async fn add(&mut self, text: &str, group: &str) -> SearchResult<PhraseKey> {
        let spans = self.splitter.split(text, self.search.embedder().as_ref()).await?;
        let sentences = spans_to_strings(text, &spans);

        let mut encoded = Vec::with_capacity(sentences.len());
        for sentence in &sentences {
            encoded.push(self.search.encode(sentence).await?);
        }

        let mut sentence_keys = Vec::with_capacity(sentences.len());
        for (sentence, embedding) in sentences.iter().zip(encoded) {
            match self.search.add_encoded(sentence, embedding, group) {
                Ok(key) => sentence_keys.push(key),
                Err(err) => {
                    for key in sentence_keys {
                        self.search.remove(key);
                    }
                    return Err(err);
                }
            }
        }

        let sentence_count = sentence_keys.len();
        let key = self.phrases.insert(PhraseRecord {
            sentences: sentence_keys,
            group: group.to_string(),
            hash: content_hash(text),
        });
        tracing::debug!(
            target: "ragsearch::chunking",
            "phrase {key} stored as {sentence_count} sentences in group '{group}'"
        );
        Ok(key)
    }

    /// The phrase text, rebuilt from its sentences.
    pub fn get(&self, key: PhraseKey) -> Option<String> {
        let record = self.phrases.get(key)?;
        record
            .sentences
            .iter()
            .map(|&sentence| self.search.get(sentence))
            .collect()
    }

    /// Removes a phrase and all of its sentences.
    pub fn remove(&mut self, key: PhraseKey) -> bool {
        let Some(record) = self.phrases.remove(key) else {
            return false;
        };
        for sentence in record.sentences {
            self.search.remove(sentence);
        }
        true
    }

    /// Removes every phrase of `group` whose text equals `text`.
    pub fn remove_text(&mut self, text: &str, group: &str) -> usize {
        let matching: Vec<PhraseKey> = self
            .phrases
            .candidates(content_hash(text), group)
            .into_iter()
            .filter(|&key| self.get(key).as_deref() == Some(text))
            .collect();
        for &key in &matching {
            self.remove(key);
        }
        matching.len()
    }

    pub fn count(&self) -> usize {
        self.phrases.len()
    }

    pub fn count_group(&self, group: &str) -> usize {
        self.phrases.count_group(group)
    }

    pub fn group_counts(&self) -> Vec<(String, usize)> {
        self.phrases.group_counts()
    }

    pub async fn incremental_search(&mut self, query: &str, group: &str) -> SearchResult<FetchKey> {
        let fetch_key = self.search.incremental_search(query, group).await?;
        let cursor = if self.return_chunks {
            LayerCursor::Chunks
        } else {
            LayerCursor::Phrases(PhraseCursor::default())
        };
        self.cursors.insert(fetch_key, cursor);
        Ok(fetch_key)
    }

    /// Next `count` phrase keys (or sentence keys in chunk mode).
    pub fn incremental_fetch_keys(&mut self, fetch_key: FetchKey, count: FetchCount) -> SearchResult<FetchBatch<EntryKey>> {
        let cursor = self
            .cursors
            .get_mut(&fetch_key)
            .ok_or(SearchError::UnknownCursor { fetch_key })?;

        let cursor = match cursor {
            LayerCursor::Chunks => {
                let batch = self.search.incremental_fetch_keys(fetch_key, count)?;
                if batch.completed {
                    self.cursors.remove(&fetch_key);
                }
                return Ok(batch);
            }
            LayerCursor::Phrases(cursor) => cursor,
        };

        // Pull sentence results until enough distinct phrases are queued
        loop {
            let queued = cursor.pending.len();
            let inner_count = match count {
                FetchCount::Next(n) if queued >= n => break,
                FetchCount::Next(n) => FetchCount::Next(n - queued),
                FetchCount::All => FetchCount::All,
            };
            if cursor.inner_done {
                break;
            }

            let batch = self.search.incremental_fetch_keys(fetch_key, inner_count)?;
            for (sentence, distance) in batch.items.into_iter().zip(batch.distances) {
                let Some(phrase) = self.phrases.owner(sentence) else {
                    tracing::warn!(
                        target: "ragsearch::chunking",
                        "cursor {fetch_key} skipped sentence {sentence} with no owning phrase"
                    );
                    continue;
                };
                if cursor.emitted.insert(phrase) {
                    cursor.pending.push_back((phrase, distance));
                }
            }
            cursor.inner_done = batch.completed;
        }

        let take = count.take_from(cursor.pending.len());
        let (items, distances): (Vec<_>, Vec<_>) = cursor.pending.drain(..take).unzip();
        let completed = cursor.inner_done && cursor.pending.is_empty();
        if completed {
            self.cursors.remove(&fetch_key);
        }
        Ok(FetchBatch {
            items,
            distances,
            completed,
        })
    }

    /// Like [`incremental_fetch_keys`](Self::incremental_fetch_keys) but
    /// returns phrase (or sentence) texts.
    pub fn incremental_fetch(&mut self, fetch_key: FetchKey, count: FetchCount) -> SearchResult<FetchBatch<String>> {
        let chunks = matches!(self.cursors.get(&fetch_key), Some(LayerCursor::Chunks));
        let batch = self.incremental_fetch_keys(fetch_key, count)?;

        let mut items = Vec::with_capacity(batch.len());
        let mut distances = Vec::with_capacity(batch.len());
        for (key, distance) in batch.items.into_iter().zip(batch.distances) {
            let text = if chunks {
                self.search.get(key).map(str::to_string)
            } else {
                self.get(key)
            };
            if let Some(text) = text {
                items.push(text);
                distances.push(distance);
            }
        }
        Ok(FetchBatch {
            items,
            distances,
            completed: batch.completed,
        })
    }

    /// Releases a cursor and its inner sentence cursor. Idempotent.
    pub fn incremental_search_complete(&mut self, fetch_key: FetchKey) {
        self.cursors.remove(&fetch_key);
        self.search.incremental_search_complete(fetch_key);
    }

    /// One-shot search: the `k` closest phrases of `group`.
    pub async fn search(&mut self, query: &str, k: usize, group: &str) -> SearchResult<(Vec<String>, Vec<f32>)> {
        let fetch_key = self.incremental_search(query, group).await?;
        let batch = self.incremental_fetch(fetch_key, FetchCount::Next(k));
        self.incremental_search_complete(fetch_key);
        let batch = batch?;
        Ok((batch.items, batch.distances))
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    pub fn clear(&mut self) {
        self.search.clear();
        self.phrases.clear();
        self.cursors.clear();
    }

    pub fn save_to(&self, writer: &mut ArchiveWriter) -> SearchResult<()> {
        self.search.save_to(writer)?;
        writer.save_entry(
            entry_name(self.splitter.archive_owner(), PHRASES_ENTRY),
            &self.phrases.snapshot(),
        )
    }

    /// Replaces the layer's contents with those stored in `reader`; on
    /// error nothing changes.
    pub fn load_from(&mut self, reader: &ArchiveReader) -> SearchResult<()> {
        let state = self.search.read_state(reader)?;

        let name = entry_name(self.splitter.archive_owner(), PHRASES_ENTRY);
        let snapshot: PhraseSnapshot = reader.load_entry(&name)?;
        let phrases =
            PhraseTable::from_snapshot(snapshot).map_err(|reason| SearchError::corrupt_entry(&name, reason))?;

        let mut owned = 0;
        for (key, record) in phrases.records() {
            for &sentence in &record.sentences {
                if state.group_of(sentence) != Some(record.group.as_str()) {
                    return Err(SearchError::corrupt_entry(
                        &name,
                        format!("phrase {key} references sentence {sentence} missing from group '{}'", record.group),
                    ));
                }
            }
            owned += record.sentences.len();
        }
        if owned != state.len() {
            return Err(SearchError::corrupt_entry(
                &name,
                "stored sentences are not all owned by a phrase",
            ));
        }

        self.search.apply_state(state);
        self.phrases = phrases;
        self.cursors.clear();
        Ok(())
    }
}
