//! The search engine: entry bookkeeping, groups, and incremental search.
//!
//! Entries are texts stored under monotonically increasing keys and tagged
//! with a group name. Every search is scoped to one group. Ranking is
//! delegated to the configured backend; this module owns keys, groups,
//! fetch-key allocation and persistence of the shared state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveReader, ArchiveWriter, entry_name};
use crate::embedding::Embedder;
use crate::error::{SearchError, SearchResult};
use crate::search::ann::AnnBackend;
use crate::search::brute_force::BruteForceBackend;
use crate::search::cursor::{EntryKey, FetchBatch, FetchCount, FetchKey};
use crate::vector::{IndexParams, VectorDimension};

/// Which ranking strategy an engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    #[default]
    BruteForce,
    Ann,
}

impl SearchMethod {
    /// Owner prefix of this engine's archive entries.
    pub fn archive_owner(self) -> &'static str {
        match self {
            Self::BruteForce => "BruteForceSearch",
            Self::Ann => "AnnSearch",
        }
    }
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BruteForce => write!(f, "brute_force"),
            Self::Ann => write!(f, "ann"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
struct EntryRecord {
    text: String,
    group: String,
}

#[derive(Debug, Clone, Copy, Encode, Decode)]
struct KeyCounters {
    next_key: EntryKey,
    next_fetch_key: FetchKey,
}

#[derive(Debug)]
enum Backend {
    BruteForce(BruteForceBackend),
    Ann(AnnBackend),
}

/// Fully decoded engine state, built before anything is replaced so a
/// failed load never leaves a half-restored engine.
#[derive(Debug)]
pub(crate) struct EngineState {
    entries: BTreeMap<EntryKey, EntryRecord>,
    groups: BTreeMap<String, BTreeSet<EntryKey>>,
    counters: KeyCounters,
    backend: Backend,
}

impl EngineState {
    pub fn contains_key(&self, key: EntryKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn group_of(&self, key: EntryKey) -> Option<&str> {
        self.entries.get(&key).map(|e| e.group.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Semantic search over texts, scoped by group.
pub struct SearchEngine<E> {
    embedder: Arc<E>,
    dimension: VectorDimension,
    method: SearchMethod,
    params: IndexParams,
    entries: BTreeMap<EntryKey, EntryRecord>,
    groups: BTreeMap<String, BTreeSet<EntryKey>>,
    next_key: EntryKey,
    next_fetch_key: FetchKey,
    backend: Backend,
}

impl<E: Embedder> SearchEngine<E> {
    pub fn new(embedder: Arc<E>, method: SearchMethod, params: IndexParams) -> SearchResult<Self> {
        let dimension = VectorDimension::new(embedder.dimension())?;
        params.validate()?;
        let backend = Self::empty_backend(method, dimension.get(), params)?;

        tracing::debug!(
            target: "ragsearch::search",
            "created {method} engine (dimension {}, metric {})",
            dimension.get(),
            params.metric.as_str()
        );

        Ok(Self {
            embedder,
            dimension,
            method,
            params,
            entries: BTreeMap::new(),
            groups: BTreeMap::new(),
            next_key: 0,
            next_fetch_key: 0,
            backend,
        })
    }

    fn empty_backend(method: SearchMethod, dimension: usize, params: IndexParams) -> SearchResult<Backend> {
        Ok(match method {
            SearchMethod::BruteForce => Backend::BruteForce(BruteForceBackend::new(params.metric)),
            SearchMethod::Ann => Backend::Ann(AnnBackend::new(dimension, params)?),
        })
    }

    pub fn embedder(&self) -> &Arc<E> {
        &self.embedder
    }

    pub fn method(&self) -> SearchMethod {
        self.method
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn dimension(&self) -> usize {
        self.dimension.get()
    }

    /// Embeds `text`, checking the vector against the engine dimension.
    pub async fn encode(&self, text: &str) -> SearchResult<Vec<f32>> {
        let embedding = self.embedder.encode(text).await?;
        self.dimension.validate_vector(&embedding)?;
        Ok(embedding)
    }

    /// Stores `text` in `group` and returns its new key.
    ///
    /// Encoding happens first; if it fails the engine is unchanged.
    pub async fn add(&mut self, text: &str, group: &str) -> SearchResult<EntryKey> {
        let embedding = self.encode(text).await?;
        self.add_encoded(text, embedding, group)
    }

    /// Stores `text` with a precomputed embedding.
    pub fn add_encoded(&mut self, text: &str, embedding: Vec<f32>, group: &str) -> SearchResult<EntryKey> {
        self.dimension.validate_vector(&embedding)?;
        let key = self.next_key;

        match &mut self.backend {
            Backend::BruteForce(backend) => backend.insert(key, embedding),
            Backend::Ann(backend) => backend.insert(key, &embedding)?,
        }

        self.next_key += 1;
        self.entries.insert(
            key,
            EntryRecord {
                text: text.to_string(),
                group: group.to_string(),
            },
        );
        self.groups.entry(group.to_string()).or_default().insert(key);
        Ok(key)
    }

    pub fn get(&self, key: EntryKey) -> Option<&str> {
        self.entries.get(&key).map(|e| e.text.as_str())
    }

    pub fn group_of(&self, key: EntryKey) -> Option<&str> {
        self.entries.get(&key).map(|e| e.group.as_str())
    }

    /// Removes one entry. Returns false when `key` is unknown.
    pub fn remove(&mut self, key: EntryKey) -> bool {
        let Some(record) = self.entries.remove(&key) else {
            return false;
        };
        if let Some(members) = self.groups.get_mut(&record.group) {
            members.remove(&key);
            if members.is_empty() {
                self.groups.remove(&record.group);
            }
        }
        match &mut self.backend {
            Backend::BruteForce(backend) => backend.remove(key),
            Backend::Ann(backend) => backend.remove(key),
        }
        true
    }

    /// Removes every entry of `group` whose text equals `text`.
    pub fn remove_text(&mut self, text: &str, group: &str) -> usize {
        let matching: Vec<EntryKey> = self
            .keys_in_group(group)
            .filter(|key| self.get(*key) == Some(text))
            .collect();
        for key in &matching {
            self.remove(*key);
        }
        matching.len()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn count_group(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, BTreeSet::len)
    }

    pub fn keys_in_group(&self, group: &str) -> impl Iterator<Item = EntryKey> + '_ {
        self.groups.get(group).into_iter().flatten().copied()
    }

    /// Non-empty groups with their entry counts.
    pub fn group_counts(&self) -> Vec<(String, usize)> {
        self.groups
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect()
    }

    pub fn open_cursors(&self) -> usize {
        match &self.backend {
            Backend::BruteForce(backend) => backend.open_cursors(),
            Backend::Ann(backend) => backend.open_cursors(),
        }
    }

    /// Opens an incremental search for `query` within `group`.
    pub async fn incremental_search(&mut self, query: &str, group: &str) -> SearchResult<FetchKey> {
        let embedding = self.encode(query).await?;
        self.incremental_search_vector(embedding, group)
    }

    /// Opens an incremental search for a precomputed query vector.
    pub fn incremental_search_vector(&mut self, query: Vec<f32>, group: &str) -> SearchResult<FetchKey> {
        self.dimension.validate_vector(&query)?;
        let fetch_key = self.next_fetch_key;
        self.next_fetch_key += 1;

        match &mut self.backend {
            Backend::BruteForce(backend) => backend.open(fetch_key, &query, self.groups.get(group)),
            Backend::Ann(backend) => backend.open(fetch_key, query, group),
        }

        tracing::debug!(
            target: "ragsearch::search",
            "opened cursor {fetch_key} on group '{group}' ({} entries)",
            self.count_group(group)
        );
        Ok(fetch_key)
    }

    /// Next `count` keys and distances for an open search.
    pub fn incremental_fetch_keys(
        &mut self,
        fetch_key: FetchKey,
        count: FetchCount,
    ) -> SearchResult<FetchBatch<EntryKey>> {
        match &mut self.backend {
            Backend::BruteForce(backend) => backend.fetch(fetch_key, count),
            Backend::Ann(backend) => backend.fetch(fetch_key, count, &self.groups),
        }
    }

    /// Like [`incremental_fetch_keys`](Self::incremental_fetch_keys) but
    /// returns texts. Entries removed since the cursor opened are skipped.
    pub fn incremental_fetch(
        &mut self,
        fetch_key: FetchKey,
        count: FetchCount,
    ) -> SearchResult<FetchBatch<String>> {
        let batch = self.incremental_fetch_keys(fetch_key, count)?;
        let mut items = Vec::with_capacity(batch.len());
        let mut distances = Vec::with_capacity(batch.len());
        for (key, distance) in batch.items.into_iter().zip(batch.distances) {
            match self.get(key) {
                Some(text) => {
                    items.push(text.to_string());
                    distances.push(distance);
                }
                None => tracing::debug!(
                    target: "ragsearch::search",
                    "cursor {fetch_key} skipped removed entry {key}"
                ),
            }
        }
        Ok(FetchBatch {
            items,
            distances,
            completed: batch.completed,
        })
    }

    /// Releases a cursor. Unknown or already-released keys are ignored.
    pub fn incremental_search_complete(&mut self, fetch_key: FetchKey) {
        match &mut self.backend {
            Backend::BruteForce(backend) => backend.close(fetch_key),
            Backend::Ann(backend) => backend.close(fetch_key),
        }
    }

    /// One-shot search: the `k` closest texts of `group`.
    pub async fn search(&mut self, query: &str, k: usize, group: &str) -> SearchResult<(Vec<String>, Vec<f32>)> {
        let fetch_key = self.incremental_search(query, group).await?;
        let batch = self.incremental_fetch(fetch_key, FetchCount::Next(k));
        self.incremental_search_complete(fetch_key);
        let batch = batch?;
        Ok((batch.items, batch.distances))
    }

    /// Ranks `candidates` against `query` without touching stored entries.
    pub async fn search_from_list(&self, query: &str, candidates: &[&str]) -> SearchResult<Vec<(String, f32)>> {
        let query = self.encode(query).await?;
        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let embedding = self.encode(candidate).await?;
            ranked.push((candidate.to_string(), self.params.metric.distance(&query, &embedding)));
        }
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(ranked)
    }

    /// Drops every entry and cursor and resets the key counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.groups.clear();
        self.next_key = 0;
        self.next_fetch_key = 0;
        match &mut self.backend {
            Backend::BruteForce(backend) => backend.clear(),
            Backend::Ann(backend) => backend.clear(),
        }
        tracing::info!(target: "ragsearch::search", "cleared {} engine", self.method);
    }

    pub fn save_to(&self, writer: &mut ArchiveWriter) -> SearchResult<()> {
        let owner = self.method.archive_owner();
        let groups: BTreeMap<&str, Vec<EntryKey>> = self
            .groups
            .iter()
            .map(|(name, members)| (name.as_str(), members.iter().copied().collect()))
            .collect();

        writer.save_entry(entry_name(owner, "entries"), &self.entries)?;
        writer.save_entry(entry_name(owner, "groups"), &groups)?;
        writer.save_entry(
            entry_name(owner, "counters"),
            &KeyCounters {
                next_key: self.next_key,
                next_fetch_key: self.next_fetch_key,
            },
        )?;
        match &self.backend {
            Backend::BruteForce(backend) => backend.save(writer, owner),
            Backend::Ann(backend) => backend.save(writer, owner),
        }
    }

    /// Replaces this engine's contents with those stored in `reader`.
    ///
    /// Either every entry decodes and the engine is replaced, or an error is
    /// returned and the engine is unchanged. Open cursors are dropped.
    pub fn load_from(&mut self, reader: &ArchiveReader) -> SearchResult<()> {
        let state = self.read_state(reader)?;
        self.apply_state(state);
        Ok(())
    }

    pub(crate) fn read_state(&self, reader: &ArchiveReader) -> SearchResult<EngineState> {
        let owner = self.method.archive_owner();

        let entries_name = entry_name(owner, "entries");
        let entries: BTreeMap<EntryKey, EntryRecord> = reader.load_entry(&entries_name)?;

        let groups_name = entry_name(owner, "groups");
        let stored_groups: BTreeMap<String, Vec<EntryKey>> = reader.load_entry(&groups_name)?;
        let groups = Self::check_groups(&entries, stored_groups)
            .map_err(|reason| SearchError::corrupt_entry(&groups_name, reason))?;

        let counters_name = entry_name(owner, "counters");
        let counters: KeyCounters = reader.load_entry(&counters_name)?;
        if entries
            .last_key_value()
            .is_some_and(|(&key, _)| key >= counters.next_key)
        {
            return Err(SearchError::corrupt_entry(
                counters_name,
                "next key is not above every stored key",
            ));
        }

        let dimension = self.dimension.get();
        let backend = match self.method {
            SearchMethod::BruteForce => Backend::BruteForce(BruteForceBackend::load(
                reader,
                owner,
                self.params.metric,
                dimension,
                &entries,
            )?),
            SearchMethod::Ann => Backend::Ann(AnnBackend::load(reader, owner, dimension, &entries)?),
        };

        Ok(EngineState {
            entries,
            groups,
            counters,
            backend,
        })
    }

    pub(crate) fn apply_state(&mut self, state: EngineState) {
        if let Backend::Ann(backend) = &state.backend {
            self.params = *backend.index().params();
        }
        self.entries = state.entries;
        self.groups = state.groups;
        self.next_key = state.counters.next_key;
        self.next_fetch_key = state.counters.next_fetch_key;
        self.backend = state.backend;

        tracing::info!(
            target: "ragsearch::search",
            "restored {} engine with {} entries in {} groups",
            self.method,
            self.entries.len(),
            self.groups.len()
        );
    }

    /// Rebuilds the group index and verifies it against the stored one.
    fn check_groups(
        entries: &BTreeMap<EntryKey, EntryRecord>,
        stored: BTreeMap<String, Vec<EntryKey>>,
    ) -> Result<BTreeMap<String, BTreeSet<EntryKey>>, String> {
        let mut rebuilt: BTreeMap<String, BTreeSet<EntryKey>> = BTreeMap::new();
        for (&key, record) in entries {
            rebuilt.entry(record.group.clone()).or_default().insert(key);
        }

        let stored: BTreeMap<String, BTreeSet<EntryKey>> = stored
            .into_iter()
            .map(|(name, keys)| (name, keys.into_iter().collect()))
            .collect();
        if stored != rebuilt {
            return Err("group membership does not match the stored entries".to_string());
        }
        Ok(rebuilt)
    }
}
