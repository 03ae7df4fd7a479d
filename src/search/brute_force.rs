//! Exact search by scoring every entry of the queried group.
//!
//! The ranking is computed eagerly when a cursor opens, so every later
//! fetch is a drain of that snapshot. Entries added afterwards are not
//! seen by the cursor and entries removed afterwards may still be
//! returned; both resolve once the cursor completes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;

use crate::archive::{ArchiveReader, ArchiveWriter, entry_name};
use crate::error::{SearchError, SearchResult};
use crate::search::cursor::{EntryKey, FetchBatch, FetchCount, FetchKey, RankedCursor};
use crate::vector::Metric;

const EMBEDDINGS_ENTRY: &str = "embeddings";

#[derive(Debug)]
pub(crate) struct BruteForceBackend {
    metric: Metric,
    embeddings: BTreeMap<EntryKey, Vec<f32>>,
    cursors: HashMap<FetchKey, RankedCursor>,
}

impl BruteForceBackend {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            embeddings: BTreeMap::new(),
            cursors: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: EntryKey, embedding: Vec<f32>) {
        self.embeddings.insert(key, embedding);
    }

    pub fn remove(&mut self, key: EntryKey) {
        self.embeddings.remove(&key);
    }

    pub fn clear(&mut self) {
        self.embeddings.clear();
        self.cursors.clear();
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    /// Ranks `keys` against `query`, closest first, ties by ascending key.
    pub fn rank(&self, query: &[f32], keys: &BTreeSet<EntryKey>) -> Vec<(EntryKey, f32)> {
        let scored: Vec<(EntryKey, &Vec<f32>)> = keys
            .iter()
            .filter_map(|key| self.embeddings.get(key).map(|e| (*key, e)))
            .collect();
        let mut ranked: Vec<(EntryKey, f32)> = scored
            .par_iter()
            .map(|(key, embedding)| (*key, self.metric.distance(query, embedding)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked
    }

    pub fn open(&mut self, fetch_key: FetchKey, query: &[f32], keys: Option<&BTreeSet<EntryKey>>) {
        let remaining = keys
            .map(|keys| self.rank(query, keys))
            .unwrap_or_default()
            .into();
        self.cursors.insert(fetch_key, RankedCursor { remaining });
    }

    pub fn fetch(&mut self, fetch_key: FetchKey, count: FetchCount) -> SearchResult<FetchBatch<EntryKey>> {
        let cursor = self
            .cursors
            .get_mut(&fetch_key)
            .ok_or(SearchError::UnknownCursor { fetch_key })?;
        let batch = cursor.take(count);
        if batch.completed {
            self.cursors.remove(&fetch_key);
        }
        Ok(batch)
    }

    pub fn close(&mut self, fetch_key: FetchKey) {
        self.cursors.remove(&fetch_key);
    }

    pub fn save(&self, writer: &mut ArchiveWriter, owner: &str) -> SearchResult<()> {
        writer.save_entry(entry_name(owner, EMBEDDINGS_ENTRY), &self.embeddings)
    }

    /// Decodes a backend whose embeddings must cover exactly `keys`.
    pub fn load(
        reader: &ArchiveReader,
        owner: &str,
        metric: Metric,
        dimension: usize,
        keys: &BTreeMap<EntryKey, impl Sized>,
    ) -> SearchResult<Self> {
        let name = entry_name(owner, EMBEDDINGS_ENTRY);
        let embeddings: BTreeMap<EntryKey, Vec<f32>> = reader.load_entry(&name)?;

        if let Some((key, embedding)) = embeddings.iter().find(|(_, e)| e.len() != dimension) {
            return Err(SearchError::corrupt_entry(
                name,
                format!(
                    "embedding for key {key} has {} components, expected {dimension}",
                    embedding.len()
                ),
            ));
        }
        if !embeddings.keys().eq(keys.keys()) {
            return Err(SearchError::corrupt_entry(
                name,
                "embedding keys do not match the stored entries",
            ));
        }

        Ok(Self {
            metric,
            embeddings,
            cursors: HashMap::new(),
        })
    }
}
