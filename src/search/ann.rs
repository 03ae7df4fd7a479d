//! Approximate search backed by [`VectorIndex`].
//!
//! Ranking is deferred to the first fetch. It queries the index for every
//! undelivered key of the cursor's group and queues the result, so paging
//! one key at a time drains exactly the ranking a single fetch-all would
//! return. The queue is refilled only once it runs dry, which is when
//! entries added after the cursor opened are picked up. Queued entries
//! removed in the meantime are skipped.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::{SearchError, SearchResult};
use crate::search::cursor::{EntryKey, FetchBatch, FetchCount, FetchKey, QueuedCursor};
use crate::vector::{IndexParams, VectorIndex};

#[derive(Debug)]
pub(crate) struct AnnBackend {
    index: VectorIndex,
    cursors: HashMap<FetchKey, QueuedCursor>,
}

impl AnnBackend {
    pub fn new(dimension: usize, params: IndexParams) -> SearchResult<Self> {
        Ok(Self {
            index: VectorIndex::create(dimension, params)?,
            cursors: HashMap::new(),
        })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn insert(&mut self, key: EntryKey, embedding: &[f32]) -> SearchResult<()> {
        self.index.add(key, embedding)?;
        Ok(())
    }

    pub fn remove(&mut self, key: EntryKey) {
        self.index.remove(key);
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.cursors.clear();
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    pub fn open(&mut self, fetch_key: FetchKey, query: Vec<f32>, group: &str) {
        self.cursors.insert(
            fetch_key,
            QueuedCursor {
                query,
                group: group.to_string(),
                seen: HashSet::new(),
                pending: VecDeque::new(),
            },
        );
    }

    pub fn fetch(
        &mut self,
        fetch_key: FetchKey,
        count: FetchCount,
        groups: &BTreeMap<String, BTreeSet<EntryKey>>,
    ) -> SearchResult<FetchBatch<EntryKey>> {
        let cursor = self
            .cursors
            .get_mut(&fetch_key)
            .ok_or(SearchError::UnknownCursor { fetch_key })?;

        let Some(members) = groups.get(&cursor.group).filter(|m| !m.is_empty()) else {
            self.cursors.remove(&fetch_key);
            return Ok(FetchBatch::empty_completed());
        };

        let wanted = match count {
            FetchCount::Next(n) => n,
            FetchCount::All => usize::MAX,
        };
        let mut items = Vec::new();
        let mut distances = Vec::new();
        while items.len() < wanted {
            if let Some((key, distance)) = cursor.pending.pop_front() {
                if members.contains(&key) {
                    items.push(key);
                    distances.push(distance);
                }
                continue;
            }

            let undelivered = members.iter().filter(|key| !cursor.seen.contains(key)).count();
            if undelivered == 0 {
                break;
            }
            let hits = {
                let seen = &cursor.seen;
                let eligible = |key: EntryKey| members.contains(&key) && !seen.contains(&key);
                self.index.search(&cursor.query, undelivered, Some(&eligible))?
            };
            if hits.is_empty() {
                break;
            }
            cursor.seen.extend(hits.iter().map(|&(key, _)| key));
            cursor.pending.extend(hits);
        }

        cursor.pending.retain(|(key, _)| members.contains(key));
        let completed = cursor.pending.is_empty() && members.iter().all(|key| cursor.seen.contains(key));
        if completed {
            self.cursors.remove(&fetch_key);
        }
        Ok(FetchBatch {
            items,
            distances,
            completed,
        })
    }

    pub fn close(&mut self, fetch_key: FetchKey) {
        self.cursors.remove(&fetch_key);
    }

    pub fn save(&self, writer: &mut ArchiveWriter, owner: &str) -> SearchResult<()> {
        self.index.save(writer, owner)
    }

    /// Decodes a backend whose index must hold exactly `keys`.
    pub fn load(
        reader: &ArchiveReader,
        owner: &str,
        dimension: usize,
        keys: &BTreeMap<EntryKey, impl Sized>,
    ) -> SearchResult<Self> {
        let index = VectorIndex::load(reader, owner)?;
        let name = crate::archive::entry_name(owner, "index");
        if index.dimension() != dimension {
            return Err(SearchError::corrupt_entry(
                name,
                format!(
                    "index dimension {} does not match embedder dimension {dimension}",
                    index.dimension()
                ),
            ));
        }
        if index.len() != keys.len() || !keys.keys().all(|&key| index.contains(key)) {
            return Err(SearchError::corrupt_entry(
                name,
                "index keys do not match the stored entries",
            ));
        }
        Ok(Self {
            index,
            cursors: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{Metric, Quantization};

    fn params() -> IndexParams {
        IndexParams {
            metric: Metric::Cos,
            quantization: Quantization::F32,
            ..IndexParams::default()
        }
    }

    fn groups(entries: &[(&str, &[EntryKey])]) -> BTreeMap<String, BTreeSet<EntryKey>> {
        entries
            .iter()
            .map(|(name, keys)| (name.to_string(), keys.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_fetch_excludes_seen_and_other_groups() {
        let mut backend = AnnBackend::new(2, params()).unwrap();
        backend.insert(0, &[1.0, 0.0]).unwrap();
        backend.insert(1, &[0.0, 1.0]).unwrap();
        backend.insert(2, &[0.9, 0.1]).unwrap();
        backend.insert(3, &[0.95, 0.05]).unwrap();
        let groups = groups(&[("", &[0, 1, 2]), ("other", &[3])]);

        backend.open(1, vec![1.0, 0.0], "");
        let first = backend.fetch(1, FetchCount::Next(1), &groups).unwrap();
        assert_eq!(first.items, vec![0]);
        assert!(!first.completed);

        let second = backend.fetch(1, FetchCount::Next(1), &groups).unwrap();
        assert_eq!(second.items, vec![2]);

        let rest = backend.fetch(1, FetchCount::All, &groups).unwrap();
        assert_eq!(rest.items, vec![1]);
        assert!(rest.completed);
        assert_eq!(backend.open_cursors(), 0);
    }

    #[test]
    fn test_short_page_completes_cursor() {
        let mut backend = AnnBackend::new(2, params()).unwrap();
        backend.insert(0, &[1.0, 0.0]).unwrap();
        let groups = groups(&[("", &[0])]);

        backend.open(4, vec![1.0, 0.0], "");
        let batch = backend.fetch(4, FetchCount::Next(10), &groups).unwrap();
        assert_eq!(batch.items, vec![0]);
        assert!(batch.completed);
    }

    #[test]
    fn test_single_key_pages_follow_the_full_ranking() {
        // Small lists and one list per query spread the group across many lists
        let params = IndexParams {
            connectivity: 4,
            expansion_search: 1,
            ..params()
        };
        let mut backend = AnnBackend::new(3, params).unwrap();
        for key in 0..400u64 {
            let angle = key as f32 * 0.37;
            backend
                .insert(key, &[angle.cos(), angle.sin(), (key % 11) as f32 * 0.1])
                .unwrap();
        }
        assert!(backend.index().list_count() > 1);
        let keys: Vec<EntryKey> = (0..400).collect();
        let groups = groups(&[("", &keys)]);
        let query = vec![0.3, -0.8, 0.5];

        backend.open(1, query.clone(), "");
        let all = backend.fetch(1, FetchCount::All, &groups).unwrap();
        assert!(all.completed);
        assert_eq!(all.len(), 400);

        backend.open(2, query, "");
        let mut keys = Vec::new();
        let mut distances = Vec::new();
        loop {
            let batch = backend.fetch(2, FetchCount::Next(1), &groups).unwrap();
            keys.extend(batch.items);
            distances.extend(batch.distances);
            if batch.completed {
                break;
            }
        }
        assert_eq!(keys, all.items);
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_entries_removed_after_queueing_are_skipped() {
        let mut backend = AnnBackend::new(2, params()).unwrap();
        backend.insert(0, &[1.0, 0.0]).unwrap();
        backend.insert(1, &[0.9, 0.1]).unwrap();
        backend.insert(2, &[0.0, 1.0]).unwrap();
        let mut groups = groups(&[("", &[0, 1, 2])]);

        backend.open(3, vec![1.0, 0.0], "");
        let first = backend.fetch(3, FetchCount::Next(1), &groups).unwrap();
        assert_eq!(first.items, vec![0]);

        backend.remove(1);
        groups.get_mut("").unwrap().remove(&1);
        let rest = backend.fetch(3, FetchCount::All, &groups).unwrap();
        assert_eq!(rest.items, vec![2]);
        assert!(rest.completed);
    }

    #[test]
    fn test_missing_group_is_empty_and_completed() {
        let mut backend = AnnBackend::new(2, params()).unwrap();
        backend.open(2, vec![1.0, 0.0], "nowhere");
        let batch = backend.fetch(2, FetchCount::Next(3), &BTreeMap::new()).unwrap();
        assert!(batch.is_empty());
        assert!(batch.completed);
    }
}
