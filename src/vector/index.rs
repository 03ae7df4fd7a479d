//! Approximate nearest-neighbour index over integer keys.
//!
//! Vectors are partitioned into inverted lists around k-means centroids.
//! A query scans lists in order of centroid similarity and keeps going
//! until it has enough candidates that pass the caller's filter, so a
//! restrictive filter costs more scanning but never loses eligible keys.
//!
//! Lists are rebuilt whenever the index outgrows its reserved capacity.
//! Capacity grows geometrically, which keeps the total clustering work
//! proportional to `n log n` over a run of inserts.

use std::collections::HashMap;

use bincode::{Decode, Encode};

use crate::archive::{ArchiveReader, ArchiveWriter, entry_name};
use crate::error::SearchResult;
use crate::vector::clustering::{assign_to_nearest_centroid, cosine_similarity, kmeans_clustering};
use crate::vector::quantize::StoredVector;
use crate::vector::types::{IndexParams, VectorDimension, VectorError};

/// Smallest capacity reserved once the first vector arrives.
const MIN_CAPACITY: usize = 64;

/// Upper bound on the number of inverted lists.
const MAX_LISTS: usize = 1024;

/// Fixed seed so identical contents produce identical partitions.
const CLUSTERING_SEED: u64 = 0x5EED_1DE5;

/// Archive field under which the index snapshot is stored.
const INDEX_ENTRY: &str = "index";

/// Key filter evaluated while lists are traversed.
pub type KeyFilter<'a> = &'a dyn Fn(u64) -> bool;

#[derive(Debug, Clone)]
struct Slot {
    /// Insertion sequence, used to break distance ties
    seq: u64,
    list: usize,
    vector: StoredVector,
}

#[derive(Debug, Encode, Decode)]
struct SlotRecord {
    key: u64,
    seq: u64,
    list: u32,
    vector: StoredVector,
}

#[derive(Debug, Encode, Decode)]
struct IndexSnapshot {
    dimension: usize,
    params: IndexParams,
    capacity: u64,
    next_seq: u64,
    centroids: Vec<Vec<f32>>,
    slots: Vec<SlotRecord>,
}

/// Inverted-list vector index keyed by `u64`.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: VectorDimension,
    params: IndexParams,
    slots: HashMap<u64, Slot>,
    /// Keys per list, in insertion order
    lists: Vec<Vec<u64>>,
    /// Empty until the first rebuild; a single list is used meanwhile
    centroids: Vec<Vec<f32>>,
    capacity: usize,
    next_seq: u64,
}

impl VectorIndex {
    pub fn create(dimension: usize, params: IndexParams) -> Result<Self, VectorError> {
        let dimension = VectorDimension::new(dimension)?;
        params.validate()?;
        Ok(Self {
            dimension,
            params,
            slots: HashMap::new(),
            lists: vec![Vec::new()],
            centroids: Vec::new(),
            capacity: 0,
            next_seq: 0,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension.get()
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.slots.contains_key(&key)
    }

    /// Stored vector for `key`, widened to f32.
    pub fn get(&self, key: u64) -> Option<Vec<f32>> {
        self.slots
            .get(&key)
            .map(|slot| slot.vector.as_f32().into_owned())
    }

    pub fn add(&mut self, key: u64, vector: &[f32]) -> Result<(), VectorError> {
        self.dimension.validate_vector(vector)?;
        if self.slots.contains_key(&key) {
            return Err(VectorError::DuplicateKey(key));
        }

        let grew = self.reserve(1);
        let list = self.nearest_list(vector);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(
            key,
            Slot {
                seq,
                list,
                vector: StoredVector::quantize(vector, self.params.quantization),
            },
        );
        self.lists[list].push(key);

        if grew {
            self.rebuild_lists()?;
        }
        Ok(())
    }

    /// Removes `key`, returning the number of vectors removed (0 or 1).
    pub fn remove(&mut self, key: u64) -> usize {
        match self.slots.remove(&key) {
            Some(slot) => {
                self.lists[slot.list].retain(|&k| k != key);
                1
            }
            None => 0,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.lists = vec![Vec::new()];
        self.centroids.clear();
        self.capacity = 0;
        self.next_seq = 0;
    }

    /// Up to `count` nearest keys with their distances, closest first.
    ///
    /// When `filter` is given only keys it accepts are considered. Ties in
    /// distance resolve in insertion order.
    pub fn search(
        &self,
        query: &[f32],
        count: usize,
        filter: Option<KeyFilter<'_>>,
    ) -> Result<Vec<(u64, f32)>, VectorError> {
        self.dimension.validate_vector(query)?;
        if count == 0 || self.slots.is_empty() {
            return Ok(Vec::new());
        }

        let min_lists = self.params.expansion_search;
        let metric = self.params.metric;
        let mut candidates: Vec<(f32, u64, u64)> = Vec::new();

        for (visited, list) in self.list_order(query).into_iter().enumerate() {
            if visited >= min_lists && candidates.len() >= count {
                break;
            }
            for &key in &self.lists[list] {
                if filter.is_some_and(|accept| !accept(key)) {
                    continue;
                }
                let Some(slot) = self.slots.get(&key) else {
                    continue;
                };
                let distance = metric.distance(query, &slot.vector.as_f32());
                candidates.push((distance, slot.seq, key));
            }
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.truncate(count);
        Ok(candidates
            .into_iter()
            .map(|(distance, _, key)| (key, distance))
            .collect())
    }

    /// Grows capacity geometrically when `additional` more vectors do not
    /// fit. Returns true when capacity changed.
    fn reserve(&mut self, additional: usize) -> bool {
        let demand = self.slots.len() + additional;
        if demand <= self.capacity {
            return false;
        }
        self.capacity = demand.max(self.capacity * 2).max(MIN_CAPACITY);
        true
    }

    fn nearest_list(&self, vector: &[f32]) -> usize {
        if self.centroids.is_empty() {
            return 0;
        }
        let centroid_refs: Vec<&[f32]> = self.centroids.iter().map(Vec::as_slice).collect();
        assign_to_nearest_centroid(vector, &centroid_refs).index()
    }

    /// Lists ordered by centroid similarity to `query`, best first.
    fn list_order(&self, query: &[f32]) -> Vec<usize> {
        if self.centroids.is_empty() {
            return vec![0];
        }
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, centroid)| (i, cosine_similarity(query, centroid)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.into_iter().map(|(i, _)| i).collect()
    }

    fn target_list_count(&self) -> usize {
        self.slots
            .len()
            .div_ceil(self.params.connectivity)
            .clamp(1, MAX_LISTS)
    }

    /// Re-partitions every stored vector around fresh centroids.
    fn rebuild_lists(&mut self) -> Result<(), VectorError> {
        let mut ordered: Vec<(u64, u64)> = self
            .slots
            .iter()
            .map(|(&key, slot)| (slot.seq, key))
            .collect();
        ordered.sort_unstable();

        let k = self.target_list_count();
        if k <= 1 {
            self.centroids.clear();
            self.lists = vec![ordered.iter().map(|&(_, key)| key).collect()];
            for slot in self.slots.values_mut() {
                slot.list = 0;
            }
            return Ok(());
        }

        let vectors: Vec<Vec<f32>> = ordered
            .iter()
            .filter_map(|(_, key)| self.slots.get(key))
            .map(|slot| slot.vector.as_f32().into_owned())
            .collect();
        let result = kmeans_clustering(&vectors, k, self.params.expansion_add, CLUSTERING_SEED)
            .map_err(|e| VectorError::ClusteringFailed(e.to_string()))?;

        let mut lists = vec![Vec::new(); k];
        for (&(_, key), cluster) in ordered.iter().zip(&result.assignments) {
            let list = cluster.index();
            lists[list].push(key);
            if let Some(slot) = self.slots.get_mut(&key) {
                slot.list = list;
            }
        }

        tracing::debug!(
            target: "ragsearch::vector",
            "rebuilt {k} lists over {} vectors in {} iterations (capacity {})",
            self.slots.len(),
            result.iterations,
            self.capacity
        );

        self.centroids = result.centroids;
        self.lists = lists;
        Ok(())
    }

    /// Writes the index under `<owner>/index`.
    pub fn save(&self, writer: &mut ArchiveWriter, owner: &str) -> SearchResult<()> {
        let mut slots: Vec<SlotRecord> = self
            .slots
            .iter()
            .map(|(&key, slot)| SlotRecord {
                key,
                seq: slot.seq,
                list: slot.list as u32,
                vector: slot.vector.clone(),
            })
            .collect();
        slots.sort_unstable_by_key(|record| record.seq);

        let snapshot = IndexSnapshot {
            dimension: self.dimension.get(),
            params: self.params,
            capacity: self.capacity as u64,
            next_seq: self.next_seq,
            centroids: self.centroids.clone(),
            slots,
        };
        writer.save_entry(entry_name(owner, INDEX_ENTRY), &snapshot)
    }

    /// Reads an index previously written by [`VectorIndex::save`].
    pub fn load(reader: &ArchiveReader, owner: &str) -> SearchResult<Self> {
        let name = entry_name(owner, INDEX_ENTRY);
        let snapshot: IndexSnapshot = reader.load_entry(&name)?;
        Self::from_snapshot(snapshot).map_err(|e| crate::SearchError::corrupt_entry(name, e))
    }

    fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self, VectorError> {
        let mut index = Self::create(snapshot.dimension, snapshot.params)?;
        let list_count = snapshot.centroids.len().max(1);
        if snapshot
            .centroids
            .iter()
            .any(|c| c.len() != snapshot.dimension)
        {
            return Err(VectorError::CorruptSnapshot(
                "centroid dimension differs from index dimension".into(),
            ));
        }

        let mut lists = vec![Vec::new(); list_count];
        for record in snapshot.slots {
            if record.vector.len() != snapshot.dimension {
                return Err(VectorError::CorruptSnapshot(format!(
                    "vector for key {} has {} components",
                    record.key,
                    record.vector.len()
                )));
            }
            let list = record.list as usize;
            if list >= list_count {
                return Err(VectorError::CorruptSnapshot(format!(
                    "key {} assigned to missing list {list}",
                    record.key
                )));
            }
            if record.seq >= snapshot.next_seq {
                return Err(VectorError::CorruptSnapshot(format!(
                    "key {} has sequence beyond the stored counter",
                    record.key
                )));
            }
            let slot = Slot {
                seq: record.seq,
                list,
                vector: record.vector,
            };
            if index.slots.insert(record.key, slot).is_some() {
                return Err(VectorError::DuplicateKey(record.key));
            }
            lists[list].push(record.key);
        }

        index.lists = lists;
        index.centroids = snapshot.centroids;
        index.capacity = (snapshot.capacity as usize).max(index.slots.len());
        index.next_seq = snapshot.next_seq;
        Ok(index)
    }
}
