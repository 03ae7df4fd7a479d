//! Phrase table: which sentences make up each phrase.
//!
//! Phrases own their sentences exclusively. The table keeps the forward
//! map authoritative and derives the reverse, per-group and per-hash maps
//! from it, so persisted state is only the forward map and the key counter.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bincode::{Decode, Encode};
use sha2::{Digest, Sha256};

use crate::search::EntryKey;

/// Key of a phrase, independent from engine entry keys.
pub type PhraseKey = u64;

/// First eight bytes of the SHA-256 digest of `text`.
pub fn content_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(prefix)
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PhraseRecord {
    /// Sentence keys in text order
    pub sentences: Vec<EntryKey>,
    pub group: String,
    pub hash: u64,
}

#[derive(Debug, Encode, Decode)]
pub(crate) struct PhraseSnapshot {
    pub phrases: BTreeMap<PhraseKey, PhraseRecord>,
    pub next_key: PhraseKey,
}

#[derive(Debug, Default)]
pub struct PhraseTable {
    phrases: BTreeMap<PhraseKey, PhraseRecord>,
    sentence_owner: HashMap<EntryKey, PhraseKey>,
    by_group: BTreeMap<String, BTreeSet<PhraseKey>>,
    by_hash: HashMap<u64, BTreeSet<PhraseKey>>,
    next_key: PhraseKey,
}

impl PhraseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: PhraseRecord) -> PhraseKey {
        let key = self.next_key;
        self.next_key += 1;
        self.index(key, &record);
        self.phrases.insert(key, record);
        key
    }

    fn index(&mut self, key: PhraseKey, record: &PhraseRecord) {
        for &sentence in &record.sentences {
            self.sentence_owner.insert(sentence, key);
        }
        self.by_group
            .entry(record.group.clone())
            .or_default()
            .insert(key);
        self.by_hash.entry(record.hash).or_default().insert(key);
    }

    pub fn remove(&mut self, key: PhraseKey) -> Option<PhraseRecord> {
        let record = self.phrases.remove(&key)?;
        for sentence in &record.sentences {
            self.sentence_owner.remove(sentence);
        }
        if let Some(members) = self.by_group.get_mut(&record.group) {
            members.remove(&key);
            if members.is_empty() {
                self.by_group.remove(&record.group);
            }
        }
        if let Some(members) = self.by_hash.get_mut(&record.hash) {
            members.remove(&key);
            if members.is_empty() {
                self.by_hash.remove(&record.hash);
            }
        }
        Some(record)
    }

    pub fn get(&self, key: PhraseKey) -> Option<&PhraseRecord> {
        self.phrases.get(&key)
    }

    /// Phrase that owns `sentence`.
    pub fn owner(&self, sentence: EntryKey) -> Option<PhraseKey> {
        self.sentence_owner.get(&sentence).copied()
    }

    /// Phrases of `group` whose content hash equals `hash`.
    pub fn candidates(&self, hash: u64, group: &str) -> Vec<PhraseKey> {
        self.by_hash
            .get(&hash)
            .into_iter()
            .flatten()
            .copied()
            .filter(|key| self.phrases.get(key).is_some_and(|r| r.group == group))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn count_group(&self, group: &str) -> usize {
        self.by_group.get(group).map_or(0, BTreeSet::len)
    }

    pub fn group_counts(&self) -> Vec<(String, usize)> {
        self.by_group
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect()
    }

    /// Drops every phrase and resets the key counter.
    pub fn clear(&mut self) {
        self.next_key = 0;
        self.phrases.clear();
        self.sentence_owner.clear();
        self.by_group.clear();
        self.by_hash.clear();
    }

    pub(crate) fn snapshot(&self) -> PhraseSnapshot {
        PhraseSnapshot {
            phrases: self.phrases.clone(),
            next_key: self.next_key,
        }
    }

    /// Rebuilds a table from a snapshot, checking that sentence ownership
    /// is exclusive and keys are below the counter.
    pub(crate) fn from_snapshot(snapshot: PhraseSnapshot) -> Result<Self, String> {
        let mut table = Self {
            next_key: snapshot.next_key,
            ..Self::default()
        };
        for (key, record) in snapshot.phrases {
            if key >= snapshot.next_key {
                return Err(format!("phrase key {key} is not below the stored counter"));
            }
            if let Some(&sentence) = record
                .sentences
                .iter()
                .find(|s| table.sentence_owner.contains_key(*s))
            {
                return Err(format!("sentence {sentence} belongs to more than one phrase"));
            }
            table.index(key, &record);
            table.phrases.insert(key, record);
        }
        Ok(table)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (PhraseKey, &PhraseRecord)> {
        self.phrases.iter().map(|(&key, record)| (key, record))
    }
}
