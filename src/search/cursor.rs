//! Incremental search cursors and fetch results.

use std::collections::{HashSet, VecDeque};

use crate::error::{SearchError, SearchResult};

/// Key of a stored entry. Never reused within an engine instance.
pub type EntryKey = u64;

/// Handle returned when an incremental search is opened.
pub type FetchKey = u64;

/// How many results a fetch should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCount {
    /// At most this many further results
    Next(usize),
    /// Every remaining result
    All,
}

impl FetchCount {
    /// Number of items to take when `available` remain.
    pub fn take_from(self, available: usize) -> usize {
        match self {
            Self::Next(n) => n.min(available),
            Self::All => available,
        }
    }
}

impl From<usize> for FetchCount {
    fn from(n: usize) -> Self {
        Self::Next(n)
    }
}

impl FetchCount {
    /// `-1` means all remaining results; other negative counts are rejected.
    pub fn from_signed(value: i64) -> SearchResult<Self> {
        match value {
            -1 => Ok(Self::All),
            n if n < 0 => Err(SearchError::invalid_argument(format!(
                "fetch count must be -1 or non-negative, got {n}"
            ))),
            n => usize::try_from(n)
                .map(Self::Next)
                .map_err(|_| SearchError::invalid_argument(format!("fetch count {n} is too large"))),
        }
    }
}

impl TryFrom<i64> for FetchCount {
    type Error = SearchError;

    fn try_from(value: i64) -> SearchResult<Self> {
        Self::from_signed(value)
    }
}

/// One page of incremental results, closest first.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch<T> {
    pub items: Vec<T>,
    pub distances: Vec<f32>,
    /// True once the search has nothing further to return. The cursor is
    /// released at that point and its fetch key becomes invalid.
    pub completed: bool,
}

impl<T> FetchBatch<T> {
    pub fn empty_completed() -> Self {
        Self {
            items: Vec::new(),
            distances: Vec::new(),
            completed: true,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> FetchBatch<U> {
        FetchBatch {
            items: self.items.into_iter().map(f).collect(),
            distances: self.distances,
            completed: self.completed,
        }
    }
}

/// Brute-force cursor: the full ranking is materialized when opened.
#[derive(Debug, Default)]
pub(crate) struct RankedCursor {
    pub remaining: VecDeque<(EntryKey, f32)>,
}

impl RankedCursor {
    pub fn take(&mut self, count: FetchCount) -> FetchBatch<EntryKey> {
        let n = count.take_from(self.remaining.len());
        let (items, distances): (Vec<_>, Vec<_>) = self.remaining.drain(..n).unzip();
        FetchBatch {
            items,
            distances,
            completed: self.remaining.is_empty(),
        }
    }
}

/// ANN cursor: ranked keys are queued by a query over every undelivered
/// key of the group, and the queue is refilled only once it runs dry.
#[derive(Debug)]
pub(crate) struct QueuedCursor {
    pub query: Vec<f32>,
    pub group: String,
    /// Keys already queued or delivered
    pub seen: HashSet<EntryKey>,
    pub pending: VecDeque<(EntryKey, f32)>,
}
