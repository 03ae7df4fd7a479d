//! Semantic search engines with incremental result cursors.
//!
//! A [`SearchEngine`] stores texts under stable keys, partitions them into
//! groups, and answers queries through cursors that hand out results a
//! page at a time. Two ranking strategies are available: exact brute-force
//! scoring and approximate search over a [`VectorIndex`](crate::vector::VectorIndex).

mod ann;
mod brute_force;
mod cursor;
mod engine;

pub use cursor::{EntryKey, FetchBatch, FetchCount, FetchKey};
pub use engine::{SearchEngine, SearchMethod};
