//! Phrase-level search on top of a sentence-level engine.

mod layer;
mod phrases;

pub use layer::ChunkingLayer;
pub use phrases::{PhraseKey, PhraseRecord, PhraseTable, content_hash};
