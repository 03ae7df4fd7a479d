//! Incremental semantic search with optional text chunking.

pub mod archive;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod rag;
pub mod search;
pub mod split;
pub mod vector;

// Explicit exports for better API clarity
pub use archive::{ArchiveReader, ArchiveWriter};
pub use chunking::{ChunkingLayer, PhraseKey};
pub use config::Settings;
pub use embedding::{Embedder, EmbedderError, FastEmbedEmbedder};
pub use error::{SearchError, SearchResult};
pub use rag::Rag;
pub use search::{EntryKey, FetchBatch, FetchCount, FetchKey, SearchEngine, SearchMethod};
pub use split::{ChunkingMethod, SentenceSplitter, Splitter, TokenSplitter, WordSplitter, spans_to_strings};
pub use vector::{IndexParams, Metric, Quantization, VectorIndex};
