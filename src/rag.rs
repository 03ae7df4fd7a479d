//! Facade choosing between a plain engine and a chunking layer.
//!
//! [`Rag`] is built from a [`SearchMethod`] and a [`ChunkingMethod`] (or
//! from [`Settings`]) and forwards every operation to whichever searcher
//! the configuration selected. Keys returned by a chunked facade are phrase
//! keys; by a plain one, entry keys.

use std::path::Path;
use std::sync::Arc;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::chunking::ChunkingLayer;
use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::SearchResult;
use crate::search::{EntryKey, FetchBatch, FetchCount, FetchKey, SearchEngine, SearchMethod};
use crate::split::{ChunkingMethod, SentenceSplitter, Splitter, TokenSplitter, WordSplitter};
use crate::vector::IndexParams;

enum Searcher<E> {
    Direct(SearchEngine<E>),
    Chunked(ChunkingLayer<E>),
}

/// Semantic search with optional chunking.
pub struct Rag<E> {
    searcher: Searcher<E>,
}

impl<E: Embedder> Rag<E> {
    /// Builds a searcher with default index parameters and splitter sizes.
    pub fn new(embedder: Arc<E>, search_method: SearchMethod, chunking_method: ChunkingMethod) -> SearchResult<Self> {
        let splitter = match chunking_method {
            ChunkingMethod::None => None,
            ChunkingMethod::Sentence => Some(Splitter::Sentence(SentenceSplitter::default())),
            ChunkingMethod::Word => Some(Splitter::Word(WordSplitter::default())),
            ChunkingMethod::Token => Some(Splitter::Token(TokenSplitter::default())),
        };
        Self::with_splitter(embedder, search_method, IndexParams::default(), splitter)
    }

    pub fn with_splitter(
        embedder: Arc<E>,
        search_method: SearchMethod,
        params: IndexParams,
        splitter: Option<Splitter>,
    ) -> SearchResult<Self> {
        let engine = SearchEngine::new(embedder, search_method, params)?;
        let searcher = match splitter {
            Some(splitter) => Searcher::Chunked(ChunkingLayer::new(engine, splitter)),
            None => Searcher::Direct(engine),
        };
        Ok(Self { searcher })
    }

    pub fn from_settings(embedder: Arc<E>, settings: &Settings) -> SearchResult<Self> {
        let splitter = settings.chunking.splitter()?;
        let mut rag = Self::with_splitter(embedder, settings.search.method, settings.index, splitter)?;
        rag.set_return_chunks(settings.chunking.return_chunks);
        Ok(rag)
    }

    fn engine(&self) -> &SearchEngine<E> {
        match &self.searcher {
            Searcher::Direct(engine) => engine,
            Searcher::Chunked(layer) => layer.search_engine(),
        }
    }

    pub fn search_method(&self) -> SearchMethod {
        self.engine().method()
    }

    pub fn chunking_method(&self) -> ChunkingMethod {
        match &self.searcher {
            Searcher::Direct(_) => ChunkingMethod::None,
            Searcher::Chunked(layer) => layer.splitter().method(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.engine().dimension()
    }

    /// Switches between phrase and chunk results. Ignored without chunking.
    pub fn set_return_chunks(&mut self, return_chunks: bool) {
        if let Searcher::Chunked(layer) = &mut self.searcher {
            layer.set_return_chunks(return_chunks);
        }
    }

    pub async fn add(&mut self, text: &str, group: &str) -> SearchResult<EntryKey> {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.add(text, group).await,
            Searcher::Chunked(layer) => layer.add(text, group).await,
        }
    }

    pub fn get(&self, key: EntryKey) -> Option<String> {
        match &self.searcher {
            Searcher::Direct(engine) => engine.get(key).map(str::to_string),
            Searcher::Chunked(layer) => layer.get(key),
        }
    }

    pub fn remove(&mut self, key: EntryKey) -> bool {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.remove(key),
            Searcher::Chunked(layer) => layer.remove(key),
        }
    }

    pub fn remove_text(&mut self, text: &str, group: &str) -> usize {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.remove_text(text, group),
            Searcher::Chunked(layer) => layer.remove_text(text, group),
        }
    }

    pub fn count(&self) -> usize {
        match &self.searcher {
            Searcher::Direct(engine) => engine.count(),
            Searcher::Chunked(layer) => layer.count(),
        }
    }

    pub fn count_group(&self, group: &str) -> usize {
        match &self.searcher {
            Searcher::Direct(engine) => engine.count_group(group),
            Searcher::Chunked(layer) => layer.count_group(group),
        }
    }

    pub fn group_counts(&self) -> Vec<(String, usize)> {
        match &self.searcher {
            Searcher::Direct(engine) => engine.group_counts(),
            Searcher::Chunked(layer) => layer.group_counts(),
        }
    }

    /// Number of indexed chunks; equals [`count`](Self::count) without
    /// chunking.
    pub fn chunk_count(&self) -> usize {
        self.engine().count()
    }

    pub async fn incremental_search(&mut self, query: &str, group: &str) -> SearchResult<FetchKey> {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.incremental_search(query, group).await,
            Searcher::Chunked(layer) => layer.incremental_search(query, group).await,
        }
    }

    pub fn incremental_fetch_keys(&mut self, fetch_key: FetchKey, count: FetchCount) -> SearchResult<FetchBatch<EntryKey>> {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.incremental_fetch_keys(fetch_key, count),
            Searcher::Chunked(layer) => layer.incremental_fetch_keys(fetch_key, count),
        }
    }

    pub fn incremental_fetch(&mut self, fetch_key: FetchKey, count: FetchCount) -> SearchResult<FetchBatch<String>> {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.incremental_fetch(fetch_key, count),
            Searcher::Chunked(layer) => layer.incremental_fetch(fetch_key, count),
        }
    }

    pub fn incremental_search_complete(&mut self, fetch_key: FetchKey) {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.incremental_search_complete(fetch_key),
            Searcher::Chunked(layer) => layer.incremental_search_complete(fetch_key),
        }
    }

    pub async fn search(&mut self, query: &str, k: usize, group: &str) -> SearchResult<(Vec<String>, Vec<f32>)> {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.search(query, k, group).await,
            Searcher::Chunked(layer) => layer.search(query, k, group).await,
        }
    }

    pub async fn search_from_list(&self, query: &str, candidates: &[&str]) -> SearchResult<Vec<(String, f32)>> {
        self.engine().search_from_list(query, candidates).await
    }

    pub fn clear(&mut self) {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.clear(),
            Searcher::Chunked(layer) => layer.clear(),
        }
    }

    pub fn save_to(&self, writer: &mut ArchiveWriter) -> SearchResult<()> {
        match &self.searcher {
            Searcher::Direct(engine) => engine.save_to(writer),
            Searcher::Chunked(layer) => layer.save_to(writer),
        }
    }

    pub fn load_from(&mut self, reader: &ArchiveReader) -> SearchResult<()> {
        match &mut self.searcher {
            Searcher::Direct(engine) => engine.load_from(reader),
            Searcher::Chunked(layer) => layer.load_from(reader),
        }
    }

    /// Writes the whole searcher to `path`, replacing any previous archive
    /// atomically.
    pub fn save(&self, path: &Path) -> SearchResult<()> {
        let mut writer = ArchiveWriter::new();
        self.save_to(&mut writer)?;
        writer.commit(path)?;
        tracing::info!(
            target: "ragsearch::rag",
            "saved {} items ({} chunks) to {}",
            self.count(),
            self.chunk_count(),
            path.display()
        );
        Ok(())
    }

    /// Restores the searcher from `path`. Returns `false` when no archive
    /// exists there; on error the searcher is unchanged.
    pub fn load(&mut self, path: &Path) -> SearchResult<bool> {
        if !path.exists() {
            tracing::debug!(target: "ragsearch::rag", "no archive at {}", path.display());
            return Ok(false);
        }
        let reader = ArchiveReader::open(path)?;
        self.load_from(&reader)?;
        tracing::info!(
            target: "ragsearch::rag",
            "loaded {} items from {}",
            self.count(),
            path.display()
        );
        Ok(true)
    }
}
