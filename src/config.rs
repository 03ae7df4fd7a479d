//! Configuration module for ragsearch.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RAGSEARCH_` and use double
//! underscores to separate nested levels:
//! - `RAGSEARCH_SEARCH__METHOD=ann` sets `search.method`
//! - `RAGSEARCH_CHUNKING__NUM_WORDS=20` sets `chunking.num_words`
//! - `RAGSEARCH_INDEX__QUANTIZATION=f32` sets `index.quantization`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embedding::DEFAULT_MODEL;
use crate::error::{SearchError, SearchResult};
use crate::search::SearchMethod;
use crate::split::{ChunkingMethod, DEFAULT_DELIMITERS, SentenceSplitter, Splitter, TokenSplitter, WordSplitter};
use crate::vector::IndexParams;

/// Directory holding the workspace configuration
pub const CONFIG_DIR: &str = ".ragsearch";

const ENV_PREFIX: &str = "RAGSEARCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    /// Search backend selection
    #[serde(default)]
    pub search: SearchConfig,

    /// Distance metric, precision and ANN tuning
    #[serde(default)]
    pub index: IndexParams,

    /// Chunking strategy applied before indexing
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct SearchConfig {
    /// "brute_force" or "ann"
    #[serde(default)]
    pub method: SearchMethod,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// "none", "token", "word" or "sentence"
    #[serde(default)]
    pub method: ChunkingMethod,

    /// Return matching chunks instead of whole phrases
    #[serde(default)]
    pub return_chunks: bool,

    /// Characters that end a sentence
    #[serde(default = "default_delimiters")]
    pub delimiters: String,

    /// Words per chunk for the word splitter
    #[serde(default = "default_chunk_size")]
    pub num_words: usize,

    /// Tokens per chunk for the token splitter
    #[serde(default = "default_chunk_size")]
    pub num_tokens: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Show a progress bar while the model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_delimiters() -> String {
    DEFAULT_DELIMITERS.to_string()
}
fn default_chunk_size() -> usize {
    10
}
fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            search: SearchConfig::default(),
            index: IndexParams::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            method: ChunkingMethod::default(),
            return_chunks: false,
            delimiters: default_delimiters(),
            num_words: default_chunk_size(),
            num_tokens: default_chunk_size(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            show_download_progress: true,
        }
    }
}

impl ChunkingConfig {
    /// Builds the configured splitter, or `None` when chunking is off.
    pub fn splitter(&self) -> SearchResult<Option<Splitter>> {
        Ok(match self.method {
            ChunkingMethod::None => None,
            ChunkingMethod::Sentence => Some(Splitter::Sentence(SentenceSplitter::new(&self.delimiters)?)),
            ChunkingMethod::Word => Some(Splitter::Word(WordSplitter::new(self.num_words)?)),
            ChunkingMethod::Token => Some(Splitter::Token(TokenSplitter::new(self.num_tokens)?)),
        })
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> SearchResult<Self> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring environment
    /// overrides
    pub fn load_from(path: impl AsRef<Path>) -> SearchResult<Self> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().replace("__", ".").into()))
            .extract()
            .map_err(|e| SearchError::Config(e.to_string()))
    }

    /// Find the workspace config by looking for a .ragsearch directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> SearchResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SearchError::io(parent, e))?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| SearchError::Config(e.to_string()))?;
        std::fs::write(path, toml_string).map_err(|e| SearchError::io(path, e))
    }

    /// Create a default settings file with helpful comments in `dir`
    pub fn init_config_file(dir: impl AsRef<Path>, force: bool) -> SearchResult<PathBuf> {
        let config_dir = dir.as_ref().join(CONFIG_DIR);
        let config_path = config_dir.join("settings.toml");

        if !force && config_path.exists() {
            return Err(SearchError::Config(format!(
                "Configuration file already exists at {}\nSuggestion: Use --force to overwrite",
                config_path.display()
            )));
        }

        std::fs::create_dir_all(&config_dir).map_err(|e| SearchError::io(&config_dir, e))?;

        let template = format!(
            r#"# ragsearch configuration file

# Version of the configuration schema
version = 1

# Global debug mode
debug = false

[search]
# Ranking backend: "brute_force" (exact) or "ann" (inverted-list index)
method = "brute_force"

[index]
# Distance metric: "cos", "ip" or "l2sq"
metric = "cos"

# Stored vector precision for the ANN index: "f32", "bf16" or "i8"
quantization = "bf16"

# Target number of vectors per inverted list
connectivity = 32

# k-means refinement passes when the lists are rebuilt
expansion_add = 40

# Minimum number of lists scanned per query
expansion_search = 16

[chunking]
# Split texts before indexing: "none", "sentence", "word" or "token"
method = "none"

# Return the matching chunks instead of whole texts
return_chunks = false

# Characters that end a sentence
delimiters = {delimiters:?}

# Chunk size for the word and token splitters
num_words = 10
num_tokens = 10

[embedding]
# fastembed model used for embeddings and tokenization
model = "{model}"

# Show a progress bar while the model downloads
show_download_progress = true
"#,
            delimiters = DEFAULT_DELIMITERS,
            model = DEFAULT_MODEL,
        );

        std::fs::write(&config_path, template).map_err(|e| SearchError::io(&config_path, e))?;
        Ok(config_path)
    }
}
