//! Text embedding providers.
//!
//! The [`Embedder`] trait is the only way the engines and splitters reach
//! a model: text in, fixed-length vector out, plus the tokenizer round
//! trip the token splitter relies on. [`FastEmbedEmbedder`] runs a local
//! ONNX model through fastembed on the blocking thread pool.

use std::future::Future;
use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use thiserror::Error;

/// Name of the model used when none is configured.
pub const DEFAULT_MODEL: &str = "AllMiniLML6V2";

/// Errors raised by embedding providers.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error(
        "Failed to initialize embedding model '{model}': {reason}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit { model: String, reason: String },

    #[error(
        "Unknown embedding model '{0}'\nSuggestion: Use one of AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small"
    )]
    UnknownModel(String),

    #[error("Embedding generation failed: {0}")]
    Encode(String),

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Detokenization failed: {0}")]
    Detokenize(String),
}

/// Source of embeddings and tokenization for one model.
///
/// Every vector returned by `encode` has exactly `dimension()` components.
pub trait Embedder: Send + Sync {
    fn encode(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbedderError>> + Send;

    fn tokenize(&self, text: &str)
    -> impl Future<Output = Result<Vec<u32>, EmbedderError>> + Send;

    fn detokenize(
        &self,
        tokens: &[u32],
    ) -> impl Future<Output = Result<String, EmbedderError>> + Send;

    fn dimension(&self) -> usize;
}

impl<T: Embedder> Embedder for Arc<T> {
    fn encode(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbedderError>> + Send {
        (**self).encode(text)
    }

    fn tokenize(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<u32>, EmbedderError>> + Send {
        (**self).tokenize(text)
    }

    fn detokenize(
        &self,
        tokens: &[u32],
    ) -> impl Future<Output = Result<String, EmbedderError>> + Send {
        (**self).detokenize(tokens)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// Maps a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, EmbedderError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(EmbedderError::UnknownModel(other.to_string())),
    }
}

/// fastembed-backed embedder.
///
/// The model is not reentrant, so calls are serialized through a mutex and
/// executed with `spawn_blocking` to keep inference off the async workers.
pub struct FastEmbedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedEmbedder {
    /// Loads `model_name`, downloading it on first use.
    ///
    /// The output dimension is measured with a single embedding call.
    pub fn new(model_name: &str, show_download_progress: bool) -> Result<Self, EmbedderError> {
        let model = parse_embedding_model(model_name)?;
        let init_failed = |reason: String| EmbedderError::ModelInit {
            model: model_name.to_string(),
            reason,
        };

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model).with_show_download_progress(show_download_progress),
        )
        .map_err(|e| init_failed(e.to_string()))?;

        let sample = text_model
            .embed(vec!["dimension check"], None)
            .map_err(|e| init_failed(e.to_string()))?;
        let dimension = sample
            .first()
            .map(Vec::len)
            .filter(|&len| len > 0)
            .ok_or_else(|| init_failed("model returned an empty embedding".to_string()))?;

        tracing::info!(
            target: "ragsearch::embedding",
            "loaded embedding model {model_name} ({dimension} dimensions)"
        );

        Ok(Self {
            model: Arc::new(Mutex::new(text_model)),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl Embedder for FastEmbedEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let embeddings = tokio::task::spawn_blocking(move || model.lock().embed(vec![text], None))
            .await
            .map_err(|e| EmbedderError::Encode(format!("embedding task failed: {e}")))?
            .map_err(|e| EmbedderError::Encode(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedderError::Encode("model returned no embedding".to_string()))
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, EmbedderError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            model
                .lock()
                .tokenizer
                .encode(text, false)
                .map(|encoding| encoding.get_ids().to_vec())
                .map_err(|e| EmbedderError::Tokenize(e.to_string()))
        })
        .await
        .map_err(|e| EmbedderError::Tokenize(format!("tokenizer task failed: {e}")))?
    }

    async fn detokenize(&self, tokens: &[u32]) -> Result<String, EmbedderError> {
        let model = Arc::clone(&self.model);
        let tokens = tokens.to_vec();
        tokio::task::spawn_blocking(move || {
            model
                .lock()
                .tokenizer
                .decode(&tokens, true)
                .map_err(|e| EmbedderError::Detokenize(e.to_string()))
        })
        .await
        .map_err(|e| EmbedderError::Detokenize(format!("tokenizer task failed: {e}")))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedder for tests.
///
/// Unpinned texts get a normalized bag-of-words vector; tokens are the
/// text's Unicode scalar values, so detokenize inverts tokenize exactly.
#[cfg(test)]
pub struct MockEmbedder {
    dimension: usize,
    pinned: std::collections::HashMap<String, Vec<f32>>,
    failing: std::collections::HashSet<String>,
}

#[cfg(test)]
impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            pinned: Default::default(),
            failing: Default::default(),
        }
    }

    /// Pins the vector returned for `text`.
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.to_string(), vector);
        self
    }

    /// Makes `encode` fail for `text`.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    fn bag_of_words(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[cfg(test)]
impl Embedder for MockEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if self.failing.contains(text) {
            return Err(EmbedderError::Encode(format!("mock refuses '{text}'")));
        }
        Ok(self
            .pinned
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.bag_of_words(text)))
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, EmbedderError> {
        Ok(text.chars().map(u32::from).collect())
    }

    async fn detokenize(&self, tokens: &[u32]) -> Result<String, EmbedderError> {
        tokens
            .iter()
            .map(|&t| char::from_u32(t).ok_or_else(|| EmbedderError::Detokenize(format!("bad token {t}"))))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
