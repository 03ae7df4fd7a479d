//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ragsearch::{Embedder, EmbedderError, IndexParams, Metric, Quantization, SearchEngine, SearchMethod};

/// Deterministic embedder: pinned vectors for known texts, a hashed
/// bag-of-words vector for everything else. Tokens are Unicode scalars.
pub struct FixtureEmbedder {
    dimension: usize,
    pinned: HashMap<String, Vec<f32>>,
}

impl FixtureEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            pinned: HashMap::new(),
        }
    }

    pub fn pin(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimension, "pinned vector for '{text}'");
        self.pinned.insert(text.to_string(), vector);
        self
    }

    fn bag_of_words(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
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

impl Embedder for FixtureEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
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
        Ok(tokens.iter().filter_map(|&t| char::from_u32(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Full-precision parameters so ANN distances match exact ones.
pub fn exact_params(metric: Metric) -> IndexParams {
    IndexParams {
        metric,
        quantization: Quantization::F32,
        ..IndexParams::default()
    }
}

pub fn engine(embedder: FixtureEmbedder, method: SearchMethod) -> SearchEngine<FixtureEmbedder> {
    SearchEngine::new(Arc::new(embedder), method, exact_params(Metric::Cos)).expect("engine builds")
}

/// Reproducible random vectors with components in [-1, 1).
pub fn random_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}
