use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{SearchError, SearchResult};

/// Runs of punctuation or whitespace; each run closes the word before it.
static WORD_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{P}\s]+").expect("word boundary pattern is valid"));

/// Splits text into chunks of a fixed number of words.
///
/// A word extends through the punctuation and whitespace that follow it,
/// so chunks tile the input without gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSplitter {
    num_words: usize,
}

impl WordSplitter {
    pub fn new(num_words: usize) -> SearchResult<Self> {
        if num_words == 0 {
            return Err(SearchError::invalid_argument(
                "word splitter needs at least one word per chunk",
            ));
        }
        Ok(Self { num_words })
    }

    pub fn num_words(&self) -> usize {
        self.num_words
    }

    /// Byte spans of individual words, boundary runs included.
    pub fn words(input: &str) -> Vec<Range<usize>> {
        let mut words = Vec::new();
        let mut start = 0;
        for boundary in WORD_BOUNDARY.find_iter(input) {
            words.push(start..boundary.end());
            start = boundary.end();
        }
        if start < input.len() {
            words.push(start..input.len());
        }
        words
    }

    pub fn split(&self, input: &str) -> Vec<Range<usize>> {
        Self::words(input)
            .chunks(self.num_words)
            .filter_map(|chunk| Some(chunk.first()?.start..chunk.last()?.end))
            .collect()
    }
}

impl Default for WordSplitter {
    fn default() -> Self {
        Self { num_words: 10 }
    }
}
