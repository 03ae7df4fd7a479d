//! Text splitters producing contiguous byte spans.
//!
//! Every splitter returns spans that start at 0, end at the input length,
//! and tile the input without gaps or overlap. Spans always fall on UTF-8
//! character boundaries, so slicing the input with them never panics.

mod sentence;
mod token;
mod word;

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub use sentence::{DEFAULT_DELIMITERS, SentenceSplitter};
pub use token::TokenSplitter;
pub use word::WordSplitter;

use crate::embedding::Embedder;
use crate::error::SearchResult;

/// Chunking strategy applied before entries reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingMethod {
    /// Texts are stored whole
    #[default]
    None,
    Token,
    Word,
    Sentence,
}

/// One of the available splitters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Splitter {
    Sentence(SentenceSplitter),
    Word(WordSplitter),
    Token(TokenSplitter),
}

impl Splitter {
    /// Spans of `input`. Only the token splitter consults the embedder.
    pub async fn split<E: Embedder>(&self, input: &str, embedder: &E) -> SearchResult<Vec<Range<usize>>> {
        match self {
            Self::Sentence(splitter) => Ok(splitter.split(input)),
            Self::Word(splitter) => Ok(splitter.split(input)),
            Self::Token(splitter) => splitter.split(input, embedder).await,
        }
    }

    /// Owner prefix of the chunking layer's archive entries.
    pub fn archive_owner(&self) -> &'static str {
        match self {
            Self::Sentence(_) => "SentenceSplitter",
            Self::Word(_) => "WordSplitter",
            Self::Token(_) => "TokenSplitter",
        }
    }

    pub fn method(&self) -> ChunkingMethod {
        match self {
            Self::Sentence(_) => ChunkingMethod::Sentence,
            Self::Word(_) => ChunkingMethod::Word,
            Self::Token(_) => ChunkingMethod::Token,
        }
    }
}

/// Slices `input` by `spans`.
pub fn spans_to_strings<'a>(input: &'a str, spans: &[Range<usize>]) -> Vec<&'a str> {
    spans.iter().filter_map(|span| input.get(span.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;

    #[tokio::test]
    async fn test_every_splitter_tiles_the_input() {
        let input = "First line here.\nSecond, with commas; and more!  Trailing words without end";
        let embedder = MockEmbedder::new(4);
        let splitters = [
            Splitter::Sentence(SentenceSplitter::default()),
            Splitter::Word(WordSplitter::new(3).unwrap()),
            Splitter::Token(TokenSplitter::new(7).unwrap()),
        ];

        for splitter in splitters {
            let spans = splitter.split(input, &embedder).await.unwrap();
            assert_eq!(spans.first().map(|s| s.start), Some(0), "{splitter:?}");
            assert_eq!(spans.last().map(|s| s.end), Some(input.len()), "{splitter:?}");
            assert!(spans.windows(2).all(|w| w[0].end == w[1].start));
            assert!(spans.iter().all(|s| s.start < s.end));
            assert_eq!(spans_to_strings(input, &spans).concat(), input);
        }
    }

    #[test]
    fn test_chunking_method_names() {
        let method: ChunkingMethod = serde_json::from_str("\"sentence\"").unwrap();
        assert_eq!(method, ChunkingMethod::Sentence);
        assert_eq!(
            Splitter::Word(WordSplitter::default()).archive_owner(),
            "WordSplitter"
        );
    }
}
