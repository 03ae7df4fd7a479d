use std::ops::Range;

use crate::embedding::Embedder;
use crate::error::{SearchError, SearchResult};

/// How far either side of the estimated end a matching character is sought.
const ALIGN_SEARCH_RANGE: usize = 5;

/// How many trailing characters of a detokenized batch are tried as anchors.
const ALIGN_ANCHOR_CHARS: usize = 3;

/// Splits text into chunks of a fixed number of model tokens.
///
/// Detokenized text rarely matches the input byte for byte (casing,
/// whitespace, special markers), so each chunk end is estimated from the
/// detokenized length and then nudged onto a nearby character that matches
/// the tail of the detokenized batch. Chunks always tile the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSplitter {
    num_tokens: usize,
}

impl TokenSplitter {
    pub fn new(num_tokens: usize) -> SearchResult<Self> {
        if num_tokens == 0 {
            return Err(SearchError::invalid_argument(
                "token splitter needs at least one token per chunk",
            ));
        }
        Ok(Self { num_tokens })
    }

    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    pub async fn split<E: Embedder>(&self, input: &str, embedder: &E) -> SearchResult<Vec<Range<usize>>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let chars: Vec<char> = input.chars().collect();
        let offsets: Vec<usize> = input
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(input.len()))
            .collect();
        let last = chars.len() - 1;

        let tokens = embedder.tokenize(input).await?;
        let mut spans = Vec::new();
        let mut start = 0;

        for batch in tokens.chunks(self.num_tokens) {
            let detokenized: Vec<char> = embedder.detokenize(batch).await?.chars().collect();
            if detokenized.is_empty() {
                continue;
            }

            let end = align_end(&chars, &detokenized, start).max(start);
            spans.push(offsets[start]..offsets[end + 1]);
            start = end + 1;
            if start > last {
                break;
            }
        }

        if start <= last {
            spans.push(offsets[start]..input.len());
        }
        Ok(spans)
    }
}

impl Default for TokenSplitter {
    fn default() -> Self {
        Self { num_tokens: 10 }
    }
}

/// Char index of the last input character covered by `detokenized` when
/// the chunk begins at `start`.
fn align_end(chars: &[char], detokenized: &[char], start: usize) -> usize {
    let last = chars.len() - 1;
    let estimate = (start + detokenized.len() - 1).min(last);
    if estimate == last {
        return last;
    }

    for from_end in 0..ALIGN_ANCHOR_CHARS.min(detokenized.len()) {
        let anchor = detokenized[detokenized.len() - 1 - from_end];
        for offset in 0..ALIGN_SEARCH_RANGE {
            let before = estimate.checked_sub(offset);
            let after = Some(estimate + offset).filter(|&i| i <= last);
            for candidate in [before, after].into_iter().flatten() {
                if chars[candidate] == anchor {
                    return candidate;
                }
            }
        }
    }
    estimate
}
