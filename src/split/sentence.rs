use std::ops::Range;

use crate::error::{SearchError, SearchResult};

/// Characters that end a sentence unless configured otherwise.
pub const DEFAULT_DELIMITERS: &str = ".!:;?\n\r";

/// Splits text after delimiter characters.
///
/// A run of delimiters and whitespace after a delimiter stays with the
/// sentence it closes. A sentence is only closed once it contains some
/// non-whitespace text, so leading punctuation joins the next sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceSplitter {
    delimiters: Vec<char>,
}

impl SentenceSplitter {
    pub fn new(delimiters: &str) -> SearchResult<Self> {
        let delimiters: Vec<char> = delimiters.chars().collect();
        if delimiters.is_empty() {
            return Err(SearchError::invalid_argument(
                "sentence splitter needs at least one delimiter",
            ));
        }
        Ok(Self { delimiters })
    }

    fn is_delimiter(&self, c: char) -> bool {
        self.delimiters.contains(&c)
    }

    pub fn split(&self, input: &str) -> Vec<Range<usize>> {
        let chars: Vec<(usize, char)> = input.char_indices().collect();
        let mut spans = Vec::new();
        let mut start = 0;
        let mut seen_text = false;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i].1;
            let is_delimiter = self.is_delimiter(c);
            if is_delimiter {
                while i + 1 < chars.len()
                    && (self.is_delimiter(chars[i + 1].1) || chars[i + 1].1.is_whitespace())
                {
                    i += 1;
                }
            } else if !c.is_whitespace() {
                seen_text = true;
            }

            let at_end = i + 1 == chars.len();
            if at_end || (is_delimiter && seen_text) {
                let end = if at_end { input.len() } else { chars[i + 1].0 };
                spans.push(start..end);
                start = end;
                seen_text = false;
            }
            i += 1;
        }
        spans
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self {
            delimiters: DEFAULT_DELIMITERS.chars().collect(),
        }
    }
}
