//! Chunking utilities for splitting page text into overlapping word windows.
//!
//! Every page of an ingested document is split into windows of
//! [`DEFAULT_CHUNK_WORDS`] words, with consecutive windows sharing
//! [`DEFAULT_CHUNK_OVERLAP`] words. Each window becomes one retrievable
//! passage.

use crate::error::{Error, Result};

/// Default window size in words.
pub const DEFAULT_CHUNK_WORDS: usize = 500;

/// Default number of words shared by consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Validated chunking parameters.
///
/// # Examples
///
/// ```
/// use lectern::chunking::{ChunkingConfig, DEFAULT_CHUNK_WORDS};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.size(), DEFAULT_CHUNK_WORDS);
///
/// // Overlap must be strictly smaller than the window.
/// assert!(ChunkingConfig::new(10, 10).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if overlap >= size {
            return Err(Error::Config(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` with these parameters. See [`chunk_words`].
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        chunk_words(text, self.size, self.overlap)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_WORDS,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A window of words from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The window's words joined by single spaces.
    pub text: String,
    /// Zero-based chunk index within the page.
    pub index: usize,
    /// Offset of the window's first word within the page's word list.
    pub start_word: usize,
}

/// Split text on whitespace into windows of `size` words.
///
/// Successive windows start `size - overlap` words apart, so each window
/// shares `overlap` words with its predecessor. The last window may be
/// shorter than `size`, and no window is emitted after the one that reaches
/// the end of the text. Empty text produces no chunks.
///
/// # Panics
///
/// The caller must guarantee `overlap < size`; otherwise the stride would
/// not advance. Use [`ChunkingConfig::new`] to validate untrusted values.
///
/// # Examples
///
/// ```
/// use lectern::chunking::chunk_words;
///
/// let chunks = chunk_words("a b c d e f g", 4, 1);
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["a b c d", "d e f g"]);
///
/// assert!(chunk_words("   ", 4, 1).is_empty());
/// ```
pub fn chunk_words(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    assert!(
        overlap < size,
        "chunk overlap must be smaller than chunk size"
    );

    let words: Vec<&str> = text.split_whitespace().collect();
    let stride = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + size).min(words.len());
        chunks.push(Chunk {
            text: words[start..end].join(" "),
            index: chunks.len(),
            start_word: start,
        });

        if end == words.len() {
            break;
        }
        start += stride;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_words("", 500, 50).is_empty());
        assert!(chunk_words(" \n\t ", 500, 50).is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_words("Hello,   world!\n", 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].start_word, 0);
    }

    #[test]
    fn five_hundred_twenty_words_make_two_chunks() {
        let text = numbered_words(520);
        let words: Vec<&str> = text.split_whitespace().collect();

        let chunks = chunk_words(&text, 500, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, words[0..500].join(" "));
        assert_eq!(chunks[1].text, words[450..520].join(" "));
        assert_eq!(chunks[1].text.split_whitespace().count(), 70);
        assert_eq!(chunks[1].start_word, 450);
    }

    #[test]
    fn exact_fit_has_no_trailing_window() {
        let text = numbered_words(500);
        assert_eq!(chunk_words(&text, 500, 50).len(), 1);
    }

    #[test]
    fn zero_overlap_tiles_the_text() {
        let chunks = chunk_words(&numbered_words(9), 3, 0);
        let starts: Vec<_> = chunks.iter().map(|c| c.start_word).collect();
        assert_eq!(starts, [0, 3, 6]);
    }

    #[test]
    #[should_panic(expected = "chunk overlap must be smaller than chunk size")]
    fn overlap_equal_to_size_panics() {
        chunk_words("a b c", 3, 3);
    }

    #[test]
    fn config_rejects_bad_overlap() {
        assert!(ChunkingConfig::new(50, 60).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        let config = ChunkingConfig::new(4, 1).unwrap();
        assert_eq!(config.chunk("a b c d e").len(), 2);
    }

    proptest! {
        #[test]
        fn chunks_cover_every_word(
            n in 0usize..400,
            size in 1usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % size;
            let text = numbered_words(n);
            let words: Vec<&str> = text.split_whitespace().collect();
            let chunks = chunk_words(&text, size, overlap);

            let mut covered = vec![false; n];
            for chunk in &chunks {
                let len = chunk.text.split_whitespace().count();
                for slot in &mut covered[chunk.start_word..chunk.start_word + len] {
                    *slot = true;
                }
            }
            prop_assert!(covered.iter().all(|c| *c));

            for (i, chunk) in chunks.iter().enumerate() {
                let chunk_words: Vec<&str> = chunk.text.split_whitespace().collect();
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk_words.len(), size);
                }
                prop_assert_eq!(
                    &chunk_words[..],
                    &words[chunk.start_word..chunk.start_word + chunk_words.len()]
                );
            }

            for pair in chunks.windows(2) {
                let prev: Vec<&str> = pair[0].text.split_whitespace().collect();
                let next: Vec<&str> = pair[1].text.split_whitespace().collect();
                let shared = overlap.min(next.len());
                prop_assert_eq!(&prev[prev.len() - overlap..][..shared], &next[..shared]);
            }
        }
    }
}
