
use itertools::{Itertools, MinMaxResult};
use tracing::debug;

use crate::ingest::document::Page;
use crate::{RagError, Result};

/// Separators tried in order of preference when looking for a chunk boundary
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Configuration for content chunking, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared by two consecutive chunks of the same page
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
        }
    }
}

/// A slice of a page's text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// The chunk text
    pub content: String,
    /// File name of the source document
    pub source: String,
    /// 1-based page number
    pub page: u32,
    /// Position of this chunk within the ingested document
    pub chunk_index: usize,
    /// Character offset of the chunk within its page
    pub start_index: usize,
}

impl DocumentChunk {
    /// Length in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A piece of text produced by [`TextSplitter::split`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Character offset of the span in the input
    pub start: usize,
    pub text: String,
}

/// Length statistics over a set of chunks
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChunkStats {
    pub mean: f64,
    pub min: usize,
    pub max: usize,
}

impl ChunkStats {
    #[inline]
    pub fn from_chunks(chunks: &[DocumentChunk]) -> Self {
        let lengths: Vec<usize> = chunks.iter().map(DocumentChunk::char_len).collect();
        if lengths.is_empty() {
            return Self::default();
        }

        let (min, max) = match lengths.iter().copied().minmax() {
            MinMaxResult::NoElements => (0, 0),
            MinMaxResult::OneElement(len) => (len, len),
            MinMaxResult::MinMax(min, max) => (min, max),
        };
        let mean = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;

        Self { mean, min, max }
    }
}

/// Recursive boundary-preference splitter.
///
/// Each chunk ends at the last paragraph break that fits, else the last line
/// break, else the last space, else it is cut at `chunk_size`. The next chunk
/// starts `chunk_overlap` characters before the previous one ended.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Vec<char>>,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(RagError::InvalidInput(format!(
                "chunk overlap ({}) must be smaller than a non-zero chunk size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: SEPARATORS.iter().map(|s| s.chars().collect()).collect(),
        })
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into overlapping spans; whitespace-only spans are dropped
    #[inline]
    pub fn split(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = if chars.len() - start <= self.chunk_size {
                chars.len()
            } else {
                self.find_break(&chars, start)
            };

            let piece: String = chars.get(start..end).unwrap_or_default().iter().collect();
            if !piece.trim().is_empty() {
                spans.push(Span { start, text: piece });
            }

            if end == chars.len() {
                break;
            }
            // find_break guarantees end > start + overlap
            start = end - self.chunk_overlap;
        }

        spans
    }

    /// Pick the end of the chunk starting at `start`, which is known not to fit entirely
    fn find_break(&self, chars: &[char], start: usize) -> usize {
        let lower = start + self.chunk_overlap;
        let upper = start + self.chunk_size;

        self.separators
            .iter()
            .find_map(|separator| last_boundary(chars, separator, start, lower, upper))
            .unwrap_or(upper)
    }
}

/// Last position in `(lower, upper]` that directly follows `separator`,
/// with the separator lying entirely at or after `start`
fn last_boundary(
    chars: &[char],
    separator: &[char],
    start: usize,
    lower: usize,
    upper: usize,
) -> Option<usize> {
    (lower + 1..=upper).rev().find(|&end| {
        end >= start + separator.len()
            && chars
                .get(end - separator.len()..end)
                .is_some_and(|window| window == separator)
    })
}

/// Split every page and number the resulting chunks in document order
#[inline]
pub fn split_pages(pages: &[Page], splitter: &TextSplitter) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for span in splitter.split(&page.text) {
            chunks.push(DocumentChunk {
                content: span.text,
                source: page.source.clone(),
                page: page.number,
                chunk_index: chunks.len(),
                start_index: span.start,
            });
        }
    }

    debug!(
        "Split {} page(s) into {} chunk(s) (size {}, overlap {})",
        pages.len(),
        chunks.len(),
        splitter.chunk_size,
        splitter.chunk_overlap
    );

    chunks
}
