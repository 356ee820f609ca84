//! This module splits raw document text into overlapping passages for embedding
//! and retrieval within a RAG (Retrieval Augmented Generation) system.
//!
//! Passages are the unit of storage and retrieval: a document is never embedded
//! whole. Each passage carries string metadata describing where it came from
//! (source name, CSV row, chunk sequence) so that an answer can be traced back.
//!
//! The module defines two main types:
//! - [`TextSplitter`]: holds the delimiter set, the maximum window size and the
//!   overlap, and produces passages from text.
//! - [`PassageChunk`]: a single window of text plus its metadata.
//!
//! # Splitting Strategy
//!
//! *   **Recursive Segmentation**: text is first broken into atomic segments by
//!     trying delimiters from most to least significant (paragraphs, lines,
//!     sentences, words). A segment that is still too large is split by the
//!     next delimiter, and as a last resort by characters.
//! *   **Window Assembly**: windows of at most `chunk_size` characters are then
//!     cut at the furthest segment boundary that fits.
//! *   **Overlap**: every window after the first starts exactly `overlap`
//!     characters before the end of the previous one.
//!
//! Sizes are measured in characters, never bytes, so multi-byte text is never
//! cut inside a code point.
//!
//! ```
//! use kestrel_ai_context::text::TextSplitter;
//!
//! let splitter = TextSplitter::with_defaults(40, 8).unwrap();
//! let text = "The disk on db-1 is at 91%. Alert fired twice.\n\nNo action taken yet.";
//! let chunks = splitter.split(text);
//!
//! assert!(chunks.len() > 1);
//! for pair in chunks.windows(2) {
//!     let tail: String = pair[0].chars().rev().take(8).collect::<Vec<_>>().into_iter().rev().collect();
//!     assert!(pair[1].starts_with(&tail));
//! }
//! assert!(chunks.iter().all(|c| c.chars().count() <= 40));
//! ```
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

/// Metadata key holding the name of the document a passage came from.
pub const SOURCE_KEY: &str = "source";

/// Metadata key holding the 0-based position of a passage within its document.
pub const CHUNK_KEY: &str = "chunk";

/// Default delimiters for plain prose, ordered from most to least significant.
///
/// - `\n\n`: paragraph breaks
/// - `\n`: line breaks
/// - `[.!?]\s+`: sentence ends
/// - ` `: word breaks
pub const DEFAULT_TEXT_DELIMITERS: &[&str] = &[
    r"\n\n",     // Paragraphs
    r"\n",       // Line breaks
    r"[.!?]\s+", // Sentence ends
    r" ",        // Words
];

/// Delimiters for Markdown documents.
pub const DEFAULT_MARKDOWN_DELIMITERS: &[&str] = &[
    r"(?m)^#{1,6} .*$", // Headings
    r"```",             // Code block fences
    r"\n\n",            // Paragraphs
    r"(?m)^[-*+] ",     // Unordered list items
    r"(?m)^\d+\. ",     // Ordered list items
    r"\n",              // Line breaks
    r" ",               // Words
];

/// Get appropriate delimiters for a document based on its file extension.
///
/// Markdown files split on headings and list items first; everything else is
/// treated as prose.
///
/// ```
/// use std::path::Path;
/// use kestrel_ai_context::text::{get_delimiters_for_path, DEFAULT_MARKDOWN_DELIMITERS};
///
/// assert_eq!(get_delimiters_for_path(Path::new("runbook.md")), DEFAULT_MARKDOWN_DELIMITERS);
/// ```
pub fn get_delimiters_for_path(path: &Path) -> &'static [&'static str] {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("md") | Some("markdown") => DEFAULT_MARKDOWN_DELIMITERS,
        _ => DEFAULT_TEXT_DELIMITERS,
    }
}

/// Errors raised while building a [`TextSplitter`].
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { overlap: usize, chunk_size: usize },

    #[error("invalid delimiter pattern `{pattern}`: {source}")]
    InvalidDelimiter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single passage of text along with metadata about its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageChunk {
    /// The text content of this passage.
    pub text: String,
    /// Source metadata, e.g. `source`, `chunk`, `row`.
    pub metadata: BTreeMap<String, String>,
}

impl PassageChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry (builder style)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Name of the document this passage was cut from, if known.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }

    /// Builds a formatted representation of the passage for use as model context.
    ///
    /// The header line carries the metadata as JSON, followed by the passage text:
    ///
    /// ```
    /// use kestrel_ai_context::text::PassageChunk;
    ///
    /// let chunk = PassageChunk::new("cpu steady at 40%").with_metadata("source", "notes.txt");
    /// assert_eq!(chunk.build(), "passage: {\"source\":\"notes.txt\"}\ncpu steady at 40%");
    /// ```
    pub fn build(&self) -> String {
        let metadata = serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string());
        format!("passage: {metadata}\n{}", self.text)
    }
}

/// Splits text into overlapping, size-bounded windows.
///
/// Holds a set of delimiter regexes applied in order of significance, a maximum
/// window size in characters and the number of characters shared by adjacent
/// windows. Splitting is deterministic for identical input and parameters.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    delimiters: Vec<Regex>,
    chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    /// Creates a splitter from explicit delimiter patterns.
    ///
    /// # Errors
    ///
    /// Fails when `chunk_size` is zero, when `overlap >= chunk_size`, or when a
    /// delimiter pattern is not a valid regular expression.
    pub fn new(
        delimiter_patterns: &[&str],
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                overlap,
                chunk_size,
            });
        }

        let delimiters = delimiter_patterns
            .iter()
            .map(|&pattern| {
                Regex::new(pattern).map_err(|source| ChunkError::InvalidDelimiter {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            delimiters,
            chunk_size,
            overlap,
        })
    }

    /// Creates a splitter using [`DEFAULT_TEXT_DELIMITERS`].
    pub fn with_defaults(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        Self::new(DEFAULT_TEXT_DELIMITERS, chunk_size, overlap)
    }

    /// Creates a splitter whose delimiters suit the given document path.
    pub fn for_path(path: &Path, chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        Self::new(get_delimiters_for_path(path), chunk_size, overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into windows of at most `chunk_size` characters.
    ///
    /// Window `i + 1` always begins with the last `overlap` characters of window
    /// `i`. With an overlap of zero, concatenating the windows reproduces `text`.
    /// Empty input yields no windows.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let segments = self.split_recursively_into_segments(text, 0, 0);
        // Segments are contiguous and ordered, so their ends are sorted.
        let boundaries: Vec<usize> = segments.iter().map(|range| range.end).collect();

        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            let limit = advance_chars(text, start, self.chunk_size);
            // A window must extend past the overlapped prefix, or the next one
            // would not make progress.
            let min_end = advance_chars(text, start, self.overlap + 1);

            let candidate = boundaries
                .partition_point(|&boundary| boundary <= limit)
                .checked_sub(1)
                .map(|idx| boundaries[idx]);
            let end = match candidate {
                Some(boundary) if boundary >= min_end => boundary,
                _ => limit,
            };

            windows.push(text[start..end].to_string());
            if end >= text.len() {
                break;
            }
            start = retreat_chars(text, end, self.overlap);
        }

        windows
    }

    /// Splits a document into [`PassageChunk`]s, copying `metadata` onto every
    /// chunk and recording each chunk's sequence number under [`CHUNK_KEY`].
    pub fn split_document(
        &self,
        text: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Vec<PassageChunk> {
        let chunks: Vec<PassageChunk> = self
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(sequence, window)| PassageChunk {
                text: window,
                metadata: metadata.clone(),
            }
            .with_metadata(CHUNK_KEY, sequence.to_string()))
            .collect();

        tracing::debug!(
            "Split {} characters into {} chunks (size {}, overlap {})",
            text.chars().count(),
            chunks.len(),
            self.chunk_size,
            self.overlap
        );
        chunks
    }

    // Recursively splits the text into atomic segments. Returns byte ranges of
    // the original text; every range is either a delimiter match or a run of
    // text no longer than `chunk_size` characters. Together they cover `text`.
    fn split_recursively_into_segments(
        &self,
        text: &str,
        delimiter_idx: usize,
        current_offset: usize,
    ) -> Vec<Range<usize>> {
        let mut result_segments: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return result_segments;
        }

        // Base case 1: the text already fits.
        if text.chars().count() <= self.chunk_size {
            result_segments.push(current_offset..(current_offset + text.len()));
            return result_segments;
        }

        // Base case 2: delimiters exhausted, split by characters.
        if delimiter_idx >= self.delimiters.len() {
            let mut local_start = 0;
            while local_start < text.len() {
                let local_end = advance_chars(text, local_start, self.chunk_size);
                result_segments.push(current_offset + local_start..current_offset + local_end);
                local_start = local_end;
            }
            return result_segments;
        }

        let current_delimiter = &self.delimiters[delimiter_idx];
        let mut local_byte_start = 0;

        for mat in current_delimiter.find_iter(text) {
            if mat.start() == mat.end() {
                continue;
            }
            if mat.start() > local_byte_start {
                result_segments.extend(self.split_recursively_into_segments(
                    &text[local_byte_start..mat.start()],
                    delimiter_idx + 1,
                    current_offset + local_byte_start,
                ));
            }
            // The delimiter itself is a segment
            result_segments.push(current_offset + mat.start()..current_offset + mat.end());
            local_byte_start = mat.end();
        }

        if local_byte_start < text.len() {
            result_segments.extend(self.split_recursively_into_segments(
                &text[local_byte_start..],
                delimiter_idx + 1,
                current_offset + local_byte_start,
            ));
        }

        result_segments
    }
}

/// Byte offset reached by moving `count` characters forward from `from`,
/// clamped to the end of the text.
fn advance_chars(text: &str, from: usize, count: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(count)
        .map(|(idx, _)| from + idx)
        .unwrap_or(text.len())
}

/// Byte offset reached by moving `count` characters backward from `to`,
/// clamped to the start of the text.
fn retreat_chars(text: &str, to: usize, count: usize) -> usize {
    if count == 0 {
        return to;
    }
    text[..to]
        .char_indices()
        .rev()
        .nth(count - 1)
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_chars(text: &str, count: usize) -> String {
        let chars: Vec<char> = text.chars().collect();
        chars[chars.len() - count..].iter().collect()
    }

    #[test]
    fn test_split_basic() {
        // Procedurally generate a long string by repeating a simple sentence 100 times
        let text = (0..100)
            .map(|_| "This is a test sentence. ")
            .collect::<String>();
        let chunk_size = 500;
        let splitter = TextSplitter::with_defaults(chunk_size, 0).unwrap();
        let chunks = splitter.split(&text);

        let optimal_chunk_count = text.len() / chunk_size + 1;
        assert!(chunks.len() >= optimal_chunk_count - 1);
        assert!(chunks.len() <= optimal_chunk_count + 1);

        for chunk in &chunks {
            assert!(chunk.chars().count() <= chunk_size);
        }

        // Without overlap the windows tile the input exactly
        let reconstructed: String = chunks.concat();
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn test_split_single_chunk() {
        let splitter = TextSplitter::with_defaults(500, 50).unwrap();
        let text = "This is a very short document.";
        let chunks = splitter.split(text);

        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_split_empty_content() {
        let splitter = TextSplitter::with_defaults(500, 50).unwrap();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split_document("", &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_overlap_is_exact() {
        let text = "Disk usage on db-1 crossed 90 percent at 02:14. \
                    The on-call engineer rotated the logs.\n\n\
                    Usage dropped to 61 percent. No further alerts fired overnight, \
                    and the retention policy was shortened to seven days.";

        for (chunk_size, overlap) in [(40, 1), (40, 10), (25, 24), (60, 15), (7, 3)] {
            let splitter = TextSplitter::with_defaults(chunk_size, overlap).unwrap();
            let chunks = splitter.split(text);
            assert!(chunks.len() > 1, "size {chunk_size} should split the text");

            for pair in chunks.windows(2) {
                let shared = last_chars(&pair[0], overlap);
                assert!(
                    pair[1].starts_with(&shared),
                    "chunk {:?} should start with {:?} (size {chunk_size}, overlap {overlap})",
                    pair[1],
                    shared
                );
            }
            for chunk in &chunks {
                assert!(chunk.chars().count() <= chunk_size);
            }

            // Dropping each window's overlapped prefix rebuilds the source text
            let mut rebuilt = chunks[0].clone();
            for chunk in &chunks[1..] {
                rebuilt.extend(chunk.chars().skip(overlap));
            }
            assert_eq!(rebuilt, text);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "first paragraph here\n\nsecond paragraph there";
        let splitter = TextSplitter::with_defaults(24, 0).unwrap();
        let chunks = splitter.split(text);

        assert_eq!(chunks[0], "first paragraph here\n\n");
        assert_eq!(chunks[1], "second paragraph there");
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ünïcode ñandú ".repeat(10);
        let splitter = TextSplitter::with_defaults(16, 4).unwrap();
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 16);
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa".repeat(5);
        let splitter = TextSplitter::with_defaults(30, 5).unwrap();
        assert_eq!(splitter.split(&text), splitter.split(&text));
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        assert!(matches!(
            TextSplitter::with_defaults(0, 0),
            Err(ChunkError::ZeroChunkSize)
        ));
        assert!(matches!(
            TextSplitter::with_defaults(10, 10),
            Err(ChunkError::OverlapTooLarge {
                overlap: 10,
                chunk_size: 10
            })
        ));
        assert!(matches!(
            TextSplitter::new(&["("], 10, 0),
            Err(ChunkError::InvalidDelimiter { .. })
        ));
    }

    #[test]
    fn test_split_document_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), "notes.txt".to_string());

        let splitter = TextSplitter::with_defaults(10, 2).unwrap();
        let chunks = splitter.split_document("alpha beta gamma", &metadata);

        assert!(!chunks.is_empty());
        for (sequence, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source(), Some("notes.txt"));
            assert_eq!(chunk.metadata.get(CHUNK_KEY), Some(&sequence.to_string()));
        }
    }

    #[test]
    fn test_markdown_elements() {
        let text = r#"
# Heading 1

This is a paragraph.

## Heading 2

- List item 1
- List item 2

```rust
fn main() {
    println!("Hello, world!");
}
```

Another paragraph.
"#;
        let splitter = TextSplitter::for_path(Path::new("runbook.md"), 500, 0).unwrap();
        let chunks = splitter.split(text);

        assert!(!chunks.is_empty());
        assert_eq!(chunks.concat(), text);
        let list_chunk = chunks
            .iter()
            .find(|c| c.contains("- List item 1"))
            .unwrap();
        assert!(list_chunk.contains("- List item 2"));
    }
}
