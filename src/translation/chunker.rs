/*!
 * Token-bounded chunking of chapter text.
 *
 * Paragraphs are packed into chunks until the next one would overflow the
 * token budget. A paragraph that alone exceeds the budget is split by
 * sentence; consecutive sentence-mode chunks carry the trailing sentences of
 * their predecessor as `overlap_context` so the model keeps cross-chunk
 * context without the content itself being duplicated.
 *
 * Chunk indices are always the contiguous run `0..n-1`.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ChunkError;
use crate::translation::document::{split_paragraphs, Chunk};

/// Terminal punctuation (plus closing quotes/brackets) followed by whitespace
static SENTENCE_BOUNDARY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([.!?…]+["'»”’)\]]*)\s+"#).expect("Invalid sentence boundary regex")
});

/// Characters that may open a sentence besides capital letters
const SENTENCE_OPENERS: &[char] = &['"', '“', '«', '„', '\'', '‘', '(', '—', '–', '-', '['];

/// Options for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Token budget per chunk
    pub max_tokens: usize,

    /// Number of trailing sentences carried to the next sentence-mode chunk
    pub overlap_sentences: usize,

    /// Respect blank-line paragraph boundaries
    pub preserve_paragraphs: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            overlap_sentences: 2,
            preserve_paragraphs: true,
        }
    }
}

impl ChunkerConfig {
    /// Create a config with the given budget and default overlap.
    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }

    /// Set the sentence overlap.
    pub fn with_overlap(mut self, overlap_sentences: usize) -> Self {
        self.overlap_sentences = overlap_sentences;
        self
    }

    /// Enable or disable paragraph preservation.
    pub fn with_preserve_paragraphs(mut self, preserve: bool) -> Self {
        self.preserve_paragraphs = preserve;
        self
    }

    fn max_chars(&self) -> usize {
        self.max_tokens.saturating_mul(4)
    }
}

/// Chunk under construction, before indices are assigned
#[derive(Debug)]
struct PendingChunk {
    content: String,
    overlap_context: Option<String>,
    continuation: bool,
}

/// Splits text into ordered, token-bounded chunks.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker with the given options.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Get the chunker options.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into chunks.
    ///
    /// Empty or whitespace-only text yields no chunks.
    pub fn chunk(&self, text: &str) -> Result<Vec<Chunk>, ChunkError> {
        if self.config.max_tokens == 0 {
            return Err(ChunkError::InvalidConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }

        let mut pending = Vec::new();

        if self.config.preserve_paragraphs {
            self.chunk_paragraphs(text, &mut pending);
        } else {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                self.chunk_sentences(trimmed, &mut pending);
            }
        }

        let chunks: Vec<Chunk> = pending
            .into_iter()
            .enumerate()
            .map(|(index, p)| {
                let mut chunk = Chunk::new(index, p.content);
                chunk.overlap_context = p.overlap_context;
                chunk.continuation = p.continuation;
                chunk
            })
            .collect();

        debug!(
            "Chunked {} chars into {} chunk(s) (max {} tokens)",
            text.len(),
            chunks.len(),
            self.config.max_tokens
        );

        Ok(chunks)
    }

    /// Pack whole paragraphs, falling back to sentences for oversized ones.
    fn chunk_paragraphs(&self, text: &str, pending: &mut Vec<PendingChunk>) {
        let max_chars = self.config.max_chars();
        let mut buffer: Vec<&str> = Vec::new();
        let mut buffer_chars = 0usize;

        for paragraph in split_paragraphs(text) {
            let paragraph_chars = paragraph.chars().count();

            if paragraph_chars > max_chars {
                flush_buffer(&mut buffer, &mut buffer_chars, pending);
                self.chunk_sentences(paragraph, pending);
                continue;
            }

            let joined_chars = if buffer.is_empty() {
                paragraph_chars
            } else {
                buffer_chars + 2 + paragraph_chars
            };

            if !buffer.is_empty() && joined_chars > max_chars {
                flush_buffer(&mut buffer, &mut buffer_chars, pending);
                buffer_chars = paragraph_chars;
            } else {
                buffer_chars = joined_chars;
            }
            buffer.push(paragraph);
        }

        flush_buffer(&mut buffer, &mut buffer_chars, pending);
    }

    /// Pack sentences of a single block, carrying overlap between chunks.
    fn chunk_sentences(&self, block: &str, pending: &mut Vec<PendingChunk>) {
        let max_chars = self.config.max_chars();
        let sentences = split_sentences(block);
        let mut current: Vec<&str> = Vec::new();
        let mut current_chars = 0usize;
        let mut previous: Vec<&str> = Vec::new();
        let mut first_piece = true;

        for sentence in sentences {
            let sentence_chars = sentence.chars().count();
            let joined_chars = if current.is_empty() {
                sentence_chars
            } else {
                current_chars + 1 + sentence_chars
            };

            if !current.is_empty() && joined_chars > max_chars {
                pending.push(self.sentence_piece(&current, &previous, first_piece));
                first_piece = false;
                previous = std::mem::take(&mut current);
                current_chars = sentence_chars;
            } else {
                current_chars = joined_chars;
            }

            if sentence_chars > max_chars {
                debug!(
                    "Sentence of {} chars exceeds the chunk budget and is kept whole",
                    sentence_chars
                );
            }
            current.push(sentence);
        }

        if !current.is_empty() {
            pending.push(self.sentence_piece(&current, &previous, first_piece));
        }
    }

    fn sentence_piece(&self, current: &[&str], previous: &[&str], first_piece: bool) -> PendingChunk {
        let overlap_context = if first_piece || self.config.overlap_sentences == 0 {
            None
        } else {
            let start = previous.len().saturating_sub(self.config.overlap_sentences);
            let overlap = previous[start..].join(" ");
            (!overlap.is_empty()).then_some(overlap)
        };

        PendingChunk {
            content: current.join(" "),
            overlap_context,
            continuation: !first_piece,
        }
    }
}

fn flush_buffer(buffer: &mut Vec<&str>, buffer_chars: &mut usize, pending: &mut Vec<PendingChunk>) {
    if buffer.is_empty() {
        return;
    }
    pending.push(PendingChunk {
        content: buffer.join("\n\n"),
        overlap_context: None,
        continuation: false,
    });
    buffer.clear();
    *buffer_chars = 0;
}

/// Split a block into sentences.
///
/// A boundary is terminal punctuation followed by whitespace and then a
/// capital letter or an opening quote/dash. Whitespace between sentences is
/// dropped; everything else is kept verbatim.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;

    for caps in SENTENCE_BOUNDARY_REGEX.captures_iter(text) {
        let (Some(whole), Some(punct)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        let opens_sentence = text[whole.end()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase() || SENTENCE_OPENERS.contains(&c));

        if !opens_sentence || punct.end() <= start {
            continue;
        }

        let sentence = text[start..punct.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = whole.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Join chunks back into text: sort by index, drop empty content, join with a blank line.
///
/// Fails when indices are not exactly `0..n-1` or when nothing is left.
pub fn merge_chunks(chunks: &[Chunk]) -> Result<String, ChunkError> {
    let ordered = ordered_chunks(chunks)?;

    let parts: Vec<&str> = ordered
        .iter()
        .map(|c| c.content.trim())
        .filter(|c| !c.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(ChunkError::EmptyResult);
    }

    Ok(parts.join("\n\n"))
}

/// Like `merge_chunks`, but re-joins continuation chunks to the paragraph
/// they split from with a single space, restoring the source paragraph layout.
pub fn reassemble_chunks(chunks: &[Chunk]) -> Result<String, ChunkError> {
    let ordered = ordered_chunks(chunks)?;
    let mut merged = String::new();

    for chunk in ordered {
        let content = chunk.content.trim();
        if content.is_empty() {
            continue;
        }
        if !merged.is_empty() {
            merged.push_str(if chunk.continuation { " " } else { "\n\n" });
        }
        merged.push_str(content);
    }

    if merged.is_empty() {
        return Err(ChunkError::EmptyResult);
    }

    Ok(merged)
}

fn ordered_chunks(chunks: &[Chunk]) -> Result<Vec<&Chunk>, ChunkError> {
    if chunks.is_empty() {
        return Err(ChunkError::EmptyResult);
    }

    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);

    for (expected, chunk) in ordered.iter().enumerate() {
        if chunk.index != expected {
            return Err(ChunkError::NonContiguous {
                expected,
                found: chunk.index,
            });
        }
    }

    Ok(ordered)
}
