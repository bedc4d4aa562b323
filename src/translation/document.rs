/*!
 * Core document types shared by the chunker, the pipeline and the
 * synchronization engine.
 *
 * A chapter is an ordered list of `Paragraph` records. Paragraph ids are
 * assigned once at import and are the only key that survives a translation
 * round trip; `index` is the canonical reading order.
 */

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Paragraphs made only of formatting punctuation, e.g. `***` or `---`
static SEPARATOR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s*\-_=~#]+$").expect("Invalid separator regex"));

/// Blank-line paragraph boundary
static PARAGRAPH_BREAK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*(?:\r?\n[ \t]*)+").expect("Invalid paragraph break regex"));

/// Prefix of the error marker written by the UI layer
pub const ERROR_MARKER_PREFIX: &str = "❌";

/// Prefix of placeholder text written in place of a failed translation
pub const ERROR_PLACEHOLDER_PREFIX: &str = "[ERROR";

/// Lifecycle state of a paragraph's translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphStatus {
    /// Not translated yet
    #[default]
    Pending,
    /// Translated by the pipeline
    Translated,
    /// Changed by hand after translation
    Edited,
    /// Accepted by a reviewer
    Approved,
}

impl ParagraphStatus {
    /// Whether a human has touched this paragraph
    pub fn is_human_reviewed(&self) -> bool {
        matches!(self, Self::Edited | Self::Approved)
    }
}

impl fmt::Display for ParagraphStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParagraphStatus::Pending => write!(f, "pending"),
            ParagraphStatus::Translated => write!(f, "translated"),
            ParagraphStatus::Edited => write!(f, "edited"),
            ParagraphStatus::Approved => write!(f, "approved"),
        }
    }
}

impl std::str::FromStr for ParagraphStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ParagraphStatus::Pending),
            "translated" => Ok(ParagraphStatus::Translated),
            "edited" => Ok(ParagraphStatus::Edited),
            "approved" => Ok(ParagraphStatus::Approved),
            _ => Err(anyhow::anyhow!("Invalid paragraph status: {}", s)),
        }
    }
}

/// Who produced the current translated text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditedBy {
    /// The translation pipeline
    Ai,
    /// A human editor
    User,
}

/// One paragraph of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    /// Stable id, assigned once at import
    pub id: String,

    /// Position in the chapter
    pub index: usize,

    /// Source text
    pub original_text: String,

    /// Current translation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,

    /// Translation status
    #[serde(default)]
    pub status: ParagraphStatus,

    /// When the translation last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,

    /// Who last changed the translation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<EditedBy>,
}

impl Paragraph {
    /// Create a pending paragraph.
    pub fn new(id: impl Into<String>, index: usize, original_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index,
            original_text: original_text.into(),
            translated_text: None,
            status: ParagraphStatus::Pending,
            edited_at: None,
            edited_by: None,
        }
    }

    /// Set a translation and status in one go (builder style, mostly for fixtures).
    pub fn with_translation(mut self, text: impl Into<String>, status: ParagraphStatus) -> Self {
        self.translated_text = Some(text.into());
        self.status = status;
        self
    }

    /// Whether the stored translation counts as a real translation.
    pub fn has_valid_translation(&self) -> bool {
        self.translated_text.as_deref().is_some_and(is_valid_translation)
    }

    /// Whether the source text is a scene separator.
    pub fn is_separator(&self) -> bool {
        is_separator(&self.original_text)
    }
}

/// A token-bounded slice of chapter text submitted to a single LLM call.
///
/// `index` is the ordering key; `id` is only a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Display label (`chunk_{index}`)
    pub id: String,

    /// Text of the chunk
    pub content: String,

    /// Position of the chunk, contiguous from 0
    pub index: usize,

    /// Estimated token count of `content`
    pub token_count: usize,

    /// Trailing sentences of the previous chunk, given to the model as context only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_context: Option<String>,

    /// First paragraph of this chunk continues the last paragraph of the previous chunk
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continuation: bool,

    /// Number of blank-line separated blocks in `content`
    #[serde(default)]
    pub paragraph_count: usize,
}

impl Chunk {
    /// Create a chunk, computing its token estimate and block count.
    pub fn new(index: usize, content: String) -> Self {
        let token_count = estimate_tokens(&content);
        let paragraph_count = split_paragraphs(&content).len();
        Self {
            id: format!("chunk_{}", index),
            content,
            index,
            token_count,
            overlap_context: None,
            continuation: false,
            paragraph_count,
        }
    }
}

/// Estimated token count: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Whether text is made only of formatting punctuation.
pub fn is_separator(text: &str) -> bool {
    SEPARATOR_REGEX.is_match(text)
}

/// Whether a translation is usable: non-empty and not an error marker.
pub fn is_valid_translation(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with(ERROR_MARKER_PREFIX)
        && !trimmed.starts_with(ERROR_PLACEHOLDER_PREFIX)
}

/// Split text into trimmed, non-empty blank-line separated paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    let normalized = text.trim();
    if normalized.is_empty() {
        return Vec::new();
    }

    PARAGRAPH_BREAK_REGEX
        .split(normalized)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Build the `[ERROR: ...]` placeholder used for a failed unit of work.
pub fn error_placeholder(message: &str) -> String {
    format!("{}: {}]", ERROR_PLACEHOLDER_PREFIX, message)
}
