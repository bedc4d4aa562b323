/*!
 * Types shared by the stage executors.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::providers::CompletionOptions;
use crate::translation::markers::{marker_for, MarkerTagger};
use crate::translation::prompts::{PromptBuilder, PromptContext};

use super::orchestrator::PipelineConfig;

/// The three pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Entity and style extraction
    Analyze,
    /// Translation proper
    Translate,
    /// Post-editing of the translation
    Edit,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Analyze => write!(f, "analyze"),
            StageKind::Translate => write!(f, "translate"),
            StageKind::Edit => write!(f, "edit"),
        }
    }
}

/// Outcome of one stage
#[derive(Debug, Clone)]
pub struct StageResult<T> {
    /// Which stage produced this result
    pub stage: StageKind,

    /// Whether the stage produced usable output
    pub success: bool,

    /// Stage output, present on success
    pub data: Option<T>,

    /// Tokens consumed across all calls of the stage
    pub tokens_used: u64,

    /// Wall time of the stage
    pub duration: Duration,

    /// Error message on failure
    pub error: Option<String>,
}

impl<T> StageResult<T> {
    /// Create a successful result.
    pub fn success(stage: StageKind, data: T, tokens_used: u64, duration: Duration) -> Self {
        Self {
            stage,
            success: true,
            data: Some(data),
            tokens_used,
            duration,
            error: None,
        }
    }

    /// Create a failed result.
    pub fn failure(stage: StageKind, error: impl Into<String>, tokens_used: u64, duration: Duration) -> Self {
        Self {
            stage,
            success: false,
            data: None,
            tokens_used,
            duration,
            error: Some(error.into()),
        }
    }

    /// Output of a successful stage.
    pub fn output(&self) -> Option<&T> {
        if self.success {
            self.data.as_ref()
        } else {
            None
        }
    }
}

/// Translation of one paragraph, keyed by the marker id it came back under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphTranslation {
    /// Marker id (a paragraph id or an `auto_` id)
    pub marker_id: String,

    /// Translated text
    pub text: String,
}

/// Translation of one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTranslation {
    /// Display label of the source chunk
    pub chunk_id: String,

    /// Position of the source chunk
    pub index: usize,

    /// Source content, markers included
    pub original: String,

    /// Translated content as returned by the model, markers included
    pub translated: String,

    /// Per-paragraph translations recovered from markers; empty when markers were lost
    #[serde(default)]
    pub paragraphs: Vec<ParagraphTranslation>,

    /// Number of paragraphs in the source chunk
    pub source_paragraphs: usize,

    /// The chunk continues the last paragraph of the previous chunk
    #[serde(default)]
    pub continuation: bool,

    /// Marker owning text that precedes the first marker of this chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading_owner: Option<String>,

    /// Whether the translation came from structured output
    #[serde(default)]
    pub structured: bool,

    /// Error message when the chunk failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkTranslation {
    /// Whether the chunk produced a translation
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether paragraph identity was recovered for this chunk
    pub fn has_paragraph_ids(&self) -> bool {
        self.is_success() && !self.paragraphs.is_empty()
    }
}

/// Recover `(marker, text)` pairs from marker-bearing text.
///
/// Text before the first marker belongs to `leading_owner` (the paragraph a
/// continuation chunk continues) and is dropped when there is none.
pub fn recover_paragraphs(text: &str, leading_owner: Option<&str>) -> Vec<ParagraphTranslation> {
    let mut paragraphs = Vec::new();

    let first_marker = MarkerTagger::marker_ids(text)
        .first()
        .and_then(|id| text.find(&marker_for(id)));
    let leading = match first_marker {
        Some(position) => text[..position].trim(),
        None => text.trim(),
    };

    if let Some(owner) = leading_owner {
        if !leading.is_empty() {
            paragraphs.push(ParagraphTranslation {
                marker_id: owner.to_string(),
                text: leading.to_string(),
            });
        }
    }

    paragraphs.extend(
        MarkerTagger::split_tagged(text)
            .into_iter()
            .map(|(marker_id, text)| ParagraphTranslation { marker_id, text }),
    );

    paragraphs
}

/// Everything a stage needs besides its provider
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Pipeline settings
    pub config: &'a PipelineConfig,

    /// Prompt construction for the language pair
    pub prompts: &'a PromptBuilder,

    /// Rendered glossary, if any
    pub glossary: Option<&'a str>,

    /// Chapter number for prompts
    pub chapter_number: u32,
}

impl StageContext<'_> {
    /// Sampling options for stage calls.
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions::new(self.config.temperature, self.config.max_output_tokens)
    }

    /// Prompt context for one chunk.
    pub fn prompt_context(&self, index: usize, total: usize) -> PromptContext {
        let mut context = PromptContext::for_chunk(self.chapter_number, index, total);
        context.glossary = self.glossary.map(|g| g.to_string());
        context
    }
}

/// Chunk progress reporting: `(chunks_done, chunks_total)`
pub type ChunkProgress<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Last `max_chars` characters of `text`, cut at a word boundary when possible
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.trim().to_string();
    }

    let tail: String = text.chars().skip(total - max_chars).collect();
    match tail.find(char::is_whitespace) {
        Some(space) if space <= tail.len() / 2 => tail[space..].trim().to_string(),
        _ => tail.trim().to_string(),
    }
}
