/*!
 * Translation stage.
 *
 * The marker-tagged chapter is chunked and each chunk is translated in
 * order, one call at a time. When the provider supports JSON mode the stage
 * asks for `{"paragraphs": [{"id", "translated"}]}` and validates the ids
 * against the chunk's markers; any parse or validation problem falls back to
 * a free-text call for that chunk only. A chunk whose calls fail becomes an
 * `[ERROR: ...]` placeholder so the run continues.
 */

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::errors::ProviderError;
use crate::providers::{ChatMessage, CompletionOptions, ProviderHandle};
use crate::translation::chunker::Chunker;
use crate::translation::document::{error_placeholder, is_valid_translation, split_paragraphs, Chunk};
use crate::translation::markers::{marker_for, normalize_marker_id, strip_markers, MarkerTagger};
use crate::translation::prompts::PromptContext;

use super::stage::{
    recover_paragraphs, tail_chars, ChunkProgress, ChunkTranslation, ParagraphTranslation,
    StageContext, StageKind, StageResult,
};

/// Placeholder reason for a paragraph missing from a structured response
const MISSING_TRANSLATION: &str = "missing translation";

/// One entry of a structured translation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredParagraph {
    /// Marker, either `--para:abc--` or the bare id
    pub id: String,

    /// Translated text
    #[serde(default)]
    pub translated: String,
}

/// Expected structured translation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredTranslation {
    /// One entry per marker
    #[serde(default)]
    pub paragraphs: Vec<StructuredParagraph>,
}

/// Output of the translation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationDraft {
    /// Source text, markers stripped
    pub original_text: String,

    /// Translated text, markers stripped
    pub translated_text: String,

    /// Per-chunk results in chunk order
    pub chunk_results: Vec<ChunkTranslation>,
}

impl TranslationDraft {
    /// Number of chunks that failed
    pub fn failed_chunks(&self) -> usize {
        self.chunk_results.iter().filter(|c| !c.is_success()).count()
    }
}

/// Join chunk translations into clean text.
///
/// Continuation chunks are appended to the previous paragraph with a space.
pub fn assemble_text(chunks: &[ChunkTranslation]) -> String {
    let mut text = String::new();

    for chunk in chunks {
        let content = strip_markers(&chunk.translated);
        if content.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str(if chunk.continuation && chunk.is_success() { " " } else { "\n\n" });
        }
        text.push_str(&content);
    }

    text
}

/// Marker of the last paragraph of a chunk, owner of the next continuation chunk's lead
pub fn last_marker(content: &str, fallback: Option<String>) -> Option<String> {
    MarkerTagger::marker_ids(content).pop().or(fallback)
}

/// Validate a structured response against the chunk's markers.
///
/// Returns the chunk text rebuilt in marker order and the recovered
/// paragraphs, or a description of why the response is unusable.
fn validate_structured(
    response: &StructuredTranslation,
    expected: &[String],
) -> Result<(String, Vec<ParagraphTranslation>), String> {
    if response.paragraphs.is_empty() {
        return Err("response contains no paragraphs".to_string());
    }

    let mut by_id: HashMap<String, &str> = HashMap::new();
    for entry in &response.paragraphs {
        let id = normalize_marker_id(&entry.id).ok_or_else(|| "entry without id".to_string())?;
        if !expected.contains(&id) {
            return Err(format!("unknown paragraph id '{}'", id));
        }
        by_id.entry(id).or_insert(entry.translated.trim());
    }

    if !by_id.values().any(|text| is_valid_translation(text)) {
        return Err("response contains no usable translation".to_string());
    }

    let missing = expected.iter().filter(|id| !by_id.contains_key(*id)).count();
    if missing > 0 {
        warn!("Structured response is missing {} of {} paragraph(s)", missing, expected.len());
    }

    let mut parts = Vec::with_capacity(expected.len());
    let mut paragraphs = Vec::with_capacity(expected.len());
    for id in expected {
        let text = match by_id.get(id) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => error_placeholder(MISSING_TRANSLATION),
        };
        parts.push(format!("{}{}", marker_for(id), text));
        paragraphs.push(ParagraphTranslation {
            marker_id: id.clone(),
            text,
        });
    }

    Ok((parts.join("\n\n"), paragraphs))
}

/// Stage 2: translation
#[derive(Debug, Clone)]
pub struct TranslateStage {
    provider: ProviderHandle,
}

impl TranslateStage {
    /// Create the stage over a provider.
    pub fn new(provider: ProviderHandle) -> Self {
        Self { provider }
    }

    /// Translate marker-tagged text.
    ///
    /// # Arguments
    /// * `ctx` - Stage context
    /// * `tagged_text` - Source text with a marker in front of every paragraph
    /// * `chunker` - Chunker for the run
    /// * `analysis` - Rendered analysis, if stage 1 produced one
    /// * `progress` - Called after every chunk
    pub async fn run(
        &self,
        ctx: &StageContext<'_>,
        tagged_text: &str,
        chunker: &Chunker,
        analysis: Option<&str>,
        progress: ChunkProgress<'_>,
    ) -> StageResult<TranslationDraft> {
        let start = Instant::now();

        let chunks = match chunker.chunk(tagged_text) {
            Ok(chunks) => chunks,
            Err(e) => return StageResult::failure(StageKind::Translate, e.to_string(), 0, start.elapsed()),
        };

        if chunks.is_empty() {
            return StageResult::failure(StageKind::Translate, "No source text to translate", 0, start.elapsed());
        }

        info!("Translating {} chunk(s) with {}", chunks.len(), self.provider.name());

        let options = ctx.completion_options();
        let use_structured = self.provider.supports_json() && ctx.config.prefer_structured_output;
        let mut results: Vec<ChunkTranslation> = Vec::with_capacity(chunks.len());
        let mut tokens_used = 0u64;
        let mut owner: Option<String> = None;
        let mut recent: Option<String> = None;

        for chunk in &chunks {
            let leading_owner = if chunk.continuation { owner.clone() } else { None };

            let mut context = ctx.prompt_context(chunk.index, chunks.len());
            context.analysis = analysis.map(|a| a.to_string());
            context.recent_translation = recent.clone();
            context.overlap = chunk.overlap_context.as_deref().map(strip_markers);

            let result = self
                .translate_chunk(ctx, chunk, &context, &options, use_structured, leading_owner, &mut tokens_used)
                .await;

            if result.is_success() {
                recent = Some(tail_chars(&strip_markers(&result.translated), ctx.config.recent_context_chars))
                    .filter(|r| !r.is_empty());
            }
            owner = last_marker(&chunk.content, owner);
            results.push(result);

            progress(chunk.index + 1, chunks.len());
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed == results.len() {
            let last_error = results
                .iter()
                .rev()
                .find_map(|r| r.error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            error!("Translation failed for all {} chunk(s): {}", results.len(), last_error);
            return StageResult::failure(
                StageKind::Translate,
                format!("All {} chunk(s) failed: {}", results.len(), last_error),
                tokens_used,
                start.elapsed(),
            );
        }

        if failed > 0 {
            warn!("{} of {} chunk(s) failed and hold error placeholders", failed, results.len());
        }

        let draft = TranslationDraft {
            original_text: strip_markers(tagged_text),
            translated_text: assemble_text(&results),
            chunk_results: results,
        };

        StageResult::success(StageKind::Translate, draft, tokens_used, start.elapsed())
    }

    /// Translate one chunk, structured first when allowed, then free text.
    #[allow(clippy::too_many_arguments)]
    async fn translate_chunk(
        &self,
        ctx: &StageContext<'_>,
        chunk: &Chunk,
        context: &PromptContext,
        options: &CompletionOptions,
        use_structured: bool,
        leading_owner: Option<String>,
        tokens_used: &mut u64,
    ) -> ChunkTranslation {
        let expected = MarkerTagger::marker_ids(&chunk.content);
        let mut result = ChunkTranslation {
            chunk_id: chunk.id.clone(),
            index: chunk.index,
            original: chunk.content.clone(),
            translated: String::new(),
            paragraphs: Vec::new(),
            source_paragraphs: chunk.paragraph_count,
            continuation: chunk.continuation,
            leading_owner,
            structured: false,
            error: None,
        };

        // A chunk without markers is the tail of a split paragraph; JSON ids would be meaningless
        if use_structured && !expected.is_empty() && !chunk.continuation {
            let messages = ctx.prompts.translation_messages(&chunk.content, context, true);
            match self.translate_structured(&messages, options, &expected, tokens_used).await {
                Ok((text, paragraphs)) => {
                    result.translated = text;
                    result.paragraphs = paragraphs;
                    result.structured = true;
                    return result;
                }
                Err(reason) => {
                    warn!("Structured output rejected for {}: {}; falling back to text", chunk.id, reason);
                }
            }
        }

        let messages = ctx.prompts.translation_messages(&chunk.content, context, false);
        match self.translate_text(&messages, options, tokens_used).await {
            Ok(text) => {
                let recovered = recover_paragraphs(&text, result.leading_owner.as_deref());
                if recovered.is_empty() {
                    if !expected.is_empty() {
                        debug!("Markers lost in {}, paragraph identity unavailable", chunk.id);
                    }
                } else if markers_intact(&chunk.content, &recovered, result.leading_owner.as_deref()) {
                    result.paragraphs = recovered;
                } else {
                    warn!("Markers damaged in {}, falling back to positional alignment", chunk.id);
                }
                result.translated = text;
            }
            Err(e) => {
                error!("Translation of {} failed: {}", chunk.id, e);
                result.translated = error_placeholder(&e.to_string());
                result.error = Some(e.to_string());
            }
        }

        result
    }

    async fn translate_structured(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        expected: &[String],
        tokens_used: &mut u64,
    ) -> Result<(String, Vec<ParagraphTranslation>), String> {
        let completion = self
            .provider
            .complete_json_as::<StructuredTranslation>(messages, options)
            .await
            .map_err(|e| e.to_string())?;
        *tokens_used += completion.tokens_used;

        validate_structured(&completion.data, expected)
    }

    async fn translate_text(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        tokens_used: &mut u64,
    ) -> Result<String, ProviderError> {
        let completion = self.provider.complete(messages, options).await?;
        *tokens_used += completion.tokens_used;

        let text = completion.content.trim().to_string();
        if !is_valid_translation(&strip_markers(&text)) {
            return Err(ProviderError::ParseError("Empty translation response".to_string()));
        }

        Ok(text)
    }
}

/// Whether recovered paragraphs line up with the markers of `source`.
///
/// Every source marker must come back, no unknown marker may appear, and no
/// segment may hold more blank-line blocks than its source paragraph. A
/// dropped marker otherwise hands its paragraph's text to the one before it.
fn markers_intact(source: &str, recovered: &[ParagraphTranslation], leading_owner: Option<&str>) -> bool {
    let source_blocks: HashMap<String, usize> = recover_paragraphs(source, leading_owner)
        .into_iter()
        .map(|p| {
            let blocks = split_paragraphs(&p.text).len();
            (p.marker_id, blocks)
        })
        .collect();

    let all_present = source_blocks
        .keys()
        .all(|id| recovered.iter().any(|p| &p.marker_id == id));

    all_present
        && recovered.iter().all(|p| {
            source_blocks
                .get(&p.marker_id)
                .is_some_and(|&blocks| split_paragraphs(&p.text).len() <= blocks.max(1))
        })
}
