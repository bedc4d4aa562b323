/*!
 * Editing stage.
 *
 * Each successful draft chunk is sent back with its original for a polish
 * pass. An edit is only accepted when it keeps exactly the draft's paragraph
 * markers, in order, and its number of blank-line blocks. Anything else
 * keeps the draft chunk, so editing can never cost a paragraph its identity,
 * whether that identity rests on markers or on position.
 */

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::errors::ProviderError;
use crate::providers::{ChatMessage, CompletionOptions, ProviderHandle};
use crate::translation::document::{is_valid_translation, split_paragraphs};
use crate::translation::markers::{strip_markers, MarkerTagger};

use super::stage::{recover_paragraphs, ChunkProgress, ChunkTranslation, StageContext, StageKind, StageResult};
use super::translation_pass::{assemble_text, TranslationDraft};

/// One change reported by the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditChange {
    /// Text before the edit
    #[serde(default)]
    pub original: String,

    /// Text after the edit
    #[serde(default)]
    pub edited: String,

    /// Why the editor changed it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Expected structured edit response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditResponse {
    /// Full edited text, markers included
    #[serde(default)]
    pub edited: String,

    /// Changes made
    #[serde(default)]
    pub changes: Vec<EditChange>,

    /// Self-assessed quality between 0 and 1
    #[serde(default)]
    pub quality_score: Option<f32>,
}

/// Output of the editing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditedTranslation {
    /// Edited text, markers stripped
    pub final_text: String,

    /// Changes across all chunks
    pub changes: Vec<EditChange>,

    /// Mean quality score over the chunks that reported one
    pub quality_score: Option<f32>,

    /// Per-chunk results; unedited chunks are the draft's
    pub chunk_results: Vec<ChunkTranslation>,
}

/// Whether an edit can replace the draft chunk.
fn accept_edit(draft: &str, edited: &str) -> Result<(), String> {
    if !is_valid_translation(&strip_markers(edited)) {
        return Err("empty edit".to_string());
    }

    let expected = MarkerTagger::marker_ids(draft);
    let found = MarkerTagger::marker_ids(edited);
    if expected != found {
        return Err(format!(
            "paragraph markers changed ({} expected, {} returned)",
            expected.len(),
            found.len()
        ));
    }

    // Positional alignment depends on the block count when markers are gone
    let draft_blocks = split_paragraphs(&strip_markers(draft)).len();
    let edited_blocks = split_paragraphs(&strip_markers(edited)).len();
    if draft_blocks != edited_blocks {
        return Err(format!(
            "paragraph count changed ({} expected, {} returned)",
            draft_blocks, edited_blocks
        ));
    }

    Ok(())
}

/// Stage 3: post-editing
#[derive(Debug, Clone)]
pub struct EditStage {
    provider: ProviderHandle,
}

impl EditStage {
    /// Create the stage over a provider.
    pub fn new(provider: ProviderHandle) -> Self {
        Self { provider }
    }

    /// Edit a translation draft chunk by chunk.
    ///
    /// Fails when no chunk could be edited; the caller then keeps the draft.
    pub async fn run(
        &self,
        ctx: &StageContext<'_>,
        draft: &TranslationDraft,
        analysis: Option<&str>,
        progress: ChunkProgress<'_>,
    ) -> StageResult<EditedTranslation> {
        let start = Instant::now();
        let total = draft.chunk_results.len();
        let options = ctx.completion_options();
        let use_structured = self.provider.supports_json() && ctx.config.prefer_structured_output;

        let mut chunk_results = Vec::with_capacity(total);
        let mut changes = Vec::new();
        let mut scores = Vec::new();
        let mut tokens_used = 0u64;
        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut last_error = None;

        for draft_chunk in &draft.chunk_results {
            if !draft_chunk.is_success() {
                chunk_results.push(draft_chunk.clone());
                progress(draft_chunk.index + 1, total);
                continue;
            }
            attempted += 1;

            let mut context = ctx.prompt_context(draft_chunk.index, total);
            context.analysis = analysis.map(|a| a.to_string());

            let original = strip_markers(&draft_chunk.original);
            let mut edited = None;

            if use_structured {
                let messages = ctx.prompts.edit_messages(&original, &draft_chunk.translated, &context, true);
                match self.edit_structured(&messages, &options, &mut tokens_used).await {
                    Ok(response) => match accept_edit(&draft_chunk.translated, &response.edited) {
                        Ok(()) => {
                            changes.extend(response.changes);
                            scores.extend(response.quality_score);
                            edited = Some(response.edited);
                        }
                        Err(reason) => debug!("Structured edit of {} rejected: {}", draft_chunk.chunk_id, reason),
                    },
                    Err(e) => debug!("Structured edit of {} failed: {}", draft_chunk.chunk_id, e),
                }
            }

            if edited.is_none() {
                let messages = ctx.prompts.edit_messages(&original, &draft_chunk.translated, &context, false);
                match self.edit_text(&messages, &options, &mut tokens_used).await {
                    Ok(text) => match accept_edit(&draft_chunk.translated, &text) {
                        Ok(()) => edited = Some(text),
                        Err(reason) => last_error = Some(reason),
                    },
                    Err(e) => last_error = Some(e.to_string()),
                }
            }

            match edited {
                Some(text) => {
                    let mut chunk = draft_chunk.clone();
                    if !chunk.paragraphs.is_empty() {
                        chunk.paragraphs = recover_paragraphs(&text, chunk.leading_owner.as_deref());
                    }
                    chunk.translated = text;
                    chunk_results.push(chunk);
                }
                None => {
                    warn!(
                        "Keeping draft for {}: {}",
                        draft_chunk.chunk_id,
                        last_error.as_deref().unwrap_or("edit rejected")
                    );
                    failed += 1;
                    chunk_results.push(draft_chunk.clone());
                }
            }

            progress(draft_chunk.index + 1, total);
        }

        if attempted > 0 && failed == attempted {
            return StageResult::failure(
                StageKind::Edit,
                last_error.unwrap_or_else(|| "no chunk could be edited".to_string()),
                tokens_used,
                start.elapsed(),
            );
        }

        let quality_score = (!scores.is_empty()).then(|| scores.iter().sum::<f32>() / scores.len() as f32);
        let edited = EditedTranslation {
            final_text: assemble_text(&chunk_results),
            changes,
            quality_score,
            chunk_results,
        };

        StageResult::success(StageKind::Edit, edited, tokens_used, start.elapsed())
    }

    async fn edit_structured(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        tokens_used: &mut u64,
    ) -> Result<EditResponse, ProviderError> {
        let completion = self.provider.complete_json_as::<EditResponse>(messages, options).await?;
        *tokens_used += completion.tokens_used;
        Ok(completion.data)
    }

    async fn edit_text(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        tokens_used: &mut u64,
    ) -> Result<String, ProviderError> {
        let completion = self.provider.complete(messages, options).await?;
        *tokens_used += completion.tokens_used;
        Ok(completion.content.trim().to_string())
    }
}
