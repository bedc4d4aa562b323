/*!
 * Analysis stage.
 *
 * Before translation the chapter is read once to extract:
 * - Character names and their suggested rendering
 * - Recurring terminology
 * - The narrative voice
 * - A short summary per excerpt
 *
 * The result is rendered into the translate and edit prompts. A failed
 * analysis only degrades those prompts; it never stops the pipeline.
 */

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::errors::ProviderError;
use crate::providers::{extract_json, ChatMessage, CompletionOptions, ProviderHandle};
use crate::translation::chunker::{Chunker, ChunkerConfig};
use crate::translation::markers::strip_markers;

use super::stage::{ChunkProgress, StageContext, StageKind, StageResult};

/// A character noticed by the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterNote {
    /// Name as written in the source
    pub name: String,

    /// Suggested rendering in the target language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering: Option<String>,

    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A term noticed by the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermNote {
    /// Term in the source language
    pub source: String,

    /// Suggested rendering
    #[serde(default)]
    pub target: String,

    /// Usage note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Expected response of one analysis call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisResponse {
    /// Characters in the excerpt
    #[serde(default)]
    pub characters: Vec<CharacterNote>,

    /// Terms in the excerpt
    #[serde(default)]
    pub terms: Vec<TermNote>,

    /// Narrative voice
    #[serde(default)]
    pub style: Option<String>,

    /// Summary of the excerpt
    #[serde(default)]
    pub summary: Option<String>,
}

/// Aggregated analysis of a chapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    /// Characters, first mention wins
    pub characters: Vec<CharacterNote>,

    /// Terms, first mention wins
    pub terms: Vec<TermNote>,

    /// Narrative voice
    pub style: Option<String>,

    /// One summary per analyzed excerpt
    pub summaries: Vec<String>,
}

impl AnalysisData {
    /// Fold one response into the aggregate.
    pub fn absorb(&mut self, response: AnalysisResponse) {
        for character in response.characters {
            let name = character.name.trim();
            if !name.is_empty() && !self.characters.iter().any(|c| c.name == name) {
                self.characters.push(CharacterNote {
                    name: name.to_string(),
                    ..character
                });
            }
        }

        for term in response.terms {
            let source = term.source.trim();
            if !source.is_empty() && !self.terms.iter().any(|t| t.source == source) {
                self.terms.push(TermNote {
                    source: source.to_string(),
                    ..term
                });
            }
        }

        if self.style.is_none() {
            self.style = response.style.filter(|s| !s.trim().is_empty());
        }

        if let Some(summary) = response.summary.filter(|s| !s.trim().is_empty()) {
            self.summaries.push(summary.trim().to_string());
        }
    }

    /// Whether the analysis found anything.
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
            && self.terms.is_empty()
            && self.style.is_none()
            && self.summaries.is_empty()
    }

    /// Render the analysis as prompt context.
    pub fn to_prompt_context(&self) -> String {
        let mut lines = Vec::new();

        if !self.characters.is_empty() {
            lines.push("Characters:".to_string());
            for character in &self.characters {
                let mut line = format!("- {}", character.name);
                if let Some(rendering) = character.rendering.as_deref().filter(|r| !r.is_empty()) {
                    line.push_str(&format!(" → {}", rendering));
                }
                if let Some(description) = character.description.as_deref().filter(|d| !d.is_empty()) {
                    line.push_str(&format!(" ({})", description));
                }
                lines.push(line);
            }
        }

        if !self.terms.is_empty() {
            lines.push("Terms:".to_string());
            for term in &self.terms {
                match term.note.as_deref().filter(|n| !n.is_empty()) {
                    Some(note) => lines.push(format!("- {} → {} ({})", term.source, term.target, note)),
                    None => lines.push(format!("- {} → {}", term.source, term.target)),
                }
            }
        }

        if let Some(style) = &self.style {
            lines.push(format!("Style: {}", style));
        }

        if !self.summaries.is_empty() {
            lines.push(format!("Summary: {}", self.summaries.join(" ")));
        }

        lines.join("\n")
    }

    /// Get a short description of the analysis.
    pub fn description(&self) -> String {
        format!(
            "{} characters, {} terms, {} summaries",
            self.characters.len(),
            self.terms.len(),
            self.summaries.len()
        )
    }
}

/// Stage 1: chapter analysis
#[derive(Debug, Clone)]
pub struct AnalyzeStage {
    provider: ProviderHandle,
}

impl AnalyzeStage {
    /// Create the stage over a provider.
    pub fn new(provider: ProviderHandle) -> Self {
        Self { provider }
    }

    /// Analyze `source_text` chunk by chunk.
    ///
    /// Fails only when every chunk fails; partial analyses are kept.
    pub async fn run(
        &self,
        ctx: &StageContext<'_>,
        source_text: &str,
        progress: ChunkProgress<'_>,
    ) -> StageResult<AnalysisData> {
        let start = Instant::now();
        let plain = strip_markers(source_text);

        let chunker = Chunker::new(
            ChunkerConfig::with_max_tokens(ctx.config.analysis_max_tokens)
                .with_overlap(0)
                .with_preserve_paragraphs(ctx.config.chunker.preserve_paragraphs),
        );
        let chunks = match chunker.chunk(&plain) {
            Ok(chunks) => chunks,
            Err(e) => return StageResult::failure(StageKind::Analyze, e.to_string(), 0, start.elapsed()),
        };

        let mut data = AnalysisData::default();
        let mut tokens_used = 0u64;
        let mut failures = 0usize;
        let mut last_error = None;
        let options = ctx.completion_options();

        for chunk in &chunks {
            let context = ctx.prompt_context(chunk.index, chunks.len());
            let messages = ctx.prompts.analysis_messages(&chunk.content, &context);

            let response = if self.provider.supports_json() && ctx.config.prefer_structured_output {
                match self.provider.complete_json_as::<AnalysisResponse>(&messages, &options).await {
                    Ok(completion) => {
                        tokens_used += completion.tokens_used;
                        Ok(completion.data)
                    }
                    Err(e) => {
                        debug!("Structured analysis failed for {}: {}, retrying as text", chunk.id, e);
                        self.analyze_as_text(&messages, &options, &mut tokens_used).await
                    }
                }
            } else {
                self.analyze_as_text(&messages, &options, &mut tokens_used).await
            };

            match response {
                Ok(response) => data.absorb(response),
                Err(e) => {
                    warn!("Analysis of {} failed: {}", chunk.id, e);
                    failures += 1;
                    last_error = Some(e.to_string());
                }
            }

            progress(chunk.index + 1, chunks.len());
        }

        if !chunks.is_empty() && failures == chunks.len() {
            return StageResult::failure(
                StageKind::Analyze,
                last_error.unwrap_or_else(|| "analysis failed".to_string()),
                tokens_used,
                start.elapsed(),
            );
        }

        debug!("Analysis complete: {}", data.description());
        StageResult::success(StageKind::Analyze, data, tokens_used, start.elapsed())
    }

    /// Free-text analysis: parse embedded JSON, else keep the text as a summary.
    async fn analyze_as_text(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        tokens_used: &mut u64,
    ) -> Result<AnalysisResponse, ProviderError> {
        let completion = self.provider.complete(messages, options).await?;
        *tokens_used += completion.tokens_used;

        if let Some(parsed) = extract_json(&completion.content)
            .and_then(|json| serde_json::from_str::<AnalysisResponse>(&json).ok())
        {
            return Ok(parsed);
        }

        let summary = completion.content.trim();
        if summary.is_empty() {
            return Err(ProviderError::ParseError("Empty analysis response".to_string()));
        }

        Ok(AnalysisResponse {
            summary: Some(summary.to_string()),
            ..Default::default()
        })
    }
}
