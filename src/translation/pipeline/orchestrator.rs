/*!
 * Pipeline orchestrator for coordinating the translation stages.
 *
 * The orchestrator drives a small state machine:
 * `Analyze -> Translate -> Edit -> Done`, with `Failed` reachable from
 * `Translate` only.
 * - Analyze may be skipped; its failure only degrades later prompts.
 * - Translate is mandatory; its failure ends the run with an error string
 *   as the final translation.
 * - Edit may be skipped; its failure falls back to the translation draft.
 */

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::PipelineError;
use crate::providers::StageProviders;
use crate::translation::chunker::{Chunker, ChunkerConfig};
use crate::translation::document::{split_paragraphs, Paragraph};
use crate::translation::glossary::GlossarySource;
use crate::translation::markers::{MarkerTagger, TaggedSource};
use crate::translation::prompts::PromptBuilder;
use crate::translation::sync::SyncInput;

use super::analysis_pass::{AnalysisData, AnalyzeStage};
use super::edit_pass::{EditStage, EditedTranslation};
use super::stage::{ChunkTranslation, StageContext, StageResult};
use super::translation_pass::{TranslateStage, TranslationDraft};

/// Configuration for the translation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Source language code
    pub source_language: String,

    /// Target language code
    pub target_language: String,

    /// Chunking for the translate stage
    pub chunker: ChunkerConfig,

    /// Token budget of one analysis call
    pub analysis_max_tokens: usize,

    /// Ask JSON-capable providers for structured output
    pub prefer_structured_output: bool,

    /// Refuse to build the pipeline over a text-only translate provider
    pub require_structured_output: bool,

    /// Characters of the previous chunk's translation passed as context
    pub recent_context_chars: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Output budget of one call
    pub max_output_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_language: "en".to_string(),
            target_language: "ru".to_string(),
            chunker: ChunkerConfig::default(),
            analysis_max_tokens: 4000,
            prefer_structured_output: true,
            require_structured_output: false,
            recent_context_chars: 600,
            temperature: 0.3,
            max_output_tokens: 4096,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline configuration.
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            ..Default::default()
        }
    }

    /// Set the chunk token budget.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.chunker.max_tokens = max_tokens;
        self
    }

    /// Set the chunker options.
    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    /// Set the structured output policy.
    pub fn with_structured_output(mut self, prefer: bool, require: bool) -> Self {
        self.prefer_structured_output = prefer;
        self.require_structured_output = require;
        self
    }
}

/// Per-run options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Do not run the analysis stage
    pub skip_analysis: bool,

    /// Do not run the editing stage
    pub skip_editing: bool,

    /// Override the chunk token budget for this run
    pub chunk_size: Option<usize>,
}

/// State of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Analyzing the chapter
    Analyze,
    /// Translating
    Translate,
    /// Editing the draft
    Edit,
    /// Finished with a translation
    Done,
    /// Translation failed
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Analyze => write!(f, "analyze"),
            PipelineState::Translate => write!(f, "translate"),
            PipelineState::Edit => write!(f, "edit"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// Progress information during pipeline execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineProgress {
    /// Current state
    pub state: PipelineState,

    /// Chunks finished in the current stage
    pub chunks_done: usize,

    /// Chunks in the current stage
    pub chunks_total: usize,
}

impl PipelineProgress {
    /// Progress within the current stage (0.0 - 1.0)
    pub fn stage_fraction(&self) -> f32 {
        if self.chunks_total == 0 {
            0.0
        } else {
            self.chunks_done as f32 / self.chunks_total as f32
        }
    }

    /// Overall progress (0.0 - 1.0)
    pub fn overall_fraction(&self) -> f32 {
        let fraction = self.stage_fraction();
        match self.state {
            PipelineState::Analyze => fraction * 0.1,
            PipelineState::Translate => 0.1 + fraction * 0.7,
            PipelineState::Edit => 0.8 + fraction * 0.2,
            PipelineState::Done | PipelineState::Failed => 1.0,
        }
    }
}

/// Progress callback
pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

/// Result of the complete pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Analysis stage, when it ran
    pub stage1: Option<StageResult<AnalysisData>>,

    /// Translation stage
    pub stage2: StageResult<TranslationDraft>,

    /// Editing stage, when it ran
    pub stage3: Option<StageResult<EditedTranslation>>,

    /// Tokens used by every stage
    pub total_tokens: u64,

    /// Wall time of the run
    pub total_duration: Duration,

    /// Final text, or an `[ERROR] ...` string when translation failed
    pub final_translation: String,

    /// Whether the run produced a translation
    pub success: bool,

    /// Terminal state
    pub state: PipelineState,

    /// Markers the source was tagged with
    pub markers: TaggedSource,
}

impl PipelineResult {
    /// Chunk results of the last successful text-producing stage.
    pub fn final_chunks(&self) -> &[ChunkTranslation] {
        if let Some(edited) = self.stage3.as_ref().and_then(|s| s.output()) {
            return &edited.chunk_results;
        }
        match self.stage2.output() {
            Some(draft) => &draft.chunk_results,
            None => &[],
        }
    }

    /// Input for the synchronization engine; `None` when translation failed.
    pub fn sync_input(&self) -> Option<SyncInput> {
        if !self.success {
            return None;
        }

        Some(SyncInput {
            markers: self.markers.clone(),
            chunks: self.final_chunks().to_vec(),
            full_text: self.final_translation.clone(),
        })
    }

    /// Get the editor's quality score, if the edit stage reported one.
    pub fn quality_score(&self) -> Option<f32> {
        self.stage3
            .as_ref()
            .and_then(|s| s.output())
            .and_then(|e| e.quality_score)
    }

    /// Get a summary of the pipeline result.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        parts.push(format!("Duration: {:.2}s", self.total_duration.as_secs_f32()));
        parts.push(format!("Tokens: {}", self.total_tokens));

        if let Some(ref stage1) = self.stage1 {
            match stage1.output() {
                Some(analysis) => parts.push(format!("Analysis: {}", analysis.description())),
                None => parts.push("Analysis: failed".to_string()),
            }
        }

        if let Some(draft) = self.stage2.output() {
            parts.push(format!(
                "Translation: {} chunk(s), {} failed",
                draft.chunk_results.len(),
                draft.failed_chunks()
            ));
        }

        if let Some(ref stage3) = self.stage3 {
            match (stage3.success, self.quality_score()) {
                (true, Some(score)) => parts.push(format!("Edit: {:.1}% quality score", score * 100.0)),
                (true, None) => parts.push("Edit: done".to_string()),
                (false, _) => parts.push("Edit: failed, draft kept".to_string()),
            }
        }

        if !self.success {
            if let Some(ref error) = self.stage2.error {
                parts.push(format!("Error: {}", error));
            }
        }

        parts.join(" | ")
    }
}

/// The main translation pipeline orchestrator.
pub struct TranslationPipeline {
    config: PipelineConfig,
    prompts: PromptBuilder,
    analyze: AnalyzeStage,
    translate: TranslateStage,
    edit: EditStage,
    glossary: Option<Arc<dyn GlossarySource>>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for TranslationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationPipeline")
            .field("config", &self.config)
            .field("glossary", &self.glossary)
            .finish_non_exhaustive()
    }
}

impl TranslationPipeline {
    /// Create a pipeline over the stage providers.
    ///
    /// Fails fast when the configuration cannot work with these providers.
    pub fn new(providers: StageProviders, config: PipelineConfig) -> Result<Self, PipelineError> {
        if config.chunker.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk max_tokens must be greater than zero".to_string(),
            ));
        }
        if config.analysis_max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "analysis_max_tokens must be greater than zero".to_string(),
            ));
        }
        if config.require_structured_output && !providers.translate.supports_json() {
            return Err(PipelineError::MissingCapability {
                stage: "translate".to_string(),
                capability: format!("structured output ({} is text-only)", providers.translate.name()),
            });
        }

        Ok(Self {
            prompts: PromptBuilder::new(&config.source_language, &config.target_language),
            analyze: AnalyzeStage::new(providers.analyze),
            translate: TranslateStage::new(providers.translate),
            edit: EditStage::new(providers.edit),
            config,
            glossary: None,
            progress: None,
        })
    }

    /// Inject terminology into every stage prompt.
    pub fn with_glossary(mut self, glossary: Arc<dyn GlossarySource>) -> Self {
        self.glossary = Some(glossary);
        self
    }

    /// Report progress after every chunk.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Get the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Translate a chapter that has no stored paragraph records.
    ///
    /// Paragraphs get positional ids `p0`, `p1`, ... for marker correlation.
    pub async fn translate_chapter(
        &self,
        source_text: &str,
        chapter_number: u32,
        options: &PipelineOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let paragraphs: Vec<Paragraph> = split_paragraphs(source_text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Paragraph::new(format!("p{}", index), index, text))
            .collect();

        self.translate_paragraphs(source_text, &paragraphs, chapter_number, options)
            .await
    }

    /// Translate `source_text`, tagging it with the ids of `paragraphs`.
    ///
    /// Only configuration problems are errors; stage failures are reported
    /// inside the result.
    pub async fn translate_paragraphs(
        &self,
        source_text: &str,
        paragraphs: &[Paragraph],
        chapter_number: u32,
        options: &PipelineOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let start = Instant::now();

        let mut chunker_config = self.config.chunker;
        if let Some(chunk_size) = options.chunk_size {
            if chunk_size == 0 {
                return Err(PipelineError::InvalidConfig(
                    "chunk_size must be greater than zero".to_string(),
                ));
            }
            chunker_config.max_tokens = chunk_size;
        }
        let chunker = Chunker::new(chunker_config);

        let markers = MarkerTagger::tag(paragraphs, source_text);
        let glossary = self
            .glossary
            .as_ref()
            .map(|g| g.to_prompt_text())
            .filter(|text| !text.trim().is_empty());
        let ctx = StageContext {
            config: &self.config,
            prompts: &self.prompts,
            glossary: glossary.as_deref(),
            chapter_number,
        };

        info!(
            "Starting pipeline for chapter {} ({} paragraph(s), analysis {}, editing {})",
            chapter_number,
            markers.assignments.len(),
            if options.skip_analysis { "skipped" } else { "on" },
            if options.skip_editing { "skipped" } else { "on" }
        );

        let mut stage1: Option<StageResult<AnalysisData>> = None;
        let mut stage2: Option<StageResult<TranslationDraft>> = None;
        let mut stage3: Option<StageResult<EditedTranslation>> = None;
        let mut analysis_text: Option<String> = None;

        let mut state = if options.skip_analysis {
            PipelineState::Translate
        } else {
            PipelineState::Analyze
        };

        loop {
            let current = state;
            let on_chunk = move |done: usize, total: usize| self.notify(current, done, total);

            state = match state {
                PipelineState::Analyze => {
                    let result = self.analyze.run(&ctx, &markers.text, &on_chunk).await;
                    match result.output() {
                        Some(analysis) if !analysis.is_empty() => {
                            analysis_text = Some(analysis.to_prompt_context());
                        }
                        Some(_) => {}
                        None => warn!(
                            "Analysis failed, continuing without it: {}",
                            result.error.as_deref().unwrap_or("unknown error")
                        ),
                    }
                    stage1 = Some(result);
                    PipelineState::Translate
                }
                PipelineState::Translate => {
                    let result = self
                        .translate
                        .run(&ctx, &markers.text, &chunker, analysis_text.as_deref(), &on_chunk)
                        .await;
                    let next = if !result.success {
                        PipelineState::Failed
                    } else if options.skip_editing {
                        PipelineState::Done
                    } else {
                        PipelineState::Edit
                    };
                    stage2 = Some(result);
                    next
                }
                PipelineState::Edit => {
                    if let Some(draft) = stage2.as_ref().and_then(|s| s.output()) {
                        let result = self.edit.run(&ctx, draft, analysis_text.as_deref(), &on_chunk).await;
                        if !result.success {
                            warn!(
                                "Editing failed, keeping the draft: {}",
                                result.error.as_deref().unwrap_or("unknown error")
                            );
                        }
                        stage3 = Some(result);
                    }
                    PipelineState::Done
                }
                PipelineState::Done | PipelineState::Failed => break,
            };
        }

        let stage2 = match stage2 {
            Some(stage2) => stage2,
            None => return Err(PipelineError::InvalidConfig("translate stage did not run".to_string())),
        };

        let final_translation = match (state, stage3.as_ref().and_then(|s| s.output()), stage2.output()) {
            (PipelineState::Failed, _, _) => {
                let reason = stage2.error.as_deref().unwrap_or("unknown error");
                error!("Translation of chapter {} failed: {}", chapter_number, reason);
                format!("[ERROR] Translation failed: {}", reason)
            }
            (_, Some(edited), _) => edited.final_text.clone(),
            (_, None, Some(draft)) => draft.translated_text.clone(),
            (_, None, None) => String::new(),
        };

        let total_tokens = stage1.as_ref().map_or(0, |s| s.tokens_used)
            + stage2.tokens_used
            + stage3.as_ref().map_or(0, |s| s.tokens_used);

        self.notify(state, 1, 1);

        let result = PipelineResult {
            stage1,
            success: state == PipelineState::Done,
            stage2,
            stage3,
            total_tokens,
            total_duration: start.elapsed(),
            final_translation,
            state,
            markers,
        };

        info!("Pipeline finished for chapter {}: {}", chapter_number, result.summary());
        Ok(result)
    }

    fn notify(&self, state: PipelineState, chunks_done: usize, chunks_total: usize) {
        if let Some(callback) = &self.progress {
            callback(PipelineProgress {
                state,
                chunks_done,
                chunks_total,
            });
        }
    }
}
