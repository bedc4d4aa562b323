/*!
 * Three-stage chapter translation pipeline.
 *
 * The pipeline processes a chapter through three stages:
 * 1. **Analyze**: Extract characters, terminology and narrative voice (skippable)
 * 2. **Translate**: Translate marker-tagged chunks, structured JSON first (mandatory)
 * 3. **Edit**: Polish the draft against the original (skippable)
 *
 * Chunks are processed strictly in order, one provider call at a time.
 */

pub mod analysis_pass;
pub mod edit_pass;
pub mod orchestrator;
pub mod stage;
pub mod translation_pass;

// Re-export types used externally
pub use analysis_pass::{AnalysisData, AnalyzeStage};
pub use edit_pass::{EditChange, EditStage, EditedTranslation};
pub use orchestrator::{
    PipelineConfig, PipelineOptions, PipelineProgress, PipelineResult, PipelineState, ProgressCallback,
    TranslationPipeline,
};
pub use stage::{ChunkTranslation, ParagraphTranslation, StageKind, StageResult};
pub use translation_pass::{TranslateStage, TranslationDraft};
