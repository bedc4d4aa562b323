/*!
 * Chapter translation core.
 *
 * This module contains everything between a chapter's source text and its
 * updated paragraph list. It is split into several submodules:
 *
 * - `document`: Paragraph and chunk types, validity predicates
 * - `chunker`: Token-bounded chunking and merging
 * - `markers`: Paragraph marker tagging and parsing
 * - `glossary`: Terminology collaborator
 * - `prompts`: Prompt templates and builders for the stages
 * - `pipeline`: Stage executors and the orchestrator
 * - `sync`: Reconciliation of pipeline output with paragraphs
 */

// Re-export main types for easier usage
pub use self::chunker::{merge_chunks, Chunker, ChunkerConfig};
pub use self::document::{Chunk, EditedBy, Paragraph, ParagraphStatus};
pub use self::glossary::{Glossary, GlossarySource};
pub use self::pipeline::{PipelineConfig, PipelineOptions, PipelineResult, TranslationPipeline};
pub use self::sync::{sync_paragraphs, SyncInput, SyncOptions, SyncReport, SyncStrategy};

// Submodules
pub mod chunker;
pub mod document;
pub mod glossary;
pub mod markers;
pub mod pipeline;
pub mod prompts;
pub mod sync;
