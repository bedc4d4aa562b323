/*!
 * # YANTwAI - Yet Another Novel Translator with AI
 *
 * A Rust library for translating novel chapters with LLMs while keeping
 * every paragraph addressable by a stable id.
 *
 * ## Features
 *
 * - Token-bounded chunking that respects paragraphs and sentences
 * - Three-stage pipeline: analysis, translation, editing
 * - Translation providers:
 *   - Ollama (local LLM)
 *   - OpenAI API
 *   - Anthropic API
 *   - LM Studio (OpenAI-compatible)
 * - Structured JSON output when the provider supports it
 * - Paragraph synchronization with id, chunk and whole-text strategies
 * - Partial re-translation that never overwrites reviewed paragraphs
 * - SQLite persistence of chapters and paragraphs
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `translation`: Chunking, markers, prompts, pipeline and synchronization:
 *   - `translation::chunker`: Chunk splitting and merging
 *   - `translation::pipeline`: Stage executors and orchestrator
 *   - `translation::sync`: Paragraph synchronization engine
 * - `chapter`: Chapter records, storage contract and lifecycle service
 * - `database`: SQLite chapter store
 * - `language_utils`: ISO language code utilities
 * - `providers`: Client implementations for various LLM providers:
 *   - `providers::ollama`: Ollama API client
 *   - `providers::openai`: OpenAI API client
 *   - `providers::anthropic`: Anthropic API client
 *   - `providers::mock`: Scripted provider for tests
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod chapter;
pub mod database;
pub mod errors;
pub mod language_utils;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use chapter::{Chapter, ChapterService, ChapterStatus, ChapterStore, TranslationRequest};
pub use errors::{AppError, ChunkError, PipelineError, ProviderError, StoreError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use translation::{
    sync_paragraphs, Chunker, ChunkerConfig, Paragraph, ParagraphStatus, PipelineConfig, PipelineOptions,
    SyncInput, SyncOptions, SyncStrategy, TranslationPipeline,
};
