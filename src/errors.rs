/*!
 * Error types for the yantwai application.
 *
 * One enum per layer: providers, chunking, pipeline, chapter store and the
 * chapter service. `AppError` is what the binary reports.
 */

use thiserror::Error;

/// Failures talking to an LLM backend
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Request could not be completed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Body did not have the expected shape
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Non-success HTTP status
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        status_code: u16,
        /// Response body or reason
        message: String,
    },

    /// Backend unreachable
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// HTTP 429
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Missing or rejected credentials
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The provider lacks a capability the caller asked for
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Errors produced while splitting or merging chunks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Chunker options cannot produce any chunk
    #[error("Invalid chunker configuration: {0}")]
    InvalidConfig(String),

    /// Chunk indices do not form a contiguous 0..n-1 run
    #[error("Chunk indices are not contiguous: expected index {expected}, found {found}")]
    NonContiguous {
        /// Index the merge expected next
        expected: usize,
        /// Index actually present at that position
        found: usize,
    },

    /// Every chunk was empty
    #[error("Merged result is empty")]
    EmptyResult,
}

/// Errors raised while building or running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage provider lacks a method the configuration requires
    #[error("Provider for stage '{stage}' does not support {capability}")]
    MissingCapability {
        /// Stage name
        stage: String,
        /// Missing capability
        capability: String,
    },

    /// Pipeline settings are unusable
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Chunking failed
    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkError),
}

/// Errors from the chapter store and chapter lifecycle operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// No chapter with this id in the project
    #[error("Chapter not found: {project_id}/{chapter_id}")]
    ChapterNotFound {
        /// Project id
        project_id: String,
        /// Chapter id
        chapter_id: String,
    },

    /// No paragraph with this id in the chapter
    #[error("Paragraph not found: {0}")]
    ParagraphNotFound(String),

    /// A translation run is already in flight for this chapter
    #[error("Chapter {0} is already being translated")]
    AlreadyTranslating(String),

    /// Failure inside the storage backend
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Top-level error of the command line tool
#[derive(Error, Debug)]
pub enum AppError {
    /// Filesystem failure
    #[error("File error: {0}")]
    File(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from chunking
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Error from chapter storage
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(error: anyhow::Error) -> Self {
        Self::Backend(format!("{:#}", error))
    }
}
