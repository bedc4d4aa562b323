/*!
 * Tests for error types and conversions
 */

use yantwai::errors::{AppError, ChunkError, PipelineError, ProviderError, StoreError};

#[test]
fn test_providerError_apiError_shouldDisplayStatusAndMessage() {
    let error = ProviderError::ApiError {
        status_code: 429,
        message: "Too many requests".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("429"));
    assert!(display.contains("Too many requests"));
}

#[test]
fn test_chunkError_nonContiguous_shouldNameBothIndices() {
    let error = ChunkError::NonContiguous { expected: 2, found: 4 };
    let display = error.to_string();
    assert!(display.contains("expected index 2"));
    assert!(display.contains("found 4"));
}

#[test]
fn test_pipelineError_missingCapability_shouldNameStage() {
    let error = PipelineError::MissingCapability {
        stage: "translate".to_string(),
        capability: "structured output".to_string(),
    };
    assert_eq!(
        error.to_string(),
        "Provider for stage 'translate' does not support structured output"
    );
}

#[test]
fn test_pipelineError_fromChunkError_shouldWrap() {
    let error: PipelineError = ChunkError::EmptyResult.into();
    assert!(matches!(error, PipelineError::Chunking(ChunkError::EmptyResult)));
}

#[test]
fn test_appError_conversions_shouldKeepSource() {
    let provider: AppError = ProviderError::ConnectionError("refused".to_string()).into();
    assert!(provider.to_string().contains("refused"));

    let store: AppError = StoreError::AlreadyTranslating("ch1".to_string()).into();
    assert!(matches!(store, AppError::Store(StoreError::AlreadyTranslating(_))));

    let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.txt").into();
    assert!(matches!(io, AppError::File(_)));
}

#[test]
fn test_storeError_fromAnyhow_shouldBecomeBackendError() {
    let error: StoreError = anyhow::anyhow!("disk full").context("saving chapter").into();
    match error {
        StoreError::Backend(message) => {
            assert!(message.contains("saving chapter"));
            assert!(message.contains("disk full"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
