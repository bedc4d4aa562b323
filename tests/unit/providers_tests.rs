/*!
 * Tests for provider construction, caching and request policy
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use yantwai::app_config::{ProviderConfig, TranslationConfig, TranslationProvider};
use yantwai::errors::ProviderError;
use yantwai::providers::factory::{ConfigProviderFactory, ProviderFactory};
use yantwai::providers::mock::MockProvider;
use yantwai::providers::{
    error_for_status, ChatMessage, CompletionOptions, ProviderCache, ProviderHandle, RequestPolicy,
};

fn config_with_anthropic_editor(api_key: &str) -> TranslationConfig {
    let mut config = TranslationConfig::default();
    config.stage_providers.edit = Some(TranslationProvider::Anthropic);
    config.available_providers = vec![
        ProviderConfig::new(TranslationProvider::Ollama),
        ProviderConfig {
            api_key: api_key.to_string(),
            ..ProviderConfig::new(TranslationProvider::Anthropic)
        },
    ];
    config
}

#[test]
fn test_factory_withStageOverride_shouldMixCapabilities() {
    let factory = ConfigProviderFactory::new(config_with_anthropic_editor("sk-test"));

    let providers = factory.build("novel").unwrap();

    assert!(providers.translate.supports_json());
    assert!(providers.analyze.supports_json());
    assert!(!providers.edit.supports_json());
}

#[test]
fn test_factory_withMissingApiKey_shouldFailBeforeAnyRequest() {
    let factory = ConfigProviderFactory::new(config_with_anthropic_editor(""));

    let result = factory.build("novel");

    assert!(matches!(result, Err(ProviderError::AuthenticationError(_))));
}

#[test]
fn test_providerCache_withFailedBuild_shouldNotCache() {
    let cache = ProviderCache::new();
    let factory = ConfigProviderFactory::new(config_with_anthropic_editor(""));

    let first = cache.get_or_try_insert("novel", || factory.build("novel"));

    assert!(first.is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_errorForStatus_shouldClassifyStatusCodes() {
    assert!(matches!(
        error_for_status(401, "bad key".to_string()),
        ProviderError::AuthenticationError(_)
    ));
    assert!(matches!(
        error_for_status(429, "slow down".to_string()),
        ProviderError::RateLimitExceeded(_)
    ));
    assert!(matches!(
        error_for_status(502, "gateway".to_string()),
        ProviderError::ApiError { status_code: 502, .. }
    ));
}

#[tokio::test]
async fn test_requestPolicy_shouldRetryOnlyTransientErrors() {
    let policy = RequestPolicy::new(2, 1, None);
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let result: Result<(), ProviderError> = policy
        .run("mock", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::ConnectionError("refused".to_string()))
            }
        })
        .await;
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    attempts.store(0, Ordering::SeqCst);
    let counter = attempts.clone();
    let result: Result<(), ProviderError> = policy
        .run("mock", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::AuthenticationError("bad key".to_string()))
            }
        })
        .await;
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_textOnlyHandle_completeJson_shouldBeUnsupportedWithoutRequest() {
    let mock = MockProvider::working();
    let handle = ProviderHandle::text_only(mock.clone());
    let messages = vec![ChatMessage::user("Hello.")];

    let result = tokio_test::block_on(handle.complete_json(&messages, &CompletionOptions::new(0.3, 512)));

    assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    assert_eq!(mock.request_count(), 0);
}

#[test]
fn test_requestPolicy_backoff_shouldDoubleAndSaturate() {
    let policy = RequestPolicy::new(3, 1000, None);
    let huge = RequestPolicy::new(3, u64::MAX / 2, None);

    assert_eq!(policy.backoff_for(1), Duration::from_millis(1000));
    assert_eq!(policy.backoff_for(3), Duration::from_millis(4000));
    assert_eq!(huge.backoff_for(10), Duration::from_millis(u64::MAX));
}
