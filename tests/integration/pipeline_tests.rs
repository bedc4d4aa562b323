/*!
 * Pipeline behavior against misbehaving providers
 */

use std::sync::Arc;

use yantwai::providers::mock::MockProvider;
use yantwai::translation::{
    sync_paragraphs, Glossary, PipelineConfig, PipelineOptions, SyncOptions, SyncStrategy, TranslationPipeline,
};

use crate::common::{fixed_time, init_test_logger, mock_providers, paragraphs, text_only_providers};

fn translate_only(chunk_size: Option<usize>) -> PipelineOptions {
    PipelineOptions {
        skip_analysis: true,
        skip_editing: true,
        chunk_size,
    }
}

#[tokio::test]
async fn test_textOnlyProvider_shouldRunAllStagesWithMarkers() {
    init_test_logger();
    let provider = MockProvider::working();
    let pipeline =
        TranslationPipeline::new(text_only_providers(provider.clone()), PipelineConfig::new("en", "ru")).unwrap();
    let list = paragraphs(&["Hello.", "World."]);

    let result = pipeline
        .translate_paragraphs("Hello.\n\nWorld.", &list, 1, &PipelineOptions::default())
        .await
        .unwrap();
    let outcome = sync_paragraphs(&list, &result.sync_input().unwrap(), &SyncOptions::full());

    assert!(result.success);
    assert!(provider.calls().iter().all(|call| !call.json));
    assert_eq!(outcome.report.strategy, SyncStrategy::ById);
    assert_eq!(outcome.paragraphs[1].translated_text.as_deref(), Some("[TRANSLATED] World."));
}

#[tokio::test]
async fn test_partiallyDroppedMarkers_shouldNotMergeParagraphsIntoOne() {
    let provider = MockProvider::keeping_first_marker();
    let pipeline =
        TranslationPipeline::new(text_only_providers(provider.clone()), PipelineConfig::new("en", "ru")).unwrap();
    let list = paragraphs(&["Hello.", "World."]);

    let result = pipeline
        .translate_paragraphs("Hello.\n\nWorld.", &list, 1, &translate_only(None))
        .await
        .unwrap();
    let draft = result.stage2.data.as_ref().unwrap();
    let outcome = sync_paragraphs(&list, &result.sync_input().unwrap(), &SyncOptions::full().at(fixed_time()));

    assert!(draft.chunk_results[0].translated.contains("--para:p0--"));
    assert!(!draft.chunk_results[0].translated.contains("--para:p1--"));
    assert!(draft.chunk_results[0].paragraphs.is_empty());
    assert_eq!(outcome.report.strategy, SyncStrategy::BySequentialChunk);
    assert_eq!(outcome.paragraphs[0].translated_text.as_deref(), Some("[TRANSLATED] Hello."));
    assert_eq!(outcome.paragraphs[1].translated_text.as_deref(), Some("[TRANSLATED] World."));
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_droppedMarkers_shouldFallBackToSequentialSync() {
    let pipeline =
        TranslationPipeline::new(mock_providers(MockProvider::dropping_markers()), PipelineConfig::new("en", "ru"))
            .unwrap();
    let list = paragraphs(&["Hello.", "***", "World."]);

    let result = pipeline
        .translate_paragraphs("Hello.\n\n***\n\nWorld.", &list, 1, &translate_only(None))
        .await
        .unwrap();
    let outcome = sync_paragraphs(&list, &result.sync_input().unwrap(), &SyncOptions::full().at(fixed_time()));

    assert_eq!(outcome.report.strategy, SyncStrategy::BySequentialChunk);
    assert_eq!(outcome.paragraphs[0].translated_text.as_deref(), Some("[TRANSLATED] Hello."));
    assert_eq!(outcome.paragraphs[1].translated_text, None);
    assert_eq!(outcome.paragraphs[2].translated_text.as_deref(), Some("[TRANSLATED] World."));
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_malformedJson_shouldFallBackToTextPerChunk() {
    let provider = MockProvider::malformed_json();
    let pipeline =
        TranslationPipeline::new(mock_providers(provider.clone()), PipelineConfig::new("en", "ru")).unwrap();
    let list = paragraphs(&["Hello.", "World."]);

    let result = pipeline
        .translate_paragraphs("Hello.\n\nWorld.", &list, 1, &translate_only(None))
        .await
        .unwrap();
    let outcome = sync_paragraphs(&list, &result.sync_input().unwrap(), &SyncOptions::full());

    assert!(result.success);
    assert!(result.final_chunks().iter().all(|chunk| !chunk.structured));
    assert_eq!(provider.request_count(), 2);
    assert_eq!(outcome.report.strategy, SyncStrategy::ById);
    assert_eq!(outcome.report.applied, 2);
}

#[tokio::test]
async fn test_requireStructured_withMalformedJson_shouldStillFallBack() {
    let config = PipelineConfig::new("en", "ru").with_structured_output(true, true);
    let pipeline = TranslationPipeline::new(mock_providers(MockProvider::malformed_json()), config).unwrap();

    let result = pipeline
        .translate_chapter("Hello.", 1, &translate_only(None))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.final_translation, "[TRANSLATED] Hello.");
}

#[tokio::test]
async fn test_intermittentProvider_shouldLeavePlaceholderForFailedChunk() {
    let pipeline =
        TranslationPipeline::new(text_only_providers(MockProvider::intermittent(2)), PipelineConfig::new("en", "ru"))
            .unwrap();
    let list = paragraphs(&["Alpha one.", "Beta two.", "Gamma three."]);

    let result = pipeline
        .translate_paragraphs("Alpha one.\n\nBeta two.\n\nGamma three.", &list, 1, &translate_only(Some(6)))
        .await
        .unwrap();
    let chunks = result.final_chunks();
    let outcome = sync_paragraphs(&list, &result.sync_input().unwrap(), &SyncOptions::full());

    assert!(result.success);
    assert_eq!(chunks.len(), 3);
    assert!(chunks[1].translated.starts_with("[ERROR"));
    assert_eq!(outcome.paragraphs[0].translated_text.as_deref(), Some("[TRANSLATED] Alpha one."));
    assert_eq!(outcome.paragraphs[1].translated_text, None);
    assert_eq!(outcome.paragraphs[2].translated_text.as_deref(), Some("[TRANSLATED] Gamma three."));
    assert_eq!(outcome.report.missing, 1);
}

#[tokio::test]
async fn test_glossary_shouldReachEveryTranslationPrompt() {
    let provider = MockProvider::working();
    let mut glossary = Glossary::new();
    glossary.add_term("sect", "секта", None);
    glossary.add_character("Lin Feng", "Линь Фэн");
    let pipeline = TranslationPipeline::new(mock_providers(provider.clone()), PipelineConfig::new("en", "ru"))
        .unwrap()
        .with_glossary(Arc::new(glossary));

    pipeline
        .translate_chapter("Alpha one.\n\nBeta two.", 1, &translate_only(Some(6)))
        .await
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert!(call.user_prompt().contains("sect → секта"));
        assert!(call.user_prompt().contains("Lin Feng → Линь Фэн"));
    }
}

#[tokio::test]
async fn test_longParagraph_shouldBeRejoinedIntoOneRecord() {
    let sentences: Vec<String> = (0..30).map(|i| format!("Sentence number {} ends here.", i)).collect();
    let paragraph = sentences.join(" ");
    let list = paragraphs(&[paragraph.as_str(), "Short tail."]);
    let source = format!("{}\n\nShort tail.", paragraph);
    let pipeline =
        TranslationPipeline::new(mock_providers(MockProvider::working()), PipelineConfig::new("en", "ru")).unwrap();

    let result = pipeline
        .translate_paragraphs(&source, &list, 1, &translate_only(Some(40)))
        .await
        .unwrap();
    let outcome = sync_paragraphs(&list, &result.sync_input().unwrap(), &SyncOptions::full());

    assert!(result.final_chunks().len() > 2);
    assert!(result.final_chunks().iter().any(|chunk| chunk.continuation));
    assert_eq!(outcome.report.strategy, SyncStrategy::ById);

    let first = outcome.paragraphs[0].translated_text.clone().unwrap();
    let words: Vec<&str> = first.split_whitespace().filter(|w| *w != "[TRANSLATED]").collect();
    assert_eq!(words, paragraph.split_whitespace().collect::<Vec<_>>());
    assert_eq!(outcome.paragraphs[1].translated_text.as_deref(), Some("[TRANSLATED] Short tail."));
}

#[tokio::test]
async fn test_emptyResponses_shouldFailTranslation() {
    let pipeline =
        TranslationPipeline::new(mock_providers(MockProvider::empty()), PipelineConfig::new("en", "ru")).unwrap();

    let result = pipeline
        .translate_chapter("Hello.", 1, &translate_only(None))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.sync_input().is_none());
    assert!(result.final_translation.starts_with("[ERROR] Translation failed"));
}
