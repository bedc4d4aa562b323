/*!
 * End-to-end checks of the documented chunk, pipeline and sync scenarios
 */

use yantwai::providers::mock::MockProvider;
use yantwai::providers::{ProviderHandle, StageProviders};
use yantwai::translation::pipeline::PipelineState;
use yantwai::translation::{
    sync_paragraphs, Chunker, ChunkerConfig, ParagraphStatus, PipelineConfig, PipelineOptions, SyncInput,
    SyncOptions, SyncStrategy, TranslationPipeline,
};

use crate::common::{fixed_time, mock_providers, paragraphs};

#[test]
fn test_scenarioA_singleChunk_shouldSyncSequentially() {
    let source = "Hello.\n\nWorld.";
    let chunks = Chunker::new(ChunkerConfig::with_max_tokens(100)).chunk(source).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].index, 0);

    let list = paragraphs(&["Hello.", "World."]);
    let input = SyncInput::from_chunk_texts(&["Привет.\n\nМир."]);

    let outcome = sync_paragraphs(&list, &input, &SyncOptions::full().at(fixed_time()));

    assert_eq!(outcome.report.strategy, SyncStrategy::BySequentialChunk);
    assert_eq!(outcome.paragraphs[0].translated_text.as_deref(), Some("Привет."));
    assert_eq!(outcome.paragraphs[1].translated_text.as_deref(), Some("Мир."));
    assert!(outcome.paragraphs.iter().all(|p| p.status == ParagraphStatus::Translated));
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_scenarioA_throughFullPipeline_shouldSyncById() {
    let provider = MockProvider::working().with_translations(&[("Hello.", "Привет."), ("World.", "Мир.")]);
    let pipeline = TranslationPipeline::new(
        mock_providers(provider),
        PipelineConfig::new("en", "ru").with_max_tokens(100),
    )
    .unwrap();
    let list = paragraphs(&["Hello.", "World."]);

    let result = pipeline
        .translate_paragraphs("Hello.\n\nWorld.", &list, 1, &PipelineOptions::default())
        .await
        .unwrap();
    let input = result.sync_input().unwrap();
    let outcome = sync_paragraphs(&list, &input, &SyncOptions::full().at(fixed_time()));

    assert!(result.success);
    assert_eq!(result.final_translation, "Привет.\n\nМир.");
    assert_eq!(outcome.report.strategy, SyncStrategy::ById);
    assert_eq!(outcome.paragraphs[0].translated_text.as_deref(), Some("Привет."));
    assert_eq!(outcome.paragraphs[1].translated_text.as_deref(), Some("Мир."));
}

#[test]
fn test_scenarioB_partialMode_shouldKeepApprovedParagraph() {
    let mut list = paragraphs(&["Done.", "New."]);
    list[0] = list[0].clone().with_translation("Готово", ParagraphStatus::Approved);
    let before = list[0].clone();

    let outcome = sync_paragraphs(
        &list,
        &SyncInput::from_chunk_texts(&["Новый."]),
        &SyncOptions::partial().at(fixed_time()),
    );

    assert_eq!(outcome.paragraphs[0], before);
    assert_eq!(outcome.paragraphs[1].translated_text.as_deref(), Some("Новый."));
    assert_eq!(outcome.paragraphs[1].status, ParagraphStatus::Translated);
    assert_eq!(outcome.report.eligible, 1);
    assert_eq!(outcome.report.applied, 1);
}

#[tokio::test]
async fn test_scenarioC_failedTranslateStage_shouldNeverRunEditing() {
    let editor = MockProvider::working();
    let providers = StageProviders {
        analyze: ProviderHandle::json_capable(MockProvider::working()),
        translate: ProviderHandle::json_capable(MockProvider::failing()),
        edit: ProviderHandle::json_capable(editor.clone()),
    };
    let pipeline = TranslationPipeline::new(providers, PipelineConfig::new("en", "ru")).unwrap();

    let result = pipeline
        .translate_chapter("Hello.\n\nWorld.", 3, &PipelineOptions::default())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.state, PipelineState::Failed);
    assert!(result.final_translation.starts_with("[ERROR]"));
    assert!(result.stage1.is_some());
    assert!(result.stage3.is_none());
    assert_eq!(editor.request_count(), 0);
}

#[test]
fn test_scenarioD_separator_shouldTakeNoSequentialSlot() {
    let list = paragraphs(&["Before.", "---", "After."]);

    let outcome = sync_paragraphs(
        &list,
        &SyncInput::from_chunk_texts(&["До.\n\nПосле."]),
        &SyncOptions::full().at(fixed_time()),
    );

    assert_eq!(outcome.report.eligible, 2);
    assert_eq!(outcome.paragraphs[0].translated_text.as_deref(), Some("До."));
    assert_eq!(outcome.paragraphs[1], list[1]);
    assert_eq!(outcome.paragraphs[2].translated_text.as_deref(), Some("После."));
}
