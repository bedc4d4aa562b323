/*!
 * Chapter lifecycle through the service: import, translate, review, cancel
 */

use std::sync::Arc;
use std::time::Duration;

use yantwai::app_config::SyncSettings;
use yantwai::chapter::{ChapterService, ChapterStatus, ChapterStore, InMemoryChapterStore, TranslationRequest};
use yantwai::errors::StoreError;
use yantwai::providers::mock::MockProvider;
use yantwai::translation::{
    sync_paragraphs, ParagraphStatus, PipelineConfig, PipelineOptions, SyncOptions, SyncStrategy, TranslationPipeline,
};

use crate::common::{in_memory_service, mock_providers};

const PROJECT: &str = "novel";

#[tokio::test]
async fn test_fullTranslation_shouldTranslateEveryParagraphAndSkipSeparators() {
    let service = in_memory_service(mock_providers(MockProvider::working()));
    let chapter = service
        .import_chapter(PROJECT, 1, Some("Arrival"), "Hello.\n\n---\n\nWorld.")
        .await
        .unwrap();

    let handle = service
        .start_translation(PROJECT, &chapter.id, TranslationRequest::full())
        .await
        .unwrap();
    let translated = handle.await.unwrap().unwrap();

    assert_eq!(translated.status, ChapterStatus::Translated);
    assert_eq!(translated.error_message, None);
    assert_eq!(translated.paragraphs[0].translated_text.as_deref(), Some("[TRANSLATED] Hello."));
    assert_eq!(translated.paragraphs[1].translated_text, None);
    assert_eq!(translated.paragraphs[2].translated_text.as_deref(), Some("[TRANSLATED] World."));
    assert_eq!(
        translated.translated_text.as_deref(),
        Some("[TRANSLATED] Hello.\n\n---\n\n[TRANSLATED] World.")
    );
    assert_eq!(translated.translation_progress(), (2, 2));

    // Same full-mode run the service made, with its synchronization report
    let pipeline = TranslationPipeline::new(
        mock_providers(MockProvider::working()),
        PipelineConfig::new("en", "ru"),
    )
    .unwrap();
    let result = pipeline
        .translate_paragraphs(&chapter.source_text, &chapter.paragraphs, 1, &PipelineOptions::default())
        .await
        .unwrap();
    let outcome = sync_paragraphs(&chapter.paragraphs, &result.sync_input().unwrap(), &SyncOptions::full());

    assert_eq!(outcome.report.strategy, SyncStrategy::ById);
    assert_eq!(outcome.report.extra, 0);
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_partialTranslation_shouldOnlySendUntranslatedParagraphs() {
    let provider = MockProvider::working();
    let service = in_memory_service(mock_providers(provider.clone()));
    let chapter = service
        .import_chapter(PROJECT, 2, None, "Done.\n\nStill pending.")
        .await
        .unwrap();
    let reviewed_id = chapter.paragraphs[0].id.clone();

    service
        .edit_paragraph(PROJECT, &chapter.id, &reviewed_id, "Готово")
        .await
        .unwrap();
    let approved = service
        .set_all_paragraph_status(PROJECT, &chapter.id, ParagraphStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved, 1);

    let handle = service
        .start_translation(PROJECT, &chapter.id, TranslationRequest::partial())
        .await
        .unwrap();
    let translated = handle.await.unwrap().unwrap();

    assert_eq!(translated.paragraphs[0].translated_text.as_deref(), Some("Готово"));
    assert_eq!(translated.paragraphs[0].status, ParagraphStatus::Approved);
    assert_eq!(
        translated.paragraphs[1].translated_text.as_deref(),
        Some("[TRANSLATED] Still pending.")
    );
    assert!(provider.calls().iter().all(|call| !call.user_prompt().contains("Done.")));
    assert_eq!(
        translated.translated_text.as_deref(),
        Some("Готово\n\n[TRANSLATED] Still pending.")
    );
}

#[tokio::test]
async fn test_partialTranslation_withNothingLeft_shouldFinishWithoutCalls() {
    let provider = MockProvider::working();
    let service = in_memory_service(mock_providers(provider.clone()));
    let chapter = service.import_chapter(PROJECT, 3, None, "Only.").await.unwrap();
    service
        .edit_paragraph(PROJECT, &chapter.id, &chapter.paragraphs[0].id, "Единственный.")
        .await
        .unwrap();

    let handle = service
        .start_translation(PROJECT, &chapter.id, TranslationRequest::partial())
        .await
        .unwrap();
    let finished = handle.await.unwrap().unwrap();

    assert_eq!(finished.status, ChapterStatus::Translated);
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_cancel_duringRun_shouldDiscardResult() {
    let service = in_memory_service(mock_providers(MockProvider::slow(300)));
    let chapter = service.import_chapter(PROJECT, 4, None, "Slow.").await.unwrap();

    let handle = service
        .start_translation(PROJECT, &chapter.id, TranslationRequest::full())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled = service.cancel_translation(PROJECT, &chapter.id).await.unwrap();
    assert_eq!(cancelled.status, ChapterStatus::Pending);

    handle.await.unwrap().unwrap();
    let stored = service.get_chapter(PROJECT, &chapter.id).await.unwrap();

    assert_eq!(stored.status, ChapterStatus::Pending);
    assert_eq!(stored.paragraphs[0].translated_text, None);
    assert_eq!(stored.translated_text, None);
}

#[tokio::test]
async fn test_failedRun_shouldKeepPreviousTranslation() {
    let store = Arc::new(InMemoryChapterStore::new());
    let config = PipelineConfig::new("en", "ru");
    let working = ChapterService::new(store.clone(), Arc::new(mock_providers(MockProvider::working())), config.clone());
    let failing = ChapterService::new(store.clone(), Arc::new(mock_providers(MockProvider::failing())), config)
        .with_sync_settings(SyncSettings {
            min_valid_chapter_chars: 5,
        });
    let chapter = working.import_chapter(PROJECT, 5, None, "Hello.\n\nWorld.").await.unwrap();

    let first = working
        .start_translation(PROJECT, &chapter.id, TranslationRequest::full())
        .await
        .unwrap();
    let translated = first.await.unwrap().unwrap();

    let second = failing
        .start_translation(PROJECT, &chapter.id, TranslationRequest::full())
        .await
        .unwrap();
    let failed = second.await.unwrap().unwrap();

    assert_eq!(failed.status, ChapterStatus::Error);
    assert!(failed.error_message.as_deref().unwrap().starts_with("[ERROR]"));
    assert_eq!(failed.translated_text, translated.translated_text);
    assert_eq!(failed.paragraphs, translated.paragraphs);
}

#[tokio::test]
async fn test_retryAfterError_shouldBeAllowed() {
    let store: Arc<dyn ChapterStore> = Arc::new(InMemoryChapterStore::new());
    let failing = ChapterService::new(
        store.clone(),
        Arc::new(mock_providers(MockProvider::failing())),
        PipelineConfig::new("en", "ru"),
    );
    let working = ChapterService::new(
        store,
        Arc::new(mock_providers(MockProvider::working())),
        PipelineConfig::new("en", "ru"),
    );
    let chapter = failing.import_chapter(PROJECT, 6, None, "Again.").await.unwrap();

    let failed = failing
        .start_translation(PROJECT, &chapter.id, TranslationRequest::full())
        .await
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, ChapterStatus::Error);
    assert!(failed.translated_text.as_deref().unwrap().starts_with("[ERROR]"));

    let retried = working
        .start_translation(PROJECT, &chapter.id, TranslationRequest::full())
        .await
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(retried.status, ChapterStatus::Translated);
    assert_eq!(retried.error_message, None);
    assert_eq!(retried.translated_text.as_deref(), Some("[TRANSLATED] Again."));
}

#[tokio::test]
async fn test_editParagraph_shouldMarkUserEdit() {
    let service = in_memory_service(mock_providers(MockProvider::working()));
    let chapter = service.import_chapter(PROJECT, 7, None, "One.\n\nTwo.").await.unwrap();
    let target = chapter.paragraphs[1].id.clone();

    let edited = service
        .edit_paragraph(PROJECT, &chapter.id, &target, "  Два.  ")
        .await
        .unwrap();
    let paragraph = edited.paragraph(&target).unwrap();

    assert_eq!(paragraph.translated_text.as_deref(), Some("Два."));
    assert_eq!(paragraph.status, ParagraphStatus::Edited);
    assert!(paragraph.edited_at.is_some());
    assert_eq!(edited.translated_text.as_deref(), Some("Два."));
}

#[tokio::test]
async fn test_resetToPending_shouldTouchEveryParagraph() {
    let service = in_memory_service(mock_providers(MockProvider::working()));
    let chapter = service.import_chapter(PROJECT, 8, None, "One.\n\nTwo.").await.unwrap();
    service
        .edit_paragraph(PROJECT, &chapter.id, &chapter.paragraphs[0].id, "Один.")
        .await
        .unwrap();

    let approved = service
        .set_all_paragraph_status(PROJECT, &chapter.id, ParagraphStatus::Approved)
        .await
        .unwrap();
    let reset = service
        .set_all_paragraph_status(PROJECT, &chapter.id, ParagraphStatus::Pending)
        .await
        .unwrap();

    assert_eq!(approved, 1);
    assert_eq!(reset, 1);
    let stored = service.get_chapter(PROJECT, &chapter.id).await.unwrap();
    assert!(stored.paragraphs.iter().all(|p| p.status == ParagraphStatus::Pending));
}

#[tokio::test]
async fn test_unknownChapter_shouldReportNotFound() {
    let service = in_memory_service(mock_providers(MockProvider::working()));

    let result = service
        .start_translation(PROJECT, "missing", TranslationRequest::full())
        .await;

    assert!(matches!(result, Err(StoreError::ChapterNotFound { .. })));
}

#[tokio::test]
async fn test_providerCache_shouldBuildOncePerProject() {
    let service = in_memory_service(mock_providers(MockProvider::working()));
    let first = service.import_chapter(PROJECT, 9, None, "A.").await.unwrap();
    let second = service.import_chapter(PROJECT, 10, None, "B.").await.unwrap();

    for chapter in [&first, &second] {
        service
            .start_translation(PROJECT, &chapter.id, TranslationRequest::full())
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();
    }

    assert_eq!(service.provider_cache().len(), 1);
    assert!(service.invalidate_providers(PROJECT));
    assert!(!service.invalidate_providers(PROJECT));
    assert_eq!(service.list_chapters(PROJECT).await.unwrap().len(), 2);
}
