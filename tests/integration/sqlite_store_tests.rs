/*!
 * Chapter service over the SQLite store
 */

use std::sync::Arc;

use yantwai::chapter::{ChapterService, ChapterStatus, TranslationRequest};
use yantwai::database::{ChapterRepository, DatabaseConnection};
use yantwai::providers::mock::MockProvider;
use yantwai::translation::{EditedBy, ParagraphStatus, PipelineConfig};

use crate::common::{create_temp_dir, mock_providers};

fn sqlite_service(db: DatabaseConnection) -> ChapterService {
    ChapterService::new(
        Arc::new(ChapterRepository::new(db)),
        Arc::new(mock_providers(MockProvider::working())),
        PipelineConfig::new("en", "ru"),
    )
}

#[tokio::test]
async fn test_translatedChapter_shouldSurviveReopeningDatabase() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("data").join("yantwai.db");

    let chapter_id = {
        let service = sqlite_service(DatabaseConnection::new(&path).unwrap());
        let chapter = service
            .import_chapter("novel", 1, Some("Arrival"), "Hello.\n\n***\n\nWorld.")
            .await
            .unwrap();
        service
            .start_translation("novel", &chapter.id, TranslationRequest::full())
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        service
            .edit_paragraph("novel", &chapter.id, &chapter.paragraphs[2].id, "Мир!")
            .await
            .unwrap();
        chapter.id
    };

    let db = DatabaseConnection::new(&path).unwrap();
    let stats = db.stats().unwrap();
    let service = sqlite_service(db);
    let stored = service.get_chapter("novel", &chapter_id).await.unwrap();

    assert_eq!(stats.chapter_count, 1);
    assert_eq!(stats.paragraph_count, 3);
    assert_eq!(stats.translated_chapters, 1);
    assert_eq!(stored.status, ChapterStatus::Translated);
    assert_eq!(stored.title.as_deref(), Some("Arrival"));
    assert_eq!(stored.paragraphs.len(), 3);
    assert_eq!(stored.paragraphs[0].translated_text.as_deref(), Some("[TRANSLATED] Hello."));
    assert_eq!(stored.paragraphs[0].edited_by, Some(EditedBy::Ai));
    assert_eq!(stored.paragraphs[1].translated_text, None);
    assert_eq!(stored.paragraphs[2].status, ParagraphStatus::Edited);
    assert_eq!(stored.paragraphs[2].edited_by, Some(EditedBy::User));
    assert_eq!(
        stored.translated_text.as_deref(),
        Some("[TRANSLATED] Hello.\n\n***\n\nМир!")
    );
}

#[tokio::test]
async fn test_partialRun_overSqlite_shouldKeepUserEdits() {
    let service = sqlite_service(DatabaseConnection::new_in_memory().unwrap());
    let chapter = service
        .import_chapter("novel", 2, None, "Kept.\n\nFresh.")
        .await
        .unwrap();
    service
        .edit_paragraph("novel", &chapter.id, &chapter.paragraphs[0].id, "Оставлено.")
        .await
        .unwrap();

    let translated = service
        .start_translation("novel", &chapter.id, TranslationRequest::partial())
        .await
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(translated.paragraphs[0].translated_text.as_deref(), Some("Оставлено."));
    assert_eq!(translated.paragraphs[0].status, ParagraphStatus::Edited);
    assert_eq!(translated.paragraphs[1].translated_text.as_deref(), Some("[TRANSLATED] Fresh."));
}

#[tokio::test]
async fn test_listChapters_overSqlite_shouldIsolateProjects() {
    let service = sqlite_service(DatabaseConnection::new_in_memory().unwrap());
    service.import_chapter("a", 2, None, "Two.").await.unwrap();
    service.import_chapter("a", 1, None, "One.").await.unwrap();
    service.import_chapter("b", 1, None, "Other.").await.unwrap();

    let chapters = service.list_chapters("a").await.unwrap();

    assert_eq!(chapters.iter().map(|c| c.number).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(service.list_chapters("b").await.unwrap().len(), 1);
}
