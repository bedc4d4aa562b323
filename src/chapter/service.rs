/*!
 * Chapter translation lifecycle.
 *
 * A run is started fire-and-forget: `start_translation` flips the chapter to
 * `translating` and spawns the pipeline. Callers observe the outcome by
 * polling the chapter. Cancelling moves the status away from `translating`;
 * the in-flight provider call still completes but its result is discarded.
 */

use chrono::Utc;
use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::models::{Chapter, ChapterStatus, ChapterUpdate};
use super::store::ChapterStore;
use crate::app_config::SyncSettings;
use crate::errors::{AppError, StoreError};
use crate::providers::{ProviderCache, ProviderFactory};
use crate::translation::document::{EditedBy, Paragraph, ParagraphStatus, ERROR_PLACEHOLDER_PREFIX};
use crate::translation::glossary::GlossarySource;
use crate::translation::pipeline::{PipelineConfig, PipelineOptions, ProgressCallback, TranslationPipeline};
use crate::translation::sync::{is_eligible, sync_paragraphs, SyncOptions};

/// Options of one chapter translation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslationRequest {
    /// Only translate paragraphs lacking a valid translation
    pub partial: bool,

    /// Pipeline options
    pub options: PipelineOptions,
}

impl TranslationRequest {
    /// Translate every paragraph.
    pub fn full() -> Self {
        Self::default()
    }

    /// Translate only what is missing.
    pub fn partial() -> Self {
        Self {
            partial: true,
            ..Default::default()
        }
    }
}

/// Drives chapters through import, translation, review.
#[derive(Clone)]
pub struct ChapterService {
    store: Arc<dyn ChapterStore>,
    factory: Arc<dyn ProviderFactory>,
    providers: Arc<ProviderCache>,
    pipeline_config: PipelineConfig,
    sync_settings: SyncSettings,
    glossary: Option<Arc<dyn GlossarySource>>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for ChapterService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChapterService")
            .field("store", &self.store)
            .field("providers", &self.providers)
            .field("pipeline_config", &self.pipeline_config)
            .field("sync_settings", &self.sync_settings)
            .finish_non_exhaustive()
    }
}

impl ChapterService {
    /// Create a service with its own provider cache.
    pub fn new(
        store: Arc<dyn ChapterStore>,
        factory: Arc<dyn ProviderFactory>,
        pipeline_config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            factory,
            providers: Arc::new(ProviderCache::new()),
            pipeline_config,
            sync_settings: SyncSettings::default(),
            glossary: None,
            progress: None,
        }
    }

    /// Share a provider cache with other services.
    pub fn with_provider_cache(mut self, providers: Arc<ProviderCache>) -> Self {
        self.providers = providers;
        self
    }

    /// Set synchronization tunables.
    pub fn with_sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync_settings = settings;
        self
    }

    /// Inject terminology into every run.
    pub fn with_glossary(mut self, glossary: Arc<dyn GlossarySource>) -> Self {
        self.glossary = Some(glossary);
        self
    }

    /// Report pipeline progress of every run.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// The provider cache used by this service.
    pub fn provider_cache(&self) -> &ProviderCache {
        &self.providers
    }

    /// Drop cached providers of a project, e.g. after its settings changed.
    pub fn invalidate_providers(&self, project_id: &str) -> bool {
        self.providers.invalidate(project_id)
    }

    /// Import a chapter: one pending paragraph per source paragraph.
    pub async fn import_chapter(
        &self,
        project_id: &str,
        number: u32,
        title: Option<&str>,
        source_text: &str,
    ) -> Result<Chapter, StoreError> {
        let chapter = Chapter::import(project_id, number, title, source_text);
        self.store.insert_chapter(&chapter).await?;

        info!(
            "Imported chapter {} of project {} with {} paragraph(s)",
            number,
            project_id,
            chapter.paragraphs.len()
        );
        Ok(chapter)
    }

    /// Get a chapter.
    pub async fn get_chapter(&self, project_id: &str, chapter_id: &str) -> Result<Chapter, StoreError> {
        self.store.get_chapter(project_id, chapter_id).await
    }

    /// Chapters of a project ordered by number.
    pub async fn list_chapters(&self, project_id: &str) -> Result<Vec<Chapter>, StoreError> {
        self.store.list_chapters(project_id).await
    }

    /// Start a translation run in the background.
    ///
    /// Refuses when the chapter is already being translated.
    pub async fn start_translation(
        &self,
        project_id: &str,
        chapter_id: &str,
        request: TranslationRequest,
    ) -> Result<JoinHandle<Result<Chapter, AppError>>, StoreError> {
        let chapter = self.store.get_chapter(project_id, chapter_id).await?;
        if chapter.status == ChapterStatus::Translating {
            return Err(StoreError::AlreadyTranslating(chapter_id.to_string()));
        }

        self.store
            .update_chapter(
                project_id,
                chapter_id,
                ChapterUpdate::status(ChapterStatus::Translating).clear_error(),
            )
            .await?;

        let service = self.clone();
        let project_id = project_id.to_string();
        let chapter_id = chapter_id.to_string();

        Ok(tokio::spawn(async move {
            service.run_translation(&project_id, &chapter_id, request).await
        }))
    }

    /// Cancel a run by moving the chapter back to `pending`.
    pub async fn cancel_translation(&self, project_id: &str, chapter_id: &str) -> Result<Chapter, StoreError> {
        let chapter = self.store.get_chapter(project_id, chapter_id).await?;
        if chapter.status != ChapterStatus::Translating {
            return Ok(chapter);
        }

        info!("Cancelling translation of chapter {}", chapter_id);
        self.store
            .update_chapter(project_id, chapter_id, ChapterUpdate::status(ChapterStatus::Pending))
            .await
    }

    /// Replace a paragraph's translation by hand.
    pub async fn edit_paragraph(
        &self,
        project_id: &str,
        chapter_id: &str,
        paragraph_id: &str,
        text: &str,
    ) -> Result<Chapter, StoreError> {
        let mut chapter = self.store.get_chapter(project_id, chapter_id).await?;

        let paragraph = chapter
            .paragraphs
            .iter_mut()
            .find(|p| p.id == paragraph_id)
            .ok_or_else(|| StoreError::ParagraphNotFound(paragraph_id.to_string()))?;
        paragraph.translated_text = Some(text.trim().to_string());
        paragraph.status = ParagraphStatus::Edited;
        paragraph.edited_by = Some(EditedBy::User);
        paragraph.edited_at = Some(Utc::now());

        let assembled = chapter.assemble_translation();
        self.store
            .update_chapter(
                project_id,
                chapter_id,
                ChapterUpdate::default()
                    .with_paragraphs(chapter.paragraphs)
                    .with_translated_text(assembled),
            )
            .await
    }

    /// Set the status of many paragraphs at once.
    ///
    /// Moving back to `pending` touches every paragraph; any other status only
    /// touches paragraphs holding a valid translation. Returns how many changed.
    pub async fn set_all_paragraph_status(
        &self,
        project_id: &str,
        chapter_id: &str,
        status: ParagraphStatus,
    ) -> Result<usize, StoreError> {
        let mut chapter = self.store.get_chapter(project_id, chapter_id).await?;
        let mut changed = 0;

        for paragraph in chapter.paragraphs.iter_mut() {
            let applies = status == ParagraphStatus::Pending || paragraph.has_valid_translation();
            if applies && paragraph.status != status {
                paragraph.status = status;
                changed += 1;
            }
        }

        if changed > 0 {
            self.store
                .update_chapter(
                    project_id,
                    chapter_id,
                    ChapterUpdate::default().with_paragraphs(chapter.paragraphs),
                )
                .await?;
        }

        info!("Set {} paragraph(s) of chapter {} to {}", changed, chapter_id, status);
        Ok(changed)
    }

    /// Body of a spawned run; marks the chapter failed on error.
    async fn run_translation(
        &self,
        project_id: &str,
        chapter_id: &str,
        request: TranslationRequest,
    ) -> Result<Chapter, AppError> {
        match self.translate(project_id, chapter_id, request).await {
            Ok(chapter) => Ok(chapter),
            Err(e) => {
                error!("Translation of chapter {} failed: {}", chapter_id, e);
                if let Ok(chapter) = self.store.get_chapter(project_id, chapter_id).await {
                    if chapter.status == ChapterStatus::Translating {
                        self.fail_chapter(&chapter, &e.to_string()).await?;
                    }
                }
                Err(e)
            }
        }
    }

    async fn translate(
        &self,
        project_id: &str,
        chapter_id: &str,
        request: TranslationRequest,
    ) -> Result<Chapter, AppError> {
        let chapter = self.store.get_chapter(project_id, chapter_id).await?;

        let providers = self
            .providers
            .get_or_try_insert(project_id, || self.factory.build(project_id))?;
        let mut pipeline = TranslationPipeline::new(providers, self.pipeline_config.clone())?;
        if let Some(glossary) = &self.glossary {
            pipeline = pipeline.with_glossary(glossary.clone());
        }
        if let Some(progress) = &self.progress {
            pipeline = pipeline.with_progress(progress.clone());
        }

        let targets: Vec<Paragraph> = if request.partial {
            let mut pending: Vec<Paragraph> = chapter
                .paragraphs
                .iter()
                .filter(|p| is_eligible(p, true))
                .cloned()
                .collect();
            pending.sort_by_key(|p| p.index);
            pending
        } else {
            chapter.paragraphs.clone()
        };
        let source_text = if request.partial {
            targets
                .iter()
                .map(|p| p.original_text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        } else {
            chapter.source_text.clone()
        };

        if source_text.trim().is_empty() {
            info!("Chapter {} has nothing left to translate", chapter_id);
            return Ok(self
                .store
                .update_chapter(
                    project_id,
                    chapter_id,
                    ChapterUpdate::status(ChapterStatus::Translated).clear_error(),
                )
                .await?);
        }

        let result = pipeline
            .translate_paragraphs(&source_text, &targets, chapter.number, &request.options)
            .await?;

        let current = self.store.get_chapter(project_id, chapter_id).await?;
        if current.status != ChapterStatus::Translating {
            info!(
                "Chapter {} left the translating state during the run, discarding the result",
                chapter_id
            );
            return Ok(current);
        }

        let Some(input) = result.sync_input() else {
            return self.fail_chapter(&current, &result.final_translation).await;
        };

        let options = SyncOptions {
            partial: request.partial,
            applied_at: Utc::now(),
        };
        let outcome = sync_paragraphs(&current.paragraphs, &input, &options);

        if outcome.report.critical {
            return self
                .fail_chapter(
                    &current,
                    "Synchronization failed: no paragraph received a translation",
                )
                .await;
        }
        if !outcome.report.is_complete() {
            warn!(
                "Chapter {} synchronized with gaps: {} missing, {} extra",
                chapter_id, outcome.report.missing, outcome.report.extra
            );
        }

        let mut updated = current;
        updated.paragraphs = outcome.paragraphs;
        let assembled = updated.assemble_translation();

        info!(
            "Chapter {} translated: {} ({} tokens)",
            chapter_id,
            outcome.report.applied,
            result.total_tokens
        );

        Ok(self
            .store
            .update_chapter(
                project_id,
                chapter_id,
                ChapterUpdate::status(ChapterStatus::Translated)
                    .with_paragraphs(updated.paragraphs)
                    .with_translated_text(assembled)
                    .clear_error(),
            )
            .await?)
    }

    /// Mark a chapter failed, keeping any previously valid translation.
    async fn fail_chapter(&self, chapter: &Chapter, message: &str) -> Result<Chapter, AppError> {
        let mut update = ChapterUpdate::status(ChapterStatus::Error).with_error(message);

        if chapter.has_valid_translation(self.sync_settings.min_valid_chapter_chars) {
            warn!("Chapter {} failed; keeping its previous translation", chapter.id);
        } else if message.starts_with(ERROR_PLACEHOLDER_PREFIX) {
            update = update.with_translated_text(message);
        } else {
            update = update.with_translated_text(format!("[ERROR] {}", message));
        }

        Ok(self
            .store
            .update_chapter(&chapter.project_id, &chapter.id, update)
            .await?)
    }
}
