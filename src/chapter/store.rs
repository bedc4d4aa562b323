/*!
 * Chapter persistence contract.
 *
 * The lifecycle service treats storage as an opaque upsert keyed by
 * `(project_id, chapter_id)`: last write wins at chapter granularity.
 */

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;

use super::models::{Chapter, ChapterUpdate};
use crate::errors::StoreError;

/// Chapter storage.
#[async_trait]
pub trait ChapterStore: Send + Sync + Debug {
    /// Get a chapter
    async fn get_chapter(&self, project_id: &str, chapter_id: &str) -> Result<Chapter, StoreError>;

    /// Apply a partial update and return the updated chapter
    async fn update_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        update: ChapterUpdate,
    ) -> Result<Chapter, StoreError>;

    /// Insert or replace a whole chapter
    async fn insert_chapter(&self, chapter: &Chapter) -> Result<(), StoreError>;

    /// Chapters of a project ordered by number
    async fn list_chapters(&self, project_id: &str) -> Result<Vec<Chapter>, StoreError>;
}

/// Chapter store kept in memory
#[derive(Debug, Default)]
pub struct InMemoryChapterStore {
    chapters: RwLock<HashMap<(String, String), Chapter>>,
}

impl InMemoryChapterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn key(project_id: &str, chapter_id: &str) -> (String, String) {
        (project_id.to_string(), chapter_id.to_string())
    }
}

fn not_found(project_id: &str, chapter_id: &str) -> StoreError {
    StoreError::ChapterNotFound {
        project_id: project_id.to_string(),
        chapter_id: chapter_id.to_string(),
    }
}

#[async_trait]
impl ChapterStore for InMemoryChapterStore {
    async fn get_chapter(&self, project_id: &str, chapter_id: &str) -> Result<Chapter, StoreError> {
        self.chapters
            .read()
            .get(&Self::key(project_id, chapter_id))
            .cloned()
            .ok_or_else(|| not_found(project_id, chapter_id))
    }

    async fn update_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        update: ChapterUpdate,
    ) -> Result<Chapter, StoreError> {
        let mut chapters = self.chapters.write();
        let chapter = chapters
            .get_mut(&Self::key(project_id, chapter_id))
            .ok_or_else(|| not_found(project_id, chapter_id))?;

        update.apply_to(chapter);
        debug!("Updated chapter {}/{} ({})", project_id, chapter_id, chapter.status);
        Ok(chapter.clone())
    }

    async fn insert_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
        self.chapters
            .write()
            .insert(Self::key(&chapter.project_id, &chapter.id), chapter.clone());
        Ok(())
    }

    async fn list_chapters(&self, project_id: &str) -> Result<Vec<Chapter>, StoreError> {
        let mut chapters: Vec<Chapter> = self
            .chapters
            .read()
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|c| c.number);
        Ok(chapters)
    }
}
