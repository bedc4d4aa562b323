/*!
 * SQLite-backed chapter store.
 *
 * Every call runs on the blocking pool through the shared connection.
 * Updates are read-modify-write inside one transaction, so concurrent
 * writers to the same chapter serialize on the connection lock.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::connection::DatabaseConnection;
use super::models::{ChapterRecord, ParagraphRecord};
use crate::chapter::{Chapter, ChapterStore, ChapterUpdate};
use crate::errors::StoreError;

/// Chapter repository over SQLite
#[derive(Debug, Clone)]
pub struct ChapterRepository {
    /// Database connection
    db: DatabaseConnection,
}

impl ChapterRepository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    fn load_sync(conn: &Connection, project_id: &str, chapter_id: &str) -> Result<Option<Chapter>> {
        let record = conn
            .query_row(
                r#"
                SELECT project_id, id, number, title, source_text, source_hash,
                       translated_text, status, error_message, created_at, updated_at
                FROM chapters WHERE project_id = ?1 AND id = ?2
                "#,
                params![project_id, chapter_id],
                |row| {
                    Ok(ChapterRecord {
                        project_id: row.get(0)?,
                        id: row.get(1)?,
                        number: row.get(2)?,
                        title: row.get(3)?,
                        source_text: row.get(4)?,
                        source_hash: row.get(5)?,
                        translated_text: row.get(6)?,
                        status: row.get(7)?,
                        error_message: row.get(8)?,
                        created_at: row.get(9)?,
                        updated_at: row.get(10)?,
                    })
                },
            )
            .optional()?;

        let Some(record) = record else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT id, position, original_text, translated_text, status, edited_at, edited_by
            FROM paragraphs WHERE project_id = ?1 AND chapter_id = ?2
            ORDER BY position
            "#,
        )?;
        let paragraphs = stmt
            .query_map(params![project_id, chapter_id], |row| {
                Ok(ParagraphRecord {
                    id: row.get(0)?,
                    position: row.get(1)?,
                    original_text: row.get(2)?,
                    translated_text: row.get(3)?,
                    status: row.get(4)?,
                    edited_at: row.get(5)?,
                    edited_by: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(record.into_chapter(paragraphs)?))
    }

    fn save_sync(conn: &Connection, chapter: &Chapter) -> Result<()> {
        let record = ChapterRecord::from_chapter(chapter);

        conn.execute(
            r#"
            INSERT INTO chapters (
                project_id, id, number, title, source_text, source_hash,
                translated_text, status, error_message, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(project_id, id) DO UPDATE SET
                number = excluded.number,
                title = excluded.title,
                source_text = excluded.source_text,
                source_hash = excluded.source_hash,
                translated_text = excluded.translated_text,
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
            params![
                record.project_id,
                record.id,
                record.number,
                record.title,
                record.source_text,
                record.source_hash,
                record.translated_text,
                record.status,
                record.error_message,
                record.created_at,
                record.updated_at,
            ],
        )?;

        conn.execute(
            "DELETE FROM paragraphs WHERE project_id = ?1 AND chapter_id = ?2",
            params![chapter.project_id, chapter.id],
        )?;

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO paragraphs (
                project_id, chapter_id, id, position, original_text,
                translated_text, status, edited_at, edited_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )?;
        for paragraph in &chapter.paragraphs {
            let row = ParagraphRecord::from_paragraph(paragraph);
            stmt.execute(params![
                chapter.project_id,
                chapter.id,
                row.id,
                row.position,
                row.original_text,
                row.translated_text,
                row.status,
                row.edited_at,
                row.edited_by,
            ])?;
        }

        debug!(
            "Saved chapter {}/{} with {} paragraph(s)",
            chapter.project_id,
            chapter.id,
            chapter.paragraphs.len()
        );
        Ok(())
    }
}

fn not_found(project_id: &str, chapter_id: &str) -> StoreError {
    StoreError::ChapterNotFound {
        project_id: project_id.to_string(),
        chapter_id: chapter_id.to_string(),
    }
}

#[async_trait]
impl ChapterStore for ChapterRepository {
    async fn get_chapter(&self, project_id: &str, chapter_id: &str) -> Result<Chapter, StoreError> {
        let (project, chapter) = (project_id.to_string(), chapter_id.to_string());

        self.db
            .execute_async(move |conn| Self::load_sync(conn, &project, &chapter))
            .await?
            .ok_or_else(|| not_found(project_id, chapter_id))
    }

    async fn update_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        update: ChapterUpdate,
    ) -> Result<Chapter, StoreError> {
        let (project, chapter) = (project_id.to_string(), chapter_id.to_string());

        self.db
            .transaction_async(move |tx| {
                let Some(mut current) = Self::load_sync(tx, &project, &chapter)? else {
                    return Ok(None);
                };
                update.apply_to(&mut current);
                Self::save_sync(tx, &current)?;
                Ok(Some(current))
            })
            .await?
            .ok_or_else(|| not_found(project_id, chapter_id))
    }

    async fn insert_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
        let chapter = chapter.clone();

        self.db
            .transaction_async(move |tx| Self::save_sync(tx, &chapter))
            .await?;
        Ok(())
    }

    async fn list_chapters(&self, project_id: &str) -> Result<Vec<Chapter>, StoreError> {
        let project = project_id.to_string();

        Ok(self
            .db
            .execute_async(move |conn| {
                let ids: Vec<String> = conn
                    .prepare("SELECT id FROM chapters WHERE project_id = ?1 ORDER BY number")?
                    .query_map([&project], |row| row.get(0))?
                    .collect::<std::result::Result<_, _>>()?;

                let mut chapters = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(chapter) = Self::load_sync(conn, &project, &id)? {
                        chapters.push(chapter);
                    }
                }
                Ok(chapters)
            })
            .await?)
    }
}
