/*!
 * Database row models.
 *
 * Rows keep timestamps as RFC 3339 strings and statuses as their lowercase
 * names; conversions to the domain types live here.
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::chapter::{Chapter, ChapterStatus};
use crate::translation::document::{EditedBy, Paragraph, ParagraphStatus};

/// Row of the `chapters` table
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRecord {
    pub project_id: String,
    pub id: String,
    pub number: u32,
    pub title: Option<String>,
    pub source_text: String,
    pub source_hash: String,
    pub translated_text: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Row of the `paragraphs` table
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphRecord {
    pub id: String,
    pub position: i64,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub status: String,
    pub edited_at: Option<String>,
    pub edited_by: Option<String>,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in database: {}", value))?
        .with_timezone(&Utc))
}

fn edited_by_to_str(edited_by: EditedBy) -> &'static str {
    match edited_by {
        EditedBy::Ai => "ai",
        EditedBy::User => "user",
    }
}

fn edited_by_from_str(value: &str) -> Result<EditedBy> {
    match value {
        "ai" => Ok(EditedBy::Ai),
        "user" => Ok(EditedBy::User),
        _ => Err(anyhow::anyhow!("Invalid editor in database: {}", value)),
    }
}

impl ChapterRecord {
    /// Build the row of a chapter
    pub fn from_chapter(chapter: &Chapter) -> Self {
        Self {
            project_id: chapter.project_id.clone(),
            id: chapter.id.clone(),
            number: chapter.number,
            title: chapter.title.clone(),
            source_text: chapter.source_text.clone(),
            source_hash: chapter.source_hash.clone(),
            translated_text: chapter.translated_text.clone(),
            status: chapter.status.to_string(),
            error_message: chapter.error_message.clone(),
            created_at: chapter.created_at.to_rfc3339(),
            updated_at: chapter.updated_at.to_rfc3339(),
        }
    }

    /// Rebuild the chapter from its row and paragraph rows
    pub fn into_chapter(self, paragraphs: Vec<ParagraphRecord>) -> Result<Chapter> {
        let status: ChapterStatus = self.status.parse()?;
        let paragraphs = paragraphs
            .into_iter()
            .map(ParagraphRecord::into_paragraph)
            .collect::<Result<Vec<_>>>()?;

        Ok(Chapter {
            id: self.id,
            project_id: self.project_id,
            number: self.number,
            title: self.title,
            source_text: self.source_text,
            source_hash: self.source_hash,
            translated_text: self.translated_text,
            status,
            error_message: self.error_message,
            paragraphs,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl ParagraphRecord {
    /// Build the row of a paragraph
    pub fn from_paragraph(paragraph: &Paragraph) -> Self {
        Self {
            id: paragraph.id.clone(),
            position: paragraph.index as i64,
            original_text: paragraph.original_text.clone(),
            translated_text: paragraph.translated_text.clone(),
            status: paragraph.status.to_string(),
            edited_at: paragraph.edited_at.map(|t| t.to_rfc3339()),
            edited_by: paragraph.edited_by.map(|e| edited_by_to_str(e).to_string()),
        }
    }

    /// Rebuild the paragraph
    pub fn into_paragraph(self) -> Result<Paragraph> {
        let status: ParagraphStatus = self.status.parse()?;
        let edited_at = self.edited_at.as_deref().map(parse_timestamp).transpose()?;
        let edited_by = self.edited_by.as_deref().map(edited_by_from_str).transpose()?;
        let index = usize::try_from(self.position)
            .with_context(|| format!("Negative paragraph position: {}", self.position))?;

        Ok(Paragraph {
            id: self.id,
            index,
            original_text: self.original_text,
            translated_text: self.translated_text,
            status,
            edited_at,
            edited_by,
        })
    }
}
