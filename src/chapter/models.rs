/*!
 * Chapter record and partial updates.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::translation::document::{is_separator, is_valid_translation, split_paragraphs, Paragraph};

/// Chapter translation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    /// Not translated, or a run was cancelled
    #[default]
    Pending,
    /// A run is in flight
    Translating,
    /// Last run finished
    Translated,
    /// Last run failed
    Error,
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterStatus::Pending => write!(f, "pending"),
            ChapterStatus::Translating => write!(f, "translating"),
            ChapterStatus::Translated => write!(f, "translated"),
            ChapterStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ChapterStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ChapterStatus::Pending),
            "translating" => Ok(ChapterStatus::Translating),
            "translated" => Ok(ChapterStatus::Translated),
            "error" => Ok(ChapterStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid chapter status: {}", s)),
        }
    }
}

/// A chapter with its paragraph list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Chapter id
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Chapter number within the project
    pub number: u32,

    /// Optional title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Source text as imported
    pub source_text: String,

    /// SHA-256 of the source text
    pub source_hash: String,

    /// Assembled translation, or an error placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,

    /// Translation status
    pub status: ChapterStatus,

    /// Human-readable reason of the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Paragraphs in index order
    pub paragraphs: Vec<Paragraph>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    /// Create a chapter from source text, one pending paragraph per blank-line block.
    pub fn import(project_id: &str, number: u32, title: Option<&str>, source_text: &str) -> Self {
        let paragraphs = split_paragraphs(source_text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Paragraph::new(Uuid::new_v4().to_string(), index, text))
            .collect();
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            number,
            title: title.map(|t| t.to_string()),
            source_text: source_text.to_string(),
            source_hash: hash_source(source_text),
            translated_text: None,
            status: ChapterStatus::Pending,
            error_message: None,
            paragraphs,
            created_at: now,
            updated_at: now,
        }
    }

    /// Find a paragraph by id.
    pub fn paragraph(&self, paragraph_id: &str) -> Option<&Paragraph> {
        self.paragraphs.iter().find(|p| p.id == paragraph_id)
    }

    /// Paragraphs with a valid translation, and paragraphs that can have one.
    pub fn translation_progress(&self) -> (usize, usize) {
        let countable: Vec<&Paragraph> = self.paragraphs.iter().filter(|p| !p.is_separator()).collect();
        let translated = countable.iter().filter(|p| p.has_valid_translation()).count();
        (translated, countable.len())
    }

    /// Whether the chapter holds a translation worth keeping.
    ///
    /// True when the stored text is valid and longer than `min_chars`, or when
    /// any paragraph has a valid translation.
    pub fn has_valid_translation(&self, min_chars: usize) -> bool {
        let text_usable = self
            .translated_text
            .as_deref()
            .is_some_and(|t| is_valid_translation(t) && t.trim().chars().count() > min_chars);

        text_usable || self.paragraphs.iter().any(|p| p.has_valid_translation())
    }

    /// Join paragraph translations in index order.
    ///
    /// Separators are copied from the source; untranslated paragraphs are left out.
    pub fn assemble_translation(&self) -> String {
        let mut ordered: Vec<&Paragraph> = self.paragraphs.iter().collect();
        ordered.sort_by_key(|p| p.index);

        ordered
            .into_iter()
            .filter_map(|p| match p.translated_text.as_deref() {
                Some(text) if is_valid_translation(text) => Some(text.trim()),
                _ if is_separator(&p.original_text) => Some(p.original_text.trim()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Hex SHA-256 of a source text.
pub fn hash_source(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Partial update of a chapter; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterUpdate {
    /// New status
    pub status: Option<ChapterStatus>,

    /// New translated text
    pub translated_text: Option<String>,

    /// New error message; `Some(None)` clears it
    pub error_message: Option<Option<String>>,

    /// New paragraph list
    pub paragraphs: Option<Vec<Paragraph>>,
}

impl ChapterUpdate {
    /// Update the status only.
    pub fn status(status: ChapterStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Set the translated text.
    pub fn with_translated_text(mut self, text: impl Into<String>) -> Self {
        self.translated_text = Some(text.into());
        self
    }

    /// Set the error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    /// Clear the error message.
    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    /// Replace the paragraph list.
    pub fn with_paragraphs(mut self, paragraphs: Vec<Paragraph>) -> Self {
        self.paragraphs = Some(paragraphs);
        self
    }

    /// Apply onto a chapter, bumping `updated_at`.
    pub fn apply_to(self, chapter: &mut Chapter) {
        if let Some(status) = self.status {
            chapter.status = status;
        }
        if let Some(text) = self.translated_text {
            chapter.translated_text = Some(text);
        }
        if let Some(message) = self.error_message {
            chapter.error_message = message;
        }
        if let Some(paragraphs) = self.paragraphs {
            chapter.paragraphs = paragraphs;
        }
        chapter.updated_at = Utc::now();
    }
}
