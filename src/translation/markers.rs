/*!
 * Paragraph markers for correlating translated text with paragraph records.
 *
 * Each source paragraph is sent to the translator as
 * `--para:{paragraphId}--{text}`. When the model preserves the markers, the
 * translated text can be mapped back to paragraph ids regardless of how
 * chunk boundaries fell.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, VecDeque};

use crate::translation::document::{split_paragraphs, Paragraph};

/// Regex for matching paragraph markers
static MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--para:([A-Za-z0-9_\-]+?)--").expect("Invalid paragraph marker regex"));

/// Prefix used for markers of source paragraphs without a stored record
pub const AUTO_MARKER_PREFIX: &str = "auto_";

/// Format the marker for a paragraph id.
pub fn marker_for(paragraph_id: &str) -> String {
    format!("--para:{}--", paragraph_id)
}

/// Normalize a marker or bare id into a bare id.
///
/// Accepts `--para:abc--`, `abc`, and surrounding whitespace.
pub fn normalize_marker_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = MARKER_REGEX.captures(trimmed) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let bare = trimmed.trim_start_matches("--para:").trim_end_matches("--");
    (!bare.is_empty()).then(|| bare.to_string())
}

/// Whether the id was generated for an unmatched source paragraph.
pub fn is_auto_marker(id: &str) -> bool {
    id.starts_with(AUTO_MARKER_PREFIX)
}

/// Remove every marker from text.
pub fn strip_markers(text: &str) -> String {
    MARKER_REGEX.replace_all(text, "").trim().to_string()
}

/// How one source paragraph was tagged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerAssignment {
    /// Marker id embedded in the text
    pub marker_id: String,

    /// Paragraph record this marker stands for (`None` for `auto_` markers)
    pub paragraph_id: Option<String>,

    /// Position of the paragraph in the source text
    pub source_position: usize,
}

/// Source text with a marker in front of every paragraph
#[derive(Debug, Clone, Default)]
pub struct TaggedSource {
    /// Tagged text, paragraphs separated by a blank line
    pub text: String,

    /// One assignment per source paragraph, in source order
    pub assignments: Vec<MarkerAssignment>,
}

impl TaggedSource {
    /// Number of source paragraphs matched to a stored record.
    pub fn matched_count(&self) -> usize {
        self.assignments.iter().filter(|a| a.paragraph_id.is_some()).count()
    }

    /// Resolve a marker id to the paragraph record id it stands for.
    pub fn paragraph_for_marker(&self, marker_id: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.marker_id == marker_id)
            .and_then(|a| a.paragraph_id.as_deref())
    }
}

/// Tags source paragraphs with stable paragraph markers.
pub struct MarkerTagger;

impl MarkerTagger {
    /// Tag each paragraph of `source_text`.
    ///
    /// A source paragraph is matched to a record by exact text equality
    /// (first unused record in index order wins). Unmatched paragraphs get
    /// an `auto_{n}` marker, `n` being the paragraph's source position.
    pub fn tag(paragraphs: &[Paragraph], source_text: &str) -> TaggedSource {
        let mut ordered: Vec<&Paragraph> = paragraphs.iter().collect();
        ordered.sort_by_key(|p| p.index);

        let mut by_text: HashMap<&str, VecDeque<&str>> = HashMap::new();
        for paragraph in ordered {
            by_text
                .entry(paragraph.original_text.trim())
                .or_default()
                .push_back(paragraph.id.as_str());
        }

        let mut tagged = Vec::new();
        let mut assignments = Vec::new();

        for (position, text) in split_paragraphs(source_text).into_iter().enumerate() {
            let matched = by_text.get_mut(text).and_then(|ids| ids.pop_front());

            let (marker_id, paragraph_id) = match matched {
                Some(id) => (id.to_string(), Some(id.to_string())),
                None => (format!("{}{}", AUTO_MARKER_PREFIX, position), None),
            };

            tagged.push(format!("{}{}", marker_for(&marker_id), text));
            assignments.push(MarkerAssignment {
                marker_id,
                paragraph_id,
                source_position: position,
            });
        }

        let source = TaggedSource {
            text: tagged.join("\n\n"),
            assignments,
        };

        debug!(
            "Tagged {} source paragraph(s), {} matched to records",
            source.assignments.len(),
            source.matched_count()
        );

        source
    }

    /// Marker ids in the order they appear in `text`.
    pub fn marker_ids(text: &str) -> Vec<String> {
        MARKER_REGEX
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Split marker-bearing text into `(marker_id, text)` pairs.
    ///
    /// Text before the first marker is ignored. Returns an empty list when
    /// the text contains no markers.
    pub fn split_tagged(text: &str) -> Vec<(String, String)> {
        let markers: Vec<(usize, usize, String)> = MARKER_REGEX
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let id = caps.get(1)?;
                Some((whole.start(), whole.end(), id.as_str().to_string()))
            })
            .collect();

        markers
            .iter()
            .enumerate()
            .map(|(i, (_, end, id))| {
                let next_start = markers.get(i + 1).map_or(text.len(), |m| m.0);
                (id.clone(), text[*end..next_start].trim().to_string())
            })
            .collect()
    }
}
