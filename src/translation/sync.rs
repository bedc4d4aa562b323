/*!
 * Synchronization of pipeline output with a chapter's paragraph list.
 *
 * Three correlation strategies exist, resolved once per run from what the
 * translate stage actually returned:
 * - `ById`: every successful chunk came back with paragraph markers, so
 *   translations are applied by paragraph id
 * - `BySequentialChunk`: chunk texts are split into paragraphs and assigned,
 *   in order, to the eligible paragraphs
 * - `ByWholeTextSplit`: no chunk data at all; the full text is split on
 *   blank lines and mapped positionally
 *
 * Synchronization never adds or removes paragraphs. Separator paragraphs are
 * never assigned, and in partial mode neither is any paragraph that already
 * holds a valid or human-reviewed translation.
 */

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::translation::document::{
    is_separator, is_valid_translation, split_paragraphs, EditedBy, Paragraph, ParagraphStatus,
};
use crate::translation::markers::{is_auto_marker, strip_markers, TaggedSource};
use crate::translation::pipeline::{ChunkTranslation, ParagraphTranslation};

/// Correlation strategy between translated text and paragraphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Paragraph id keyed
    ById,
    /// Chunk by chunk, in order
    BySequentialChunk,
    /// Whole text split on blank lines
    ByWholeTextSplit,
}

impl SyncStrategy {
    /// Pick the strategy for a pipeline output.
    pub fn resolve(input: &SyncInput) -> Self {
        let mut successful = input.chunks.iter().filter(|c| c.is_success()).peekable();

        if successful.peek().is_some() && successful.all(|c| c.has_paragraph_ids()) {
            SyncStrategy::ById
        } else if !input.chunks.is_empty() {
            SyncStrategy::BySequentialChunk
        } else {
            SyncStrategy::ByWholeTextSplit
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStrategy::ById => write!(f, "by-id"),
            SyncStrategy::BySequentialChunk => write!(f, "sequential-chunk"),
            SyncStrategy::ByWholeTextSplit => write!(f, "whole-text-split"),
        }
    }
}

/// What the pipeline produced, as seen by the synchronization engine
#[derive(Debug, Clone, Default)]
pub struct SyncInput {
    /// Markers the source was tagged with; resolves marker ids to paragraph ids
    pub markers: TaggedSource,

    /// Per-chunk translations in chunk order
    pub chunks: Vec<ChunkTranslation>,

    /// Final translated text, markers stripped
    pub full_text: String,
}

impl SyncInput {
    /// Input made of plain translated text only.
    pub fn from_text(text: &str) -> Self {
        Self {
            full_text: text.to_string(),
            ..Default::default()
        }
    }

    /// Input made of raw translated chunks without paragraph identity.
    pub fn from_chunk_texts(texts: &[&str]) -> Self {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(index, text)| ChunkTranslation {
                chunk_id: format!("chunk_{}", index),
                index,
                original: text.to_string(),
                translated: text.to_string(),
                paragraphs: Vec::new(),
                source_paragraphs: split_paragraphs(text).len(),
                continuation: false,
                leading_owner: None,
                structured: false,
                error: None,
            })
            .collect();

        Self {
            chunks,
            full_text: texts.join("\n\n"),
            ..Default::default()
        }
    }

    /// Input made of `(paragraph_id, translation)` pairs in a single chunk.
    pub fn from_paragraph_translations(pairs: &[(&str, &str)]) -> Self {
        let paragraphs: Vec<ParagraphTranslation> = pairs
            .iter()
            .map(|(id, text)| ParagraphTranslation {
                marker_id: id.to_string(),
                text: text.to_string(),
            })
            .collect();
        let full_text = pairs.iter().map(|(_, text)| *text).collect::<Vec<_>>().join("\n\n");

        Self {
            chunks: vec![ChunkTranslation {
                chunk_id: "chunk_0".to_string(),
                index: 0,
                original: String::new(),
                translated: full_text.clone(),
                source_paragraphs: paragraphs.len(),
                paragraphs,
                continuation: false,
                leading_owner: None,
                structured: true,
                error: None,
            }],
            full_text,
            ..Default::default()
        }
    }

    /// Whether the pipeline offered anything at all.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.full_text.trim().is_empty()
    }
}

/// Options of one synchronization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
    /// Never overwrite a paragraph that already has a valid translation
    pub partial: bool,

    /// Timestamp written to applied paragraphs
    pub applied_at: DateTime<Utc>,
}

impl SyncOptions {
    /// Full mode: every eligible paragraph is (re)assigned.
    pub fn full() -> Self {
        Self {
            partial: false,
            applied_at: Utc::now(),
        }
    }

    /// Partial mode: only paragraphs lacking a valid translation are assigned.
    pub fn partial() -> Self {
        Self {
            partial: true,
            applied_at: Utc::now(),
        }
    }

    /// Use a fixed timestamp.
    pub fn at(mut self, applied_at: DateTime<Utc>) -> Self {
        self.applied_at = applied_at;
        self
    }
}

/// Accounting of one synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Strategy used
    pub strategy: SyncStrategy,

    /// Paragraphs that could receive a translation
    pub eligible: usize,

    /// Paragraphs that received one
    pub applied: usize,

    /// Eligible paragraphs left without a translation
    pub missing: usize,

    /// Translations with no paragraph to go to
    pub extra: usize,

    /// Nothing was applied although there was input and work to do
    pub critical: bool,
}

impl SyncReport {
    /// Whether every eligible paragraph got exactly one translation.
    pub fn is_complete(&self) -> bool {
        self.missing == 0 && self.extra == 0 && !self.critical
    }
}

/// Result of a synchronization
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Paragraphs in their input order, same length as the input
    pub paragraphs: Vec<Paragraph>,

    /// Accounting
    pub report: SyncReport,
}

/// Whether a paragraph may receive a translation.
pub fn is_eligible(paragraph: &Paragraph, partial: bool) -> bool {
    if paragraph.is_separator() {
        return false;
    }
    if !partial {
        return true;
    }

    let has_reviewed_text = paragraph.status.is_human_reviewed()
        && paragraph.translated_text.as_deref().is_some_and(|t| !t.trim().is_empty());
    !paragraph.has_valid_translation() && !has_reviewed_text
}

/// Reconcile pipeline output with a paragraph list.
///
/// Total and deterministic for a fixed `options.applied_at`.
pub fn sync_paragraphs(paragraphs: &[Paragraph], input: &SyncInput, options: &SyncOptions) -> SyncOutcome {
    let strategy = SyncStrategy::resolve(input);
    let mut updated = paragraphs.to_vec();

    let mut order: Vec<usize> = (0..updated.len()).collect();
    order.sort_by_key(|&i| updated[i].index);
    let eligible: Vec<usize> = order
        .into_iter()
        .filter(|&i| is_eligible(&updated[i], options.partial))
        .collect();

    let mut report = SyncReport {
        strategy,
        eligible: eligible.len(),
        applied: 0,
        missing: 0,
        extra: 0,
        critical: false,
    };

    debug!(
        "Synchronizing {} paragraph(s), {} eligible, strategy {}",
        updated.len(),
        eligible.len(),
        strategy
    );

    match strategy {
        SyncStrategy::ById => {
            let by_id = translations_by_paragraph(input);
            let eligible_ids: HashSet<&str> = eligible.iter().map(|&i| paragraphs[i].id.as_str()).collect();
            // Separators are tagged with the rest of the source but take no part in accounting
            let separator_ids: HashSet<&str> = paragraphs
                .iter()
                .filter(|p| p.is_separator())
                .map(|p| p.id.as_str())
                .collect();
            report.extra = by_id
                .keys()
                .filter(|id| !eligible_ids.contains(id.as_str()) && !separator_ids.contains(id.as_str()))
                .count();

            for &i in &eligible {
                match by_id.get(&updated[i].id) {
                    Some(text) if is_valid_translation(text) => {
                        apply(&mut updated[i], text, options.applied_at);
                        report.applied += 1;
                    }
                    _ => report.missing += 1,
                }
            }

            if report.missing > 0 {
                warn!(
                    "{} of {} eligible paragraph(s) got no translation by id",
                    report.missing,
                    eligible.len()
                );
            }
        }
        SyncStrategy::BySequentialChunk | SyncStrategy::ByWholeTextSplit => {
            let slots = if strategy == SyncStrategy::BySequentialChunk {
                sequential_slots(&input.chunks)
            } else {
                whole_text_slots(&input.full_text)
            };

            if slots.len() != eligible.len() {
                warn!(
                    "Paragraph count mismatch: {} translated segment(s) for {} eligible paragraph(s)",
                    slots.len(),
                    eligible.len()
                );
            }

            for (slot, &i) in slots.iter().zip(eligible.iter()) {
                if let Some(text) = slot {
                    apply(&mut updated[i], text, options.applied_at);
                    report.applied += 1;
                }
            }

            report.missing = eligible.len() - report.applied;
            report.extra = slots.len().saturating_sub(eligible.len());
        }
    }

    if report.applied == 0 && report.eligible > 0 {
        if input.is_empty() {
            warn!("Nothing to synchronize for {} eligible paragraph(s)", report.eligible);
        } else {
            report.critical = true;
            error!(
                "Critical synchronization failure: no translation applied to {} eligible paragraph(s)",
                report.eligible
            );
        }
    } else {
        info!(
            "Synchronized {}/{} paragraph(s) using {}",
            report.applied, report.eligible, strategy
        );
    }

    SyncOutcome {
        paragraphs: updated,
        report,
    }
}

fn apply(paragraph: &mut Paragraph, text: &str, applied_at: DateTime<Utc>) {
    paragraph.translated_text = Some(text.trim().to_string());
    paragraph.status = ParagraphStatus::Translated;
    paragraph.edited_by = Some(EditedBy::Ai);
    paragraph.edited_at = Some(applied_at);
}

fn ordered_chunks(chunks: &[ChunkTranslation]) -> Vec<&ChunkTranslation> {
    let mut ordered: Vec<&ChunkTranslation> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);
    ordered
}

/// Paragraph id to translation; fragments of one paragraph are joined with a space.
fn translations_by_paragraph(input: &SyncInput) -> HashMap<String, String> {
    let mut by_marker: HashMap<String, String> = HashMap::new();

    for chunk in ordered_chunks(&input.chunks).into_iter().filter(|c| c.is_success()) {
        for paragraph in &chunk.paragraphs {
            by_marker
                .entry(paragraph.marker_id.clone())
                .and_modify(|text| {
                    text.push(' ');
                    text.push_str(paragraph.text.trim());
                })
                .or_insert_with(|| paragraph.text.trim().to_string());
        }
    }

    let untagged = input.markers.assignments.is_empty();
    let mut by_paragraph = HashMap::with_capacity(by_marker.len());

    for (marker_id, text) in by_marker {
        let paragraph_id = match input.markers.paragraph_for_marker(&marker_id) {
            Some(id) => id.to_string(),
            None if untagged && !is_auto_marker(&marker_id) => marker_id,
            None => {
                debug!("Marker '{}' maps to no stored paragraph", marker_id);
                continue;
            }
        };
        by_paragraph.insert(paragraph_id, text);
    }

    by_paragraph
}

fn segment_slot(segment: &str) -> Option<String> {
    is_valid_translation(segment).then(|| segment.to_string())
}

/// Non-separator blocks of a chunk's source
fn source_blocks(original: &str) -> usize {
    split_paragraphs(&strip_markers(original))
        .into_iter()
        .filter(|block| !is_separator(block))
        .count()
}

/// One slot per translated paragraph; `None` marks a slot whose translation failed.
fn sequential_slots(chunks: &[ChunkTranslation]) -> Vec<Option<String>> {
    let mut slots: Vec<Option<String>> = Vec::new();

    for chunk in ordered_chunks(chunks) {
        if !chunk.is_success() {
            let mut count = source_blocks(&chunk.original);
            if chunk.continuation {
                // The paragraph this chunk continues is incomplete
                count = count.saturating_sub(1);
                if let Some(last) = slots.last_mut() {
                    *last = None;
                }
            }
            slots.extend(std::iter::repeat(None).take(count));
            continue;
        }

        let text = strip_markers(&chunk.translated);
        let mut segments = split_paragraphs(&text)
            .into_iter()
            .filter(|segment| !is_separator(segment));

        if chunk.continuation {
            if let Some(first) = segments.next() {
                match slots.last_mut() {
                    Some(Some(previous)) => {
                        previous.push(' ');
                        previous.push_str(first);
                    }
                    Some(None) => {}
                    None => slots.push(segment_slot(first)),
                }
            }
        }

        slots.extend(segments.map(segment_slot));
    }

    slots
}

fn whole_text_slots(full_text: &str) -> Vec<Option<String>> {
    split_paragraphs(&strip_markers(full_text))
        .into_iter()
        .filter(|segment| !is_separator(segment))
        .map(segment_slot)
        .collect()
}
