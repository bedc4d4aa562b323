/*!
 * Prompt templates for the translation pipeline stages.
 *
 * Every stage gets a system prompt rendered with the language pair and a
 * user message carrying the context sections followed by the framed payload.
 */

use crate::language_utils;
use crate::providers::ChatMessage;

use super::wrap_payload;

/// System prompt template with `{source_language}` / `{target_language}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Analysis stage: extract names, terms and style.
    pub const ANALYZER: &'static str = r#"You are a literary analyst preparing a {source_language} novel chapter for translation into {target_language}.

## Your Task
- List the characters that appear, with a suggested {target_language} rendering of each name
- List recurring terms (titles, places, techniques, items) with a suggested rendering
- Describe the narrative voice and register in one or two sentences
- Summarize the events of the excerpt in a few sentences

## Output Requirements
Return a single JSON object:
{"characters": [{"name": "...", "rendering": "...", "description": "..."}],
 "terms": [{"source": "...", "target": "...", "note": "..."}],
 "style": "...",
 "summary": "..."}"#;

    /// Translation stage.
    pub const TRANSLATOR: &'static str = r#"You are a professional literary translator working from {source_language} into {target_language}.

## Rules
- Translate every paragraph completely; never summarize or skip content
- Each paragraph starts with a marker like --para:abc123--. Keep every marker exactly as written, in the same order, at the start of its paragraph
- Keep paragraphs separated by a blank line
- Follow the glossary strictly for names and key terms
- Keep scene separators such as *** unchanged
- Write natural, idiomatic {target_language} that preserves tone and register"#;

    /// Extra rules when the translation stage asks for JSON.
    pub const TRANSLATOR_JSON: &'static str = r#"## Output Requirements
Return ONLY a JSON object of the form
{"paragraphs": [{"id": "--para:abc123--", "translated": "..."}]}
with exactly one entry per marker, in source order."#;

    /// Editing stage.
    pub const EDITOR: &'static str = r#"You are an editor polishing a {target_language} translation of a {source_language} novel.

## Rules
- Fix mistranslations, awkward phrasing and inconsistent terminology
- Do not add or remove paragraphs; keep every --para:...-- marker exactly as written and in order
- Keep the translation faithful to the original; do not rewrite for style alone
- Follow the glossary strictly for names and key terms"#;

    /// Extra rules when the editing stage asks for JSON.
    pub const EDITOR_JSON: &'static str = r#"## Output Requirements
Return ONLY a JSON object of the form
{"edited": "<full edited text with markers>",
 "changes": [{"original": "...", "edited": "...", "reason": "..."}],
 "quality_score": 0.0}"#;

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Render the template with the given languages.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

/// Context sections attached to a stage prompt
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Chapter number, for the model's orientation
    pub chapter_number: u32,

    /// Position of the chunk, 1-based, and the total chunk count
    pub part: Option<(usize, usize)>,

    /// Rendered glossary
    pub glossary: Option<String>,

    /// Rendered analysis of the chapter
    pub analysis: Option<String>,

    /// Tail of the previous chunk's translation
    pub recent_translation: Option<String>,

    /// Trailing source sentences of the previous chunk, context only
    pub overlap: Option<String>,
}

impl PromptContext {
    /// Context for one chunk of a chapter.
    pub fn for_chunk(chapter_number: u32, index: usize, total: usize) -> Self {
        Self {
            chapter_number,
            part: Some((index + 1, total)),
            ..Default::default()
        }
    }

    fn render_sections(&self) -> String {
        let mut sections = vec![match self.part {
            Some((part, total)) if total > 1 => {
                format!("Chapter {}, part {} of {}.", self.chapter_number, part, total)
            }
            _ => format!("Chapter {}.", self.chapter_number),
        }];

        let mut push = |title: &str, body: &Option<String>| {
            if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
                sections.push(format!("## {}\n{}", title, body.trim()));
            }
        };

        push("Glossary", &self.glossary);
        push("Chapter notes", &self.analysis);
        push("Previous translated passage (for continuity, do not repeat)", &self.recent_translation);
        push("Preceding source sentences (context only, do not translate)", &self.overlap);

        sections.join("\n\n")
    }
}

/// Builds chat messages for each pipeline stage.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    source_language: String,
    target_language: String,
}

impl PromptBuilder {
    /// Create a builder for a language pair given as ISO codes or names.
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: language_utils::display_name(source_language),
            target_language: language_utils::display_name(target_language),
        }
    }

    fn system(&self, parts: &[&str]) -> ChatMessage {
        let rendered: Vec<String> = parts
            .iter()
            .map(|p| PromptTemplate::new(p).render(&self.source_language, &self.target_language))
            .collect();
        ChatMessage::system(rendered.join("\n\n"))
    }

    /// Messages for analyzing one chunk of source text.
    pub fn analysis_messages(&self, text: &str, context: &PromptContext) -> Vec<ChatMessage> {
        vec![
            self.system(&[PromptTemplate::ANALYZER]),
            ChatMessage::user(format!(
                "{}\n\nAnalyze this excerpt:\n{}",
                context.render_sections(),
                wrap_payload(text)
            )),
        ]
    }

    /// Messages for translating one marker-tagged chunk.
    pub fn translation_messages(
        &self,
        tagged_text: &str,
        context: &PromptContext,
        structured: bool,
    ) -> Vec<ChatMessage> {
        let system = if structured {
            self.system(&[PromptTemplate::TRANSLATOR, PromptTemplate::TRANSLATOR_JSON])
        } else {
            self.system(&[PromptTemplate::TRANSLATOR])
        };

        vec![
            system,
            ChatMessage::user(format!(
                "{}\n\nTranslate the following text into {}:\n{}",
                context.render_sections(),
                self.target_language,
                wrap_payload(tagged_text)
            )),
        ]
    }

    /// Messages for editing one translated chunk against its original.
    pub fn edit_messages(
        &self,
        original: &str,
        translated_tagged: &str,
        context: &PromptContext,
        structured: bool,
    ) -> Vec<ChatMessage> {
        let system = if structured {
            self.system(&[PromptTemplate::EDITOR, PromptTemplate::EDITOR_JSON])
        } else {
            self.system(&[PromptTemplate::EDITOR])
        };

        vec![
            system,
            ChatMessage::user(format!(
                "{}\n\n## Original ({})\n{}\n\nEdit this translation and return the full edited text:\n{}",
                context.render_sections(),
                self.source_language,
                original.trim(),
                wrap_payload(translated_tagged)
            )),
        ]
    }
}
