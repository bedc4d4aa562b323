/*!
 * Prompt engineering for chapter translation.
 *
 * This module provides:
 * - System prompt templates for the analyze, translate and edit stages
 * - Message construction with glossary, analysis and cross-chunk context
 * - Payload framing so the text to process is unambiguous inside a prompt
 */

pub mod templates;

pub use templates::{PromptBuilder, PromptContext, PromptTemplate};

/// Opening fence of the text a stage must process
pub const PAYLOAD_OPEN: &str = "<<<TEXT";

/// Closing fence of the text a stage must process
pub const PAYLOAD_CLOSE: &str = "TEXT>>>";

/// Frame `text` as the payload of a prompt.
pub fn wrap_payload(text: &str) -> String {
    format!("{}\n{}\n{}", PAYLOAD_OPEN, text, PAYLOAD_CLOSE)
}

/// Extract the framed payload from a prompt, if any.
pub fn extract_payload(prompt: &str) -> Option<&str> {
    let start = prompt.find(PAYLOAD_OPEN)? + PAYLOAD_OPEN.len();
    let end = prompt[start..].rfind(PAYLOAD_CLOSE)? + start;
    Some(prompt[start..end].trim_matches(|c| c == '\n' || c == '\r'))
}
