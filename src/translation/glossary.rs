/*!
 * Glossary adapter.
 *
 * Terminology management lives outside the translation core. The core only
 * needs a source of prompt text, which it injects verbatim into stage prompts
 * without interpreting it.
 */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// Anything that can render terminology guidance for a prompt.
pub trait GlossarySource: Send + Sync + Debug {
    /// Render the glossary as prompt text. Empty means "no glossary".
    fn to_prompt_text(&self) -> String;
}

/// A single glossary term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    /// Term in the source language
    pub source: String,

    /// Required rendering in the target language
    pub target: String,

    /// Optional usage note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// In-memory glossary of terms and character names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glossary {
    /// Terms keyed by source text
    #[serde(default)]
    pub terms: BTreeMap<String, GlossaryTerm>,

    /// Character names with their fixed transliteration (empty when kept as-is)
    #[serde(default)]
    pub characters: BTreeMap<String, String>,

    /// Free-form style rules
    #[serde(default)]
    pub style_rules: BTreeSet<String>,
}

impl Glossary {
    /// Create a new empty glossary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a term to the glossary.
    pub fn add_term(&mut self, source: &str, target: &str, note: Option<&str>) {
        self.terms.insert(
            source.to_string(),
            GlossaryTerm {
                source: source.to_string(),
                target: target.to_string(),
                note: note.map(|s| s.to_string()),
            },
        );
    }

    /// Add a character name and its rendering.
    pub fn add_character(&mut self, name: &str, rendering: &str) {
        self.characters.insert(name.to_string(), rendering.to_string());
    }

    /// Add a style rule.
    pub fn add_style_rule(&mut self, rule: &str) {
        self.style_rules.insert(rule.to_string());
    }

    /// Merge another glossary into this one; entries from `other` win.
    pub fn merge(&mut self, other: &Glossary) {
        for (key, term) in &other.terms {
            self.terms.insert(key.clone(), term.clone());
        }
        for (name, rendering) in &other.characters {
            self.characters.insert(name.clone(), rendering.clone());
        }
        for rule in &other.style_rules {
            self.style_rules.insert(rule.clone());
        }
    }

    /// Check if the glossary is empty.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.characters.is_empty() && self.style_rules.is_empty()
    }
}

impl GlossarySource for Glossary {
    fn to_prompt_text(&self) -> String {
        let mut lines = Vec::new();

        if !self.characters.is_empty() {
            lines.push("Characters:".to_string());
            for (name, rendering) in &self.characters {
                if rendering.is_empty() || rendering == name {
                    lines.push(format!("- {}", name));
                } else {
                    lines.push(format!("- {} → {}", name, rendering));
                }
            }
        }

        if !self.terms.is_empty() {
            lines.push("Terms:".to_string());
            for term in self.terms.values() {
                match &term.note {
                    Some(note) => lines.push(format!("- {} → {} ({})", term.source, term.target, note)),
                    None => lines.push(format!("- {} → {}", term.source, term.target)),
                }
            }
        }

        if !self.style_rules.is_empty() {
            lines.push("Style:".to_string());
            lines.extend(self.style_rules.iter().map(|r| format!("- {}", r)));
        }

        lines.join("\n")
    }
}
