/*!
 * Common test utilities for the yantwai test suite
 */

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tempfile::TempDir;

use yantwai::chapter::{ChapterService, InMemoryChapterStore};
use yantwai::providers::mock::MockProvider;
use yantwai::providers::{ProviderHandle, StageProviders};
use yantwai::translation::pipeline::PipelineConfig;
use yantwai::translation::{Paragraph, ParagraphStatus};

/// Words used to build random sentences
const WORDS: &[&str] = &[
    "the", "river", "sword", "moon", "quietly", "master", "village", "ancient", "storm", "walked",
    "whispered", "gate", "lantern", "mountain", "disciple", "shadow", "tea", "promise",
];

/// Route library logs through the test harness; safe to call from every test
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a temporary directory for test files
pub fn create_temp_dir() -> std::io::Result<TempDir> {
    TempDir::new()
}

/// Fixed timestamp for deterministic synchronization
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Paragraphs `p0`, `p1`, ... over the given texts, all pending
pub fn paragraphs(texts: &[&str]) -> Vec<Paragraph> {
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| Paragraph::new(format!("p{}", index), index, *text))
        .collect()
}

/// Same as `paragraphs` with a translation already in place
pub fn translated(paragraph: Paragraph, text: &str, status: ParagraphStatus) -> Paragraph {
    paragraph.with_translation(text, status)
}

/// Stage providers that all share one mock
pub fn mock_providers(provider: MockProvider) -> StageProviders {
    StageProviders::uniform(ProviderHandle::json_capable(provider))
}

/// Stage providers limited to free text
pub fn text_only_providers(provider: MockProvider) -> StageProviders {
    StageProviders::uniform(ProviderHandle::text_only(provider))
}

/// Chapter service over an in-memory store
pub fn in_memory_service(providers: StageProviders) -> ChapterService {
    ChapterService::new(
        Arc::new(InMemoryChapterStore::new()),
        Arc::new(providers),
        PipelineConfig::new("en", "ru"),
    )
}

/// One capitalised sentence of `words` words
pub fn random_sentence(rng: &mut StdRng, words: usize) -> String {
    let mut parts: Vec<String> = (0..words.max(1))
        .map(|_| WORDS[rng.random_range(0..WORDS.len())].to_string())
        .collect();
    let mut first = parts[0].chars();
    parts[0] = match first.next() {
        Some(c) => c.to_uppercase().chain(first).collect(),
        None => String::new(),
    };
    format!("{}.", parts.join(" "))
}

/// Random chapter text: paragraphs of sentences, with the odd separator
pub fn random_chapter(seed: u64, paragraphs: usize) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut blocks = Vec::with_capacity(paragraphs);

    for _ in 0..paragraphs {
        if rng.random_range(0..10) == 0 {
            blocks.push("***".to_string());
            continue;
        }
        let sentences = rng.random_range(1..12);
        let words = rng.random_range(3..15);
        let paragraph = (0..sentences)
            .map(|_| random_sentence(&mut rng, words))
            .collect::<Vec<_>>()
            .join(" ");
        blocks.push(paragraph);
    }

    blocks.join("\n\n")
}
