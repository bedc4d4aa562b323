/*!
 * Property tests for chunking and merging over seeded random chapters
 */

use yantwai::translation::chunker::reassemble_chunks;
use yantwai::translation::document::split_paragraphs;
use yantwai::translation::{merge_chunks, Chunker, ChunkerConfig};

use crate::common::random_chapter;

const BUDGETS: &[usize] = &[1, 3, 8, 25, 60, 200, 2000];

fn words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

#[test]
fn test_chunkThenMerge_forRandomChapters_shouldKeepEveryWordOnce() {
    for seed in 0..40 {
        let text = random_chapter(seed, 12);

        for &budget in BUDGETS {
            for preserve in [true, false] {
                let chunker = Chunker::new(ChunkerConfig::with_max_tokens(budget).with_preserve_paragraphs(preserve));
                let chunks = chunker.chunk(&text).unwrap();
                let merged = merge_chunks(&chunks).unwrap();

                assert_eq!(
                    words(&merged),
                    words(&text),
                    "seed {} budget {} preserve {}",
                    seed,
                    budget,
                    preserve
                );
            }
        }
    }
}

#[test]
fn test_chunkThenReassemble_shouldRestoreParagraphLayout() {
    for seed in 100..130 {
        let text = random_chapter(seed, 8);
        let normalized = split_paragraphs(&text).join("\n\n");

        for &budget in BUDGETS {
            let chunks = Chunker::new(ChunkerConfig::with_max_tokens(budget)).chunk(&text).unwrap();

            assert_eq!(reassemble_chunks(&chunks).unwrap(), normalized, "seed {} budget {}", seed, budget);
        }
    }
}

#[test]
fn test_chunk_forAnyInput_shouldProduceContiguousIndices() {
    for seed in 0..40 {
        let text = random_chapter(seed, 10);

        for &budget in BUDGETS {
            let chunks = Chunker::new(ChunkerConfig::with_max_tokens(budget)).chunk(&text).unwrap();

            for (position, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, position);
                assert_eq!(chunk.id, format!("chunk_{}", position));
            }
        }
    }
}

#[test]
fn test_chunk_shouldRespectBudgetUnlessSingleSentence() {
    for seed in 0..20 {
        let text = random_chapter(seed, 10);

        for &budget in &[25usize, 60, 200] {
            let chunks = Chunker::new(ChunkerConfig::with_max_tokens(budget)).chunk(&text).unwrap();

            for chunk in &chunks {
                let within_budget = chunk.content.chars().count() <= budget * 4;
                let single_sentence = !chunk.content.trim_end_matches('.').contains(". ");
                assert!(
                    within_budget || single_sentence,
                    "chunk {} of seed {} exceeds {} tokens",
                    chunk.index,
                    seed,
                    budget
                );
            }
        }
    }
}

#[test]
fn test_chunk_overlapContext_shouldNeverBeMergedIntoContent() {
    let long_paragraph = (0..40)
        .map(|i| format!("Sentence number {} ends here.", i))
        .collect::<Vec<_>>()
        .join(" ");
    let chunker = Chunker::new(ChunkerConfig::with_max_tokens(30).with_overlap(2));

    let chunks = chunker.chunk(&long_paragraph).unwrap();
    let merged = merge_chunks(&chunks).unwrap();

    assert!(chunks.len() > 1);
    assert!(chunks[0].overlap_context.is_none());
    assert!(chunks[1..].iter().all(|c| c.continuation && c.overlap_context.is_some()));
    assert_eq!(words(&merged), words(&long_paragraph));
}

#[test]
fn test_mergeChunks_withShuffledInput_shouldFollowIndexNotPosition() {
    let text = random_chapter(7, 10);
    let mut chunks = Chunker::new(ChunkerConfig::with_max_tokens(20)).chunk(&text).unwrap();
    let expected = merge_chunks(&chunks).unwrap();

    chunks.reverse();

    assert_eq!(merge_chunks(&chunks).unwrap(), expected);
}
