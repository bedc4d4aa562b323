/*!
 * Property tests for paragraph synchronization
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use yantwai::translation::sync::{is_eligible, SyncStrategy};
use yantwai::translation::{sync_paragraphs, Paragraph, ParagraphStatus, SyncInput, SyncOptions};

use crate::common::{fixed_time, paragraphs, random_sentence};

/// Random paragraph list with a mix of statuses, separators and broken translations
fn random_paragraphs(rng: &mut StdRng, count: usize) -> Vec<Paragraph> {
    (0..count)
        .map(|index| {
            let original = if rng.random_range(0..8) == 0 {
                "***".to_string()
            } else {
                random_sentence(rng, 6)
            };
            let paragraph = Paragraph::new(format!("p{}", index), index, original);

            match rng.random_range(0..6) {
                0 => paragraph,
                1 => paragraph.with_translation("Перевод.", ParagraphStatus::Translated),
                2 => paragraph.with_translation("Правка.", ParagraphStatus::Edited),
                3 => paragraph.with_translation("Одобрено.", ParagraphStatus::Approved),
                4 => paragraph.with_translation("[ERROR: timeout]", ParagraphStatus::Translated),
                _ => paragraph.with_translation("   ", ParagraphStatus::Pending),
            }
        })
        .collect()
}

/// Random pipeline output of one of the three shapes
fn random_input(rng: &mut StdRng, paragraphs: &[Paragraph]) -> SyncInput {
    let produced = rng.random_range(0..paragraphs.len() + 3);
    let texts: Vec<String> = (0..produced).map(|i| format!("Новый {}.", i)).collect();

    match rng.random_range(0..3) {
        0 => SyncInput::from_text(&texts.join("\n\n")),
        1 => {
            let split = texts.len() / 2;
            let first = texts[..split].join("\n\n");
            let second = texts[split..].join("\n\n");
            SyncInput::from_chunk_texts(&[first.as_str(), second.as_str()])
        }
        _ => {
            let ids: Vec<String> = (0..produced).map(|i| format!("p{}", i)).collect();
            let pairs: Vec<(&str, &str)> = ids
                .iter()
                .zip(texts.iter())
                .map(|(id, text)| (id.as_str(), text.as_str()))
                .collect();
            SyncInput::from_paragraph_translations(&pairs)
        }
    }
}

#[test]
fn test_sync_forRandomInputs_shouldNeverLoseParagraphs() {
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..300 {
        let count = rng.random_range(0..12);
        let list = random_paragraphs(&mut rng, count);
        let input = random_input(&mut rng, &list);
        let options = if rng.random_bool(0.5) { SyncOptions::partial() } else { SyncOptions::full() };

        let outcome = sync_paragraphs(&list, &input, &options);

        assert_eq!(outcome.paragraphs.len(), list.len());
        for (before, after) in list.iter().zip(outcome.paragraphs.iter()) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.index, after.index);
            assert_eq!(before.original_text, after.original_text);
        }
    }
}

#[test]
fn test_partialSync_shouldNeverTouchReviewedParagraphs() {
    let mut rng = StdRng::seed_from_u64(23);

    for _ in 0..300 {
        let count = rng.random_range(1..12);
        let list = random_paragraphs(&mut rng, count);
        let input = random_input(&mut rng, &list);

        let outcome = sync_paragraphs(&list, &input, &SyncOptions::partial().at(fixed_time()));

        for (before, after) in list.iter().zip(outcome.paragraphs.iter()) {
            let reviewed = before.status.is_human_reviewed()
                && before.translated_text.as_deref().is_some_and(|t| !t.trim().is_empty());
            if reviewed || before.has_valid_translation() {
                assert_eq!(before, after);
            }
        }
    }
}

#[test]
fn test_partialSync_runTwiceWithoutNewTranslations_shouldBeNoOp() {
    let mut rng = StdRng::seed_from_u64(37);

    for _ in 0..200 {
        let count = rng.random_range(1..12);
        let list = random_paragraphs(&mut rng, count);
        let input = random_input(&mut rng, &list);
        let options = SyncOptions::partial().at(fixed_time());

        let once = sync_paragraphs(&list, &input, &options).paragraphs;
        let twice = sync_paragraphs(&once, &SyncInput::default(), &options).paragraphs;

        assert_eq!(once, twice);
    }
}

#[test]
fn test_sync_separators_shouldNeverReceiveTranslation() {
    let mut rng = StdRng::seed_from_u64(41);

    for _ in 0..200 {
        let count = rng.random_range(1..12);
        let list = random_paragraphs(&mut rng, count);
        let input = random_input(&mut rng, &list);

        let outcome = sync_paragraphs(&list, &input, &SyncOptions::full());

        for (before, after) in list.iter().zip(outcome.paragraphs.iter()) {
            if before.is_separator() {
                assert_eq!(before, after);
            }
        }
    }
}

#[test]
fn test_sync_shouldBeDeterministicForFixedTimestamp() {
    let mut rng = StdRng::seed_from_u64(53);
    let list = random_paragraphs(&mut rng, 10);
    let input = random_input(&mut rng, &list);
    let options = SyncOptions::full().at(fixed_time());

    let first = sync_paragraphs(&list, &input, &options);
    let second = sync_paragraphs(&list, &input, &options);

    assert_eq!(first.paragraphs, second.paragraphs);
    assert_eq!(first.report, second.report);
}

#[test]
fn test_isEligible_shouldFollowModeAndReviewState() {
    let list = paragraphs(&["One.", "---"]);
    let approved_blank = list[0].clone().with_translation("", ParagraphStatus::Approved);
    let edited = list[0].clone().with_translation("Правка.", ParagraphStatus::Edited);

    assert!(is_eligible(&list[0], true));
    assert!(!is_eligible(&list[1], false));
    assert!(is_eligible(&approved_blank, true));
    assert!(!is_eligible(&edited, true));
    assert!(is_eligible(&edited, false));
}

#[test]
fn test_sync_report_shouldCountMissingAndExtra() {
    let list = paragraphs(&["One.", "Two.", "Three."]);

    let short = sync_paragraphs(&list, &SyncInput::from_text("Один."), &SyncOptions::full());
    let long = sync_paragraphs(&list, &SyncInput::from_text("А.\n\nБ.\n\nВ.\n\nГ."), &SyncOptions::full());

    assert_eq!(short.report.strategy, SyncStrategy::ByWholeTextSplit);
    assert_eq!((short.report.applied, short.report.missing), (1, 2));
    assert_eq!((long.report.applied, long.report.extra), (3, 1));
    assert!(!short.report.is_complete());
}
