/*!
 * Tests for language utility functions
 */

use yantwai::language_utils::{
    display_name, get_language_name, language_codes_match, normalize_to_part2t, validate_language_code,
};

#[test]
fn test_validateLanguageCode_withValidCodes_shouldSucceed() {
    for code in ["en", "zh", "ko", "rus", "fre", " EN ", "ENG"] {
        assert!(validate_language_code(code).is_ok(), "{} should be valid", code);
    }

    assert!(validate_language_code("xx").is_err());
    assert!(validate_language_code("123").is_err());
    assert!(validate_language_code("e").is_err());
}

#[test]
fn test_normalizeToPart2t_withValidCodes_shouldNormalizeCorrectly() {
    assert_eq!(normalize_to_part2t("en").unwrap(), "eng");
    assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("chi").unwrap(), "zho");
    assert_eq!(normalize_to_part2t(" RU ").unwrap(), "rus");
}

#[test]
fn test_languageCodesMatch_withMatchingCodes_shouldReturnTrue() {
    assert!(language_codes_match("en", "eng"));
    assert!(language_codes_match("zh", "chi"));
    assert!(!language_codes_match("en", "fr"));
}

#[test]
fn test_languageNames_shouldReadNaturallyInPrompts() {
    assert_eq!(get_language_name("ko").unwrap(), "Korean");
    assert_eq!(display_name("ru"), "Russian");
    assert_eq!(display_name("elvish"), "elvish");
}
