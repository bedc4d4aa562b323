/*!
 * Tests for application configuration functionality
 */

use yantwai::app_config::{Config, LogLevel, TranslationProvider};

use crate::common::create_temp_dir;

/// Test default configuration values
#[test]
fn test_defaultConfig_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "ru");
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.pipeline.max_tokens_per_chunk, 2000);
    assert_eq!(config.pipeline.analysis_max_tokens, 4000);
    assert!(config.pipeline.prefer_structured_output);
    assert!(!config.pipeline.require_structured_output);
    assert_eq!(config.sync.min_valid_chapter_chars, 50);
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_validate_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.source_language = "xx".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.translation.provider = TranslationProvider::OpenAI;
    assert!(config.validate().is_err(), "OpenAI without an API key must be rejected");

    let mut config = Config::default();
    config.pipeline.max_tokens_per_chunk = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withEndpoints_shouldAcceptMissingSchemeAndRejectMissingHost() {
    let mut config = Config::default();
    let ollama = config
        .translation
        .available_providers
        .iter_mut()
        .find(|p| p.provider_type == "ollama")
        .unwrap();
    ollama.endpoint = "localhost:11434".to_string();
    assert!(config.validate().is_ok());

    let ollama = config
        .translation
        .available_providers
        .iter_mut()
        .find(|p| p.provider_type == "ollama")
        .unwrap();
    ollama.endpoint = "http://".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withStageOverride_shouldCheckEveryStageProvider() {
    let mut config = Config::default();
    config.translation.stage_providers.edit = Some(TranslationProvider::Anthropic);

    assert!(config.validate().is_err());
    assert_eq!(
        config.translation.providers_in_use(),
        vec![TranslationProvider::Ollama, TranslationProvider::Anthropic]
    );
}

#[test]
fn test_pipelineConfig_shouldMirrorSettings() {
    let mut config = Config::default();
    config.source_language = "zh".to_string();
    config.pipeline.max_tokens_per_chunk = 800;
    config.pipeline.require_structured_output = true;
    config.translation.common.temperature = 0.5;

    let pipeline = config.pipeline_config();

    assert_eq!(pipeline.source_language, "zh");
    assert_eq!(pipeline.chunker.max_tokens, 800);
    assert!(pipeline.require_structured_output);
    assert!((pipeline.temperature - 0.5).abs() < f32::EPSILON);
}

#[test]
fn test_loadOrCreate_shouldWriteDefaultsThenReadThemBack() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path).unwrap();
    assert!(path.exists());

    let mut edited = created.clone();
    edited.target_language = "fr".to_string();
    edited.sync.min_valid_chapter_chars = 10;
    edited.save(&path).unwrap();

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.target_language, "fr");
    assert_eq!(loaded.sync.min_valid_chapter_chars, 10);
}

#[test]
fn test_fromFile_withMinimalJson_shouldFillDefaults() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(
        &path,
        r#"{"source_language": "ko", "target_language": "en", "translation": {"provider": "anthropic"}}"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.translation.provider, TranslationProvider::Anthropic);
    assert_eq!(config.pipeline.recent_context_chars, 600);
    assert_eq!(config.translation.get_model(TranslationProvider::Anthropic), "claude-3-5-haiku-latest");
}
