use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::translation::chunker::ChunkerConfig;
use crate::translation::pipeline::PipelineConfig;

/// Settings for translating chapters, read from a JSON file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language of the stored chapters
    pub source_language: String,

    /// Language to translate into
    pub target_language: String,

    /// Providers and request tuning
    pub translation: TranslationConfig,

    /// Pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Paragraph synchronization tuning
    #[serde(default)]
    pub sync: SyncSettings,

    /// SQLite database file; defaults to the user data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Logger verbosity
    #[serde(default)]
    pub log_level: LogLevel,
}

/// LLM backend kinds
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    #[default]
    Ollama,
    OpenAI,
    // Free text only, no JSON mode
    Anthropic,
    // Local OpenAI-compatible server
    LMStudio,
}

impl TranslationProvider {
    /// Name for messages
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::LMStudio => "LM Studio",
        }
    }

    /// Key used in the config file
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic)
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Connection settings of one backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(default = "String::new")]
    pub model: String,

    #[serde(default = "String::new")]
    pub api_key: String,

    /// Base URL; empty means the backend default
    #[serde(default = "String::new")]
    pub endpoint: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Requests per minute
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    /// Defaults for `provider_type`
    pub fn new(provider_type: TranslationProvider) -> Self {
        match provider_type {
            TranslationProvider::Ollama => Self {
                provider_type: "ollama".to_string(),
                model: default_ollama_model(),
                api_key: String::new(),
                endpoint: default_ollama_endpoint(),
                timeout_secs: default_local_timeout_secs(),
                rate_limit: None,
            },
            TranslationProvider::OpenAI => Self {
                provider_type: "openai".to_string(),
                model: default_openai_model(),
                api_key: String::new(),
                endpoint: default_openai_endpoint(),
                timeout_secs: default_timeout_secs(),
                rate_limit: Some(60),
            },
            TranslationProvider::Anthropic => Self {
                provider_type: "anthropic".to_string(),
                model: default_anthropic_model(),
                api_key: String::new(),
                endpoint: default_anthropic_endpoint(),
                timeout_secs: default_timeout_secs(),
                // Slightly below the 50 requests per minute API limit
                rate_limit: Some(45),
            },
            TranslationProvider::LMStudio => Self {
                provider_type: "lmstudio".to_string(),
                model: default_lmstudio_model(),
                api_key: String::new(),
                endpoint: default_lmstudio_endpoint(),
                timeout_secs: default_local_timeout_secs(),
                rate_limit: None,
            },
        }
    }
}

/// Per-stage provider overrides; unset stages use `translation.provider`
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct StageProviderOverrides {
    /// Provider for the analysis stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyze: Option<TranslationProvider>,

    /// Provider for the translation stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate: Option<TranslationProvider>,

    /// Provider for the editing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<TranslationProvider>,
}

/// Backend selection
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Provider of every stage without an override
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Per-backend settings
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Per-stage overrides of `provider`
    #[serde(default)]
    pub stage_providers: StageProviderOverrides,

    /// Request tuning shared by all backends
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Request tuning shared by all backends
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Extra attempts after a retryable failure
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output token budget per request
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Chunking and stage switches for the translation pipeline
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Token budget per chunk
    #[serde(default = "default_max_tokens_per_chunk")]
    pub max_tokens_per_chunk: usize,

    /// Sentences carried as context into the next sentence-split chunk
    #[serde(default = "default_overlap_sentences")]
    pub overlap_sentences: usize,

    /// Respect blank-line paragraph boundaries when chunking
    #[serde(default = "default_true")]
    pub preserve_paragraphs: bool,

    /// Token budget per analysis chunk
    #[serde(default = "default_analysis_max_tokens")]
    pub analysis_max_tokens: usize,

    /// Use JSON mode when the provider supports it
    #[serde(default = "default_true")]
    pub prefer_structured_output: bool,

    /// Refuse to run when the translate provider cannot do JSON mode
    #[serde(default)]
    pub require_structured_output: bool,

    /// Skip the analysis stage
    #[serde(default)]
    pub skip_analysis: bool,

    /// Skip the editing stage
    #[serde(default)]
    pub skip_editing: bool,

    /// Characters of the previous translated chunk given as context
    #[serde(default = "default_recent_context_chars")]
    pub recent_context_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: default_max_tokens_per_chunk(),
            overlap_sentences: default_overlap_sentences(),
            preserve_paragraphs: true,
            analysis_max_tokens: default_analysis_max_tokens(),
            prefer_structured_output: true,
            require_structured_output: false,
            skip_analysis: false,
            skip_editing: false,
            recent_context_chars: default_recent_context_chars(),
        }
    }
}

impl PipelineSettings {
    /// Chunker options for the translate and edit stages
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig::with_max_tokens(self.max_tokens_per_chunk)
            .with_overlap(self.overlap_sentences)
            .with_preserve_paragraphs(self.preserve_paragraphs)
    }
}

/// Paragraph synchronization settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Minimum length of a chapter translation considered usable
    #[serde(default = "default_min_valid_chapter_chars")]
    pub min_valid_chapter_chars: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_valid_chapter_chars: default_min_valid_chapter_chars(),
        }
    }
}

/// Logger verbosity
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching `log` filter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Endpoint as a URL; a missing scheme means plain http
fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(anyhow!("Endpoint cannot be empty"));
    }

    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };

    if url.host_str().is_none() {
        return Err(anyhow!("Endpoint has no host: {}", endpoint));
    }

    Ok(url)
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_local_timeout_secs() -> u64 {
    // Local models are slow on long chunks
    300
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    // Doubled on each retry
    1000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_max_tokens_per_chunk() -> usize {
    2000
}

fn default_overlap_sentences() -> usize {
    2
}

fn default_analysis_max_tokens() -> usize {
    4000
}

fn default_recent_context_chars() -> usize {
    600
}

fn default_min_valid_chapter_chars() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_lmstudio_endpoint() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_ollama_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_lmstudio_model() -> String {
    // Must match the model loaded in LM Studio
    "local-model".to_string()
}

impl Config {
    /// Load the configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Load the configuration, writing a default file first when none exists
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Created default configuration at {}", path.display());
            return Ok(config);
        }

        Self::from_file(path)
    }

    /// Check languages, keys of the providers in use, and budgets
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::validate_language_code(&self.source_language)
            .with_context(|| format!("Invalid source language: {}", self.source_language))?;
        crate::language_utils::validate_language_code(&self.target_language)
            .with_context(|| format!("Invalid target language: {}", self.target_language))?;

        for provider in self.translation.providers_in_use() {
            if provider.requires_api_key() && self.translation.get_api_key(provider).is_empty() {
                return Err(anyhow!(
                    "Translation API key is required for {} provider",
                    provider.display_name()
                ));
            }
            parse_endpoint(&self.translation.get_endpoint(provider))
                .with_context(|| format!("Invalid endpoint for {} provider", provider.display_name()))?;
        }

        if self.pipeline.max_tokens_per_chunk == 0 {
            return Err(anyhow!("pipeline.max_tokens_per_chunk must be greater than zero"));
        }

        if self.pipeline.analysis_max_tokens == 0 {
            return Err(anyhow!("pipeline.analysis_max_tokens must be greater than zero"));
        }

        Ok(())
    }

    /// Pipeline configuration derived from the settings
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            chunker: self.pipeline.chunker_config(),
            analysis_max_tokens: self.pipeline.analysis_max_tokens,
            prefer_structured_output: self.pipeline.prefer_structured_output,
            require_structured_output: self.pipeline.require_structured_output,
            recent_context_chars: self.pipeline.recent_context_chars,
            temperature: self.translation.common.temperature,
            max_output_tokens: self.translation.common.max_output_tokens,
        }
    }

    /// Database location, falling back to the user data directory
    pub fn resolve_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }

        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("yantwai")
            .join("yantwai.db")
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "ru".to_string(),
            translation: TranslationConfig::default(),
            pipeline: PipelineSettings::default(),
            sync: SyncSettings::default(),
            database_path: None,
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Provider used by the analysis stage
    pub fn analyze_provider(&self) -> TranslationProvider {
        self.stage_providers.analyze.unwrap_or(self.provider)
    }

    /// Provider used by the translation stage
    pub fn translate_provider(&self) -> TranslationProvider {
        self.stage_providers.translate.unwrap_or(self.provider)
    }

    /// Provider used by the editing stage
    pub fn edit_provider(&self) -> TranslationProvider {
        self.stage_providers.edit.unwrap_or(self.provider)
    }

    /// Distinct providers referenced by any stage
    pub fn providers_in_use(&self) -> Vec<TranslationProvider> {
        let mut providers = Vec::new();
        for provider in [
            self.analyze_provider(),
            self.translate_provider(),
            self.edit_provider(),
        ] {
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
        providers
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for a provider
    pub fn get_model(&self, provider: TranslationProvider) -> String {
        if let Some(provider_config) = self.get_provider_config(provider) {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        ProviderConfig::new(provider).model
    }

    /// Get the API key for a provider
    pub fn get_api_key(&self, provider: TranslationProvider) -> String {
        self.get_provider_config(provider)
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for a provider
    pub fn get_endpoint(&self, provider: TranslationProvider) -> String {
        if let Some(provider_config) = self.get_provider_config(provider) {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        ProviderConfig::new(provider).endpoint
    }

    /// Get the request timeout for a provider
    pub fn get_timeout_secs(&self, provider: TranslationProvider) -> u64 {
        self.get_provider_config(provider)
            .map(|p| p.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or_else(|| ProviderConfig::new(provider).timeout_secs)
    }

    /// Get the rate limit for a provider
    pub fn get_rate_limit(&self, provider: TranslationProvider) -> Option<u32> {
        match self.get_provider_config(provider) {
            Some(provider_config) => provider_config.rate_limit,
            None => ProviderConfig::new(provider).rate_limit,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::LMStudio),
            ],
            stage_providers: StageProviderOverrides::default(),
            common: TranslationCommonConfig::default(),
        }
    }
}
