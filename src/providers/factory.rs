/*!
 * Construction of stage providers from configuration.
 */

use log::info;
use std::fmt::Debug;

use super::anthropic::Anthropic;
use super::ollama::Ollama;
use super::openai::OpenAI;
use super::{ProviderHandle, RequestPolicy, StageProviders};
use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

/// Builds the stage providers for a project.
pub trait ProviderFactory: Send + Sync + Debug {
    /// Build providers for `project_id`
    fn build(&self, project_id: &str) -> Result<StageProviders, ProviderError>;
}

/// Fixed providers, whatever the project
impl ProviderFactory for StageProviders {
    fn build(&self, _project_id: &str) -> Result<StageProviders, ProviderError> {
        Ok(self.clone())
    }
}

/// Factory reading the translation section of the configuration
#[derive(Debug, Clone)]
pub struct ConfigProviderFactory {
    config: TranslationConfig,
}

impl ConfigProviderFactory {
    /// Create a factory over a translation configuration
    pub fn new(config: TranslationConfig) -> Self {
        Self { config }
    }

    /// Build the handle for one provider type
    pub fn build_handle(&self, provider: TranslationProvider) -> Result<ProviderHandle, ProviderError> {
        let common = &self.config.common;
        let policy = RequestPolicy::new(
            common.retry_count,
            common.retry_backoff_ms,
            self.config.get_rate_limit(provider),
        );
        let model = self.config.get_model(provider);
        let endpoint = self.config.get_endpoint(provider);
        let timeout_secs = self.config.get_timeout_secs(provider);
        let api_key = self.config.get_api_key(provider);

        if provider.requires_api_key() && api_key.trim().is_empty() {
            return Err(ProviderError::AuthenticationError(format!(
                "No API key configured for {}",
                provider.display_name()
            )));
        }

        let handle = match provider {
            TranslationProvider::Ollama => {
                ProviderHandle::json_capable(Ollama::new(endpoint, model, timeout_secs, policy))
            }
            TranslationProvider::OpenAI => ProviderHandle::json_capable(OpenAI::new(
                api_key,
                endpoint,
                model,
                timeout_secs,
                policy,
            )),
            TranslationProvider::LMStudio => {
                ProviderHandle::json_capable(OpenAI::lm_studio(endpoint, model, timeout_secs, policy))
            }
            TranslationProvider::Anthropic => ProviderHandle::text_only(Anthropic::new(
                api_key,
                endpoint,
                model,
                timeout_secs,
                policy,
            )),
        };

        Ok(handle)
    }
}

impl ProviderFactory for ConfigProviderFactory {
    fn build(&self, project_id: &str) -> Result<StageProviders, ProviderError> {
        let analyze_type = self.config.analyze_provider();
        let translate_type = self.config.translate_provider();
        let edit_type = self.config.edit_provider();

        let translate = self.build_handle(translate_type)?;
        // Stages sharing a provider type share the client
        let reuse_or_build = |provider: TranslationProvider| {
            if provider == translate_type {
                Ok(translate.clone())
            } else {
                self.build_handle(provider)
            }
        };
        let analyze = reuse_or_build(analyze_type)?;
        let edit = reuse_or_build(edit_type)?;

        info!(
            "Built providers for project {}: analyze={}, translate={}, edit={}",
            project_id,
            analyze.name(),
            translate.name(),
            edit.name()
        );

        Ok(StageProviders {
            analyze,
            translate,
            edit,
        })
    }
}
