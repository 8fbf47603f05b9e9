//! Chat-completion backends for quarry agents.
//!
//! One [`ChatProvider`] implementation per wire protocol: Anthropic
//! Messages, and OpenAI-style chat completions covering OpenAI, Azure, and
//! Gemini. [`ReliableProvider`] is a retry/circuit-breaker wrapper every
//! production provider is shipped inside. [`provider_for`] turns the
//! configured [`ModelSettings`] into a ready-to-use boxed provider.

pub mod anthropic;
pub mod converter;
pub mod mock;
pub mod openai;
pub mod reliable;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatProvider;
pub use reliable::{ReliableConfig, ReliableProvider};

use std::sync::Arc;

use quarry_core::config::{ConfigError, ModelProvider, ModelSettings};
use quarry_core::llm::ChatProvider;

/// Construct the configured provider, wrapped in the retry layer.
///
/// Fails with [`ConfigError::MissingApiKey`] when the provider's key
/// environment variable was not set, and with an invalid-setting error when
/// Azure is selected without an endpoint.
pub fn provider_for(settings: &ModelSettings) -> Result<Arc<dyn ChatProvider>, ConfigError> {
    let api_key = settings
        .api_key
        .clone()
        .ok_or(ConfigError::MissingApiKey(settings.provider.key_env_var()))?;

    let provider: Arc<dyn ChatProvider> = match settings.provider {
        ModelProvider::Anthropic => Arc::new(ReliableProvider::with_defaults(
            AnthropicProvider::new(api_key, &settings.model),
        )),
        ModelProvider::OpenAi => Arc::new(ReliableProvider::with_defaults(
            OpenAiCompatProvider::openai(api_key, &settings.model),
        )),
        ModelProvider::Azure => {
            let endpoint =
                settings
                    .azure_endpoint
                    .as_deref()
                    .ok_or_else(|| ConfigError::InvalidSetting {
                        name: "AZURE_OPENAI_ENDPOINT".into(),
                        reason: "required for the azure provider".into(),
                    })?;
            Arc::new(ReliableProvider::with_defaults(OpenAiCompatProvider::azure(
                api_key,
                &settings.model,
                endpoint,
                &settings.azure_api_version,
            )))
        }
        ModelProvider::Google => Arc::new(ReliableProvider::with_defaults(
            OpenAiCompatProvider::google(api_key, &settings.model),
        )),
    };

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn factory_requires_api_key() {
        let settings = ModelSettings::default();
        let err = provider_for(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey("ANTHROPIC_API_KEY")));
    }

    #[test]
    fn factory_builds_anthropic() {
        let settings = ModelSettings {
            api_key: Some(SecretString::from("k")),
            ..ModelSettings::default()
        };
        let provider = provider_for(&settings).unwrap();
        assert_eq!(provider.descriptor(), "anthropic/claude-3-7-sonnet-20250219");
    }

    #[test]
    fn factory_builds_openai() {
        let settings = ModelSettings {
            provider: ModelProvider::OpenAi,
            model: "gpt-4o".into(),
            api_key: Some(SecretString::from("k")),
            ..ModelSettings::default()
        };
        let provider = provider_for(&settings).unwrap();
        assert_eq!(provider.descriptor(), "openai/gpt-4o");
    }

    #[test]
    fn factory_requires_azure_endpoint() {
        let settings = ModelSettings {
            provider: ModelProvider::Azure,
            api_key: Some(SecretString::from("k")),
            azure_endpoint: None,
            ..ModelSettings::default()
        };
        let err = provider_for(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }

    #[test]
    fn factory_builds_google() {
        let settings = ModelSettings {
            provider: ModelProvider::Google,
            model: "gemini-2.0-flash".into(),
            api_key: Some(SecretString::from("k")),
            ..ModelSettings::default()
        };
        let provider = provider_for(&settings).unwrap();
        assert_eq!(provider.descriptor(), "google/gemini-2.0-flash");
    }
}
