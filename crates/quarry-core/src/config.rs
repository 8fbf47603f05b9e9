//! Run configuration. Built once from the environment (with CLI overrides
//! applied by the caller) and threaded through constructors; nothing in the
//! workspace reads settings from a global.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE: &str = "python:3.11";
pub const DEFAULT_INIT_PACKAGES: &[&str] = &[
    "pandas",
    "numpy",
    "scikit-learn",
    "matplotlib",
    "seaborn",
    "plotly",
    "kaleido",
];
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub history_dir: PathBuf,
    pub sandbox: SandboxSettings,
    pub model: ModelSettings,
    pub max_turns: u32,
    pub interactive: bool,
    pub save_history: bool,
    pub cleanup_before_run: bool,
}

#[derive(Clone, Debug)]
pub struct SandboxSettings {
    pub image: String,
    pub init_packages: Vec<String>,
    /// Readiness deadline after the in-container package install.
    pub wait: Duration,
    /// Per-execution ceiling for one code unit.
    pub exec_timeout: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            init_packages: DEFAULT_INIT_PACKAGES.iter().map(|s| s.to_string()).collect(),
            wait: Duration::from_secs(30),
            exec_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub provider: ModelProvider,
    pub model: String,
    pub max_tokens: u32,
    pub api_key: Option<SecretString>,
    /// Azure only: resource endpoint and API version.
    pub azure_endpoint: Option<String>,
    pub azure_api_version: String,
}

impl ModelSettings {
    /// `<provider>/<model>`, as recorded in run manifests.
    pub fn descriptor(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    /// Switch providers, re-reading the API key from the new provider's
    /// environment variable.
    pub fn select_provider(&mut self, provider: ModelProvider) {
        self.provider = provider;
        self.api_key = std::env::var(provider.key_env_var())
            .ok()
            .map(SecretString::from);
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Anthropic,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            api_key: None,
            azure_endpoint: None,
            azure_api_version: DEFAULT_AZURE_API_VERSION.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    Anthropic,
    OpenAi,
    Azure,
    Google,
}

impl ModelProvider {
    /// Environment variable the provider's API key is read from.
    pub fn key_env_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Azure => "AZURE_OPENAI_API_KEY",
            Self::Google => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Azure => "azure",
            Self::Google => "google",
        };
        f.write_str(name)
    }
}

impl FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "azure" => Ok(Self::Azure),
            "google" | "gemini" => Ok(Self::Google),
            other => Err(ConfigError::InvalidSetting {
                name: "model provider".into(),
                reason: format!("unknown provider '{other}'"),
            }),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            outputs_dir: PathBuf::from("outputs"),
            history_dir: PathBuf::from("history"),
            sandbox: SandboxSettings::default(),
            model: ModelSettings::default(),
            max_turns: 20,
            interactive: true,
            save_history: true,
            cleanup_before_run: true,
        }
    }
}

impl Settings {
    /// Build settings from `QUARRY_*` environment variables, falling back to
    /// defaults. Vendor API keys use their conventional unprefixed names.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let sandbox = SandboxSettings {
            image: env_or("QUARRY_SANDBOX_IMAGE", DEFAULT_IMAGE),
            init_packages: match std::env::var("QUARRY_SANDBOX_PACKAGES") {
                Ok(list) => list.split_whitespace().map(|s| s.to_string()).collect(),
                Err(_) => defaults.sandbox.init_packages.clone(),
            },
            wait: Duration::from_secs(env_u64("QUARRY_SANDBOX_WAIT_SECS", 30)?),
            exec_timeout: Duration::from_secs(env_u64("QUARRY_SANDBOX_EXEC_TIMEOUT_SECS", 120)?),
        };

        let provider = match std::env::var("QUARRY_MODEL_PROVIDER") {
            Ok(name) => name.parse()?,
            Err(_) => ModelProvider::Anthropic,
        };
        let model = ModelSettings {
            provider,
            model: env_or("QUARRY_MODEL", DEFAULT_MODEL),
            max_tokens: env_u64("QUARRY_MAX_COMPLETION_TOKENS", 4096)? as u32,
            api_key: std::env::var(provider.key_env_var()).ok().map(SecretString::from),
            azure_endpoint: std::env::var("AZURE_OPENAI_ENDPOINT").ok(),
            azure_api_version: env_or("AZURE_API_VERSION", DEFAULT_AZURE_API_VERSION),
        };

        Ok(Self {
            data_dir: PathBuf::from(env_or("QUARRY_DATA_DIR", "data")),
            outputs_dir: PathBuf::from(env_or("QUARRY_OUTPUTS_DIR", "outputs")),
            history_dir: PathBuf::from(env_or("QUARRY_HISTORY_DIR", "history")),
            sandbox,
            model,
            max_turns: env_u64("QUARRY_MAX_TURNS", 20)? as u32,
            interactive: env_flag("QUARRY_INTERACTIVE", true)?,
            save_history: env_flag("QUARRY_SAVE_HISTORY", true)?,
            cleanup_before_run: env_flag("QUARRY_CLEANUP_BEFORE_RUN", true)?,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidSetting {
            name: name.to_string(),
            reason: format!("expected an integer, got '{value}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidSetting {
                name: name.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.max_turns, 20);
        assert!(settings.interactive);
        assert!(settings.save_history);
        assert!(settings.cleanup_before_run);
        assert_eq!(settings.sandbox.image, "python:3.11");
        assert_eq!(settings.sandbox.wait, Duration::from_secs(30));
        assert_eq!(settings.sandbox.init_packages.len(), 7);
        assert_eq!(settings.model.provider, ModelProvider::Anthropic);
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("anthropic".parse::<ModelProvider>().unwrap(), ModelProvider::Anthropic);
        assert_eq!("OpenAI".parse::<ModelProvider>().unwrap(), ModelProvider::OpenAi);
        assert_eq!("azure".parse::<ModelProvider>().unwrap(), ModelProvider::Azure);
        assert_eq!("gemini".parse::<ModelProvider>().unwrap(), ModelProvider::Google);
        assert!("mistral".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn provider_display_roundtrip() {
        for provider in [
            ModelProvider::Anthropic,
            ModelProvider::OpenAi,
            ModelProvider::Azure,
            ModelProvider::Google,
        ] {
            let parsed: ModelProvider = provider.to_string().parse().unwrap();
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn descriptor_is_provider_slash_model() {
        let model = ModelSettings::default();
        assert_eq!(model.descriptor(), "anthropic/claude-3-7-sonnet-20250219");
    }

    #[test]
    fn key_env_var_per_provider() {
        assert_eq!(ModelProvider::Anthropic.key_env_var(), "ANTHROPIC_API_KEY");
        assert_eq!(ModelProvider::Google.key_env_var(), "GEMINI_API_KEY");
    }

    #[test]
    fn select_provider_rereads_the_key() {
        let mut model = ModelSettings::default();
        model.select_provider(ModelProvider::Google);
        assert_eq!(model.provider, ModelProvider::Google);
        // The key now tracks GEMINI_API_KEY, present or not.
        assert_eq!(
            model.api_key.is_some(),
            std::env::var("GEMINI_API_KEY").is_ok()
        );
    }
}
