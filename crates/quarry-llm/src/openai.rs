use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use quarry_core::errors::ProviderError;
use quarry_core::llm::{ChatProvider, ChatRequest, ChatResponse};

use crate::converter;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_COMPAT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// How the API key rides on the request. OpenAI and Gemini use a bearer
/// token; Azure wants a bare `api-key` header.
#[derive(Clone, Copy, Debug)]
enum AuthStyle {
    Bearer,
    ApiKeyHeader,
}

/// Chat-completions backend for every provider speaking the OpenAI wire
/// format: OpenAI itself, Azure OpenAI deployments, and Gemini through its
/// OpenAI-compatibility endpoint.
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    client: Client,
    provider_name: &'static str,
    api_key: SecretString,
    model: String,
    url: String,
    auth: AuthStyle,
}

impl OpenAiCompatProvider {
    fn build(
        provider_name: &'static str,
        api_key: SecretString,
        model: String,
        url: String,
        auth: AuthStyle,
    ) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            provider_name,
            api_key,
            model,
            url,
            auth,
        }
    }

    pub fn openai(api_key: SecretString, model: impl Into<String>) -> Self {
        Self::build(
            "openai",
            api_key,
            model.into(),
            OPENAI_URL.to_string(),
            AuthStyle::Bearer,
        )
    }

    /// Azure addresses the deployment in the path and the API version in the
    /// query string; the model field still rides in the body.
    pub fn azure(
        api_key: SecretString,
        model: impl Into<String>,
        endpoint: &str,
        api_version: &str,
    ) -> Self {
        let model = model.into();
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            model,
            api_version
        );
        Self::build("azure", api_key, model, url, AuthStyle::ApiKeyHeader)
    }

    pub fn google(api_key: SecretString, model: impl Into<String>) -> Self {
        Self::build(
            "google",
            api_key,
            model.into(),
            GEMINI_COMPAT_URL.to_string(),
            AuthStyle::Bearer,
        )
    }

    #[cfg(test)]
    fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(provider = self.provider_name, model = %self.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = converter::build_openai_body(request, &self.model);

        let mut req = self.client.post(&self.url);
        req = match self.auth {
            AuthStyle::Bearer => req.header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            ),
            AuthStyle::ApiKeyHeader => req.header("api-key", self.api_key.expose_secret()),
        };

        let resp = req
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(REQUEST_TIMEOUT)
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        converter::parse_openai_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_properties() {
        let provider = OpenAiCompatProvider::openai(SecretString::from("k"), "gpt-4o");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o");
        assert_eq!(provider.descriptor(), "openai/gpt-4o");
        assert_eq!(provider.url(), OPENAI_URL);
    }

    #[test]
    fn azure_url_embeds_deployment_and_version() {
        let provider = OpenAiCompatProvider::azure(
            SecretString::from("k"),
            "gpt-4o-mini",
            "https://example.openai.azure.com/",
            "2024-06-01",
        );
        assert_eq!(provider.name(), "azure");
        assert_eq!(
            provider.url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn google_uses_compat_endpoint() {
        let provider = OpenAiCompatProvider::google(SecretString::from("k"), "gemini-2.0-flash");
        assert_eq!(provider.name(), "google");
        assert_eq!(provider.url(), GEMINI_COMPAT_URL);
    }
}
