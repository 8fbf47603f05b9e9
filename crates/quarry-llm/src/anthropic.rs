use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use quarry_core::errors::ProviderError;
use quarry_core::llm::{ChatProvider, ChatRequest, ChatResponse};

use crate::converter;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
// Generous: a single completion over a long analysis context can take minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Anthropic Messages API backend.
#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = converter::build_anthropic_body(request, &self.model);

        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
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

        converter::parse_anthropic_response(&body)
    }
}
