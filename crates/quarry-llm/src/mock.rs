use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use quarry_core::errors::ProviderError;
use quarry_core::ids::ToolCallId;
use quarry_core::llm::{
    AssistantContent, ChatProvider, ChatRequest, ChatResponse, FinishReason, ToolCallBlock,
};
use quarry_core::tokens::TokenUsage;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Debug)]
pub enum MockResponse {
    /// Return a complete response.
    Response(ChatResponse),
    /// Return an error from the complete() call itself.
    Error(ProviderError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// Convenience: a plain text completion.
    pub fn text(text: &str) -> Self {
        Self::Response(ChatResponse {
            content: vec![AssistantContent::Text { text: text.into() }],
            usage: TokenUsage::default(),
            finish_reason: FinishReason::EndTurn,
        })
    }

    /// Convenience: a completion requesting one tool call.
    pub fn tool_call(name: &str, arguments: Value) -> Self {
        Self::Response(ChatResponse {
            content: vec![AssistantContent::ToolCall(ToolCallBlock {
                id: ToolCallId::new(),
                name: name.into(),
                arguments,
            })],
            usage: TokenUsage::default(),
            finish_reason: FinishReason::ToolUse,
        })
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence and
/// records every request it receives.
#[derive(Debug)]
pub struct MockProvider {
    responses: Vec<MockResponse>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let Some(response) = self.responses.get(idx) else {
            return Err(ProviderError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        resolve_response(response).await
    }
}

/// Resolve a MockResponse, handling Delay by sleeping first.
/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: &MockResponse) -> Result<ChatResponse, ProviderError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Response(r) => return Ok(r.clone()),
            MockResponse::Error(e) => return Err(e.clone()),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(*duration).await;
                current = inner;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ChatRequest {
        ChatRequest::new("system prompt", vec![])
    }

    #[tokio::test]
    async fn text_response() {
        let mock = MockProvider::new(vec![MockResponse::text("hello world")]);
        let response = mock.complete(&request()).await.unwrap();
        assert_eq!(response.text(), "hello world");
        assert_eq!(response.finish_reason, FinishReason::EndTurn);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_response() {
        let mock = MockProvider::new(vec![MockResponse::tool_call(
            "execute_code",
            json!({"code": "print(1)"}),
        )]);
        let response = mock.complete(&request()).await.unwrap();
        assert!(response.has_tool_calls());
        assert_eq!(response.finish_reason, FinishReason::ToolUse);
        let calls = response.tool_calls();
        assert_eq!(calls[0].name, "execute_code");
        assert!(calls[0].id.as_str().starts_with("call_"));
    }

    #[tokio::test]
    async fn error_response() {
        let mock = MockProvider::new(vec![MockResponse::Error(
            ProviderError::AuthenticationFailed("bad".into()),
        )]);
        let result = mock.complete(&request()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sequential_responses() {
        let mock = MockProvider::new(vec![
            MockResponse::text("first"),
            MockResponse::text("second"),
        ]);

        let first = mock.complete(&request()).await.unwrap();
        assert_eq!(first.text(), "first");
        assert_eq!(mock.call_count(), 1);

        let second = mock.complete(&request()).await.unwrap();
        assert_eq!(second.text(), "second");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_responses() {
        let mock = MockProvider::new(vec![MockResponse::text("only one")]);

        let _ = mock.complete(&request()).await;
        let err = mock.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(msg) if msg.contains("call 1")));
    }

    #[tokio::test]
    async fn requests_are_recorded() {
        let mock = MockProvider::new(vec![MockResponse::text("ok")]);
        let _ = mock.complete(&request()).await;

        let seen = mock.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system, "system prompt");
    }

    #[test]
    fn provider_properties() {
        let mock = MockProvider::new(vec![]);
        assert_eq!(mock.name(), "mock");
        assert_eq!(mock.model(), "mock-model");
        assert_eq!(mock.descriptor(), "mock/mock-model");
    }

    #[tokio::test]
    async fn delayed_response() {
        let mock = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_millis(50),
            MockResponse::text("after delay"),
        )]);

        let start = std::time::Instant::now();
        let response = mock.complete(&request()).await.unwrap();
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(40),
            "Delay should have waited ~50ms, got {:?}",
            elapsed
        );
        assert_eq!(response.text(), "after delay");
    }

    #[tokio::test]
    async fn delayed_error() {
        let mock = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_millis(20),
            MockResponse::Error(ProviderError::RateLimited { retry_after: None }),
        )]);

        let result = mock.complete(&request()).await;
        match result {
            Err(ProviderError::RateLimited { .. }) => {} // expected
            Err(other) => panic!("expected RateLimited, got: {other:?}"),
            Ok(_) => panic!("expected error"),
        }
    }
}
