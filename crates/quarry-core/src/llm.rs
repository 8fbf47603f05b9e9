//! Provider-boundary types: the request/response surface shared by every
//! chat-completion backend, plus each agent's private conversation context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::ids::ToolCallId;
use crate::tokens::TokenUsage;
use crate::tools::ToolDefinition;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum LlmMessage {
    #[serde(rename = "user")]
    User(UserMessage),
    #[serde(rename = "assistant")]
    Assistant(AssistantMessage),
    #[serde(rename = "tool_result")]
    ToolResult(ToolResultMessage),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: Vec<UserContent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { mime_type: String, data: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<AssistantContent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssistantContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallBlock),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallBlock {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub tool_call_id: ToolCallId,
    pub content: String,
    pub is_error: bool,
}

impl LlmMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        LlmMessage::User(UserMessage {
            content: vec![UserContent::Text { text: text.into() }],
        })
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        LlmMessage::Assistant(AssistantMessage {
            content: vec![AssistantContent::Text { text: text.into() }],
        })
    }

    pub fn tool_result(tool_call_id: ToolCallId, content: impl Into<String>, is_error: bool) -> Self {
        LlmMessage::ToolResult(ToolResultMessage {
            tool_call_id,
            content: content.into(),
            is_error,
        })
    }
}

/// One complete (non-streaming) completion request.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, messages: Vec<LlmMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Why the provider stopped generating.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[derive(Clone, Debug)]
pub struct ChatResponse {
    pub content: Vec<AssistantContent>,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                AssistantContent::Text { text } => Some(text.as_str()),
                AssistantContent::ToolCall(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> Vec<&ToolCallBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                AssistantContent::ToolCall(call) => Some(call),
                AssistantContent::Text { .. } => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, AssistantContent::ToolCall(_)))
    }

    pub fn into_assistant_message(self) -> LlmMessage {
        LlmMessage::Assistant(AssistantMessage {
            content: self.content,
        })
    }
}

/// Trait implemented by each chat-completion backend (Anthropic, OpenAI,
/// Azure, Gemini) and by the test mock.
#[async_trait]
pub trait ChatProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// `<provider>/<model>` descriptor, as recorded in run manifests.
    fn descriptor(&self) -> String {
        format!("{}/{}", self.name(), self.model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_use_response() -> ChatResponse {
        ChatResponse {
            content: vec![
                AssistantContent::Text {
                    text: "running it now".into(),
                },
                AssistantContent::ToolCall(ToolCallBlock {
                    id: ToolCallId::from_raw("call_1"),
                    name: "execute_code".into(),
                    arguments: serde_json::json!({"code": "print(42)"}),
                }),
            ],
            usage: TokenUsage::new(100, 20),
            finish_reason: FinishReason::ToolUse,
        }
    }

    #[test]
    fn response_text_skips_tool_calls() {
        assert_eq!(tool_use_response().text(), "running it now");
    }

    #[test]
    fn response_tool_call_extraction() {
        let response = tool_use_response();
        assert!(response.has_tool_calls());
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "execute_code");
    }

    #[test]
    fn llm_message_serde_roundtrip() {
        let messages = vec![
            LlmMessage::user_text("look at the data"),
            LlmMessage::assistant_text("done"),
            LlmMessage::tool_result(ToolCallId::from_raw("call_9"), "output", true),
            LlmMessage::User(UserMessage {
                content: vec![UserContent::Image {
                    mime_type: "image/png".into(),
                    data: "aGk=".into(),
                }],
            }),
        ];
        for msg in &messages {
            let json = serde_json::to_string(msg).unwrap();
            let parsed: LlmMessage = serde_json::from_str(&json).unwrap();
            let json2 = serde_json::to_string(&parsed).unwrap();
            assert_eq!(json, json2);
        }
    }

    #[test]
    fn finish_reason_serde() {
        let json = serde_json::to_string(&FinishReason::ToolUse).unwrap();
        assert_eq!(json, r#""tool_use""#);
    }
}
