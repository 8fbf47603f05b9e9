//! Team-level message vocabulary: everything the orchestrator emits on its
//! stream and persists in the run transcript.

use serde::{Deserialize, Serialize};

use crate::ids::ToolCallId;
use crate::tokens::TokenUsage;

/// Name under which the human operator participates in handoffs.
pub const USER_TARGET: &str = "user";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatMessage {
    #[serde(rename = "text")]
    Text(TextMessage),
    #[serde(rename = "multi_modal")]
    MultiModal(MultiModalMessage),
    #[serde(rename = "tool_call_request")]
    ToolCallRequest(ToolCallRequestMessage),
    #[serde(rename = "tool_call_result")]
    ToolCallResult(ToolCallResultMessage),
    #[serde(rename = "handoff")]
    Handoff(HandoffMessage),
    #[serde(rename = "stop")]
    Stop(StopMessage),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextMessage {
    pub source: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiModalMessage {
    pub source: String,
    pub content: Vec<MultiModalPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MultiModalPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { mime_type: String, data: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRequestMessage {
    pub source: String,
    pub calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallResultMessage {
    pub source: String,
    pub results: Vec<ToolCallOutcome>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub call_id: ToolCallId,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandoffMessage {
    pub source: String,
    pub target: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopMessage {
    pub source: String,
    pub content: String,
}

// --- Convenience constructors ---

impl ChatMessage {
    pub fn text(source: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Text(TextMessage {
            source: source.into(),
            content: content.into(),
            usage: None,
        })
    }

    pub fn handoff(
        source: impl Into<String>,
        target: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ChatMessage::Handoff(HandoffMessage {
            source: source.into(),
            target: target.into(),
            content: content.into(),
            usage: None,
        })
    }

    pub fn tool_call_request(source: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        ChatMessage::ToolCallRequest(ToolCallRequestMessage {
            source: source.into(),
            calls,
            usage: None,
        })
    }

    pub fn tool_call_result(source: impl Into<String>, results: Vec<ToolCallOutcome>) -> Self {
        ChatMessage::ToolCallResult(ToolCallResultMessage {
            source: source.into(),
            results,
        })
    }

    pub fn stop(source: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Stop(StopMessage {
            source: source.into(),
            content: content.into(),
        })
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        match &mut self {
            ChatMessage::Text(m) => m.usage = Some(usage),
            ChatMessage::MultiModal(m) => m.usage = Some(usage),
            ChatMessage::ToolCallRequest(m) => m.usage = Some(usage),
            ChatMessage::Handoff(m) => m.usage = Some(usage),
            ChatMessage::ToolCallResult(_) | ChatMessage::Stop(_) => {}
        }
        self
    }

    /// The agent (or "user") this message originated from.
    pub fn source(&self) -> &str {
        match self {
            ChatMessage::Text(m) => &m.source,
            ChatMessage::MultiModal(m) => &m.source,
            ChatMessage::ToolCallRequest(m) => &m.source,
            ChatMessage::ToolCallResult(m) => &m.source,
            ChatMessage::Handoff(m) => &m.source,
            ChatMessage::Stop(m) => &m.source,
        }
    }

    /// Whether this message ends an agent's turn. Tool-call requests and
    /// results are intra-turn events; stop notices come from the orchestrator
    /// itself, not from a turn.
    pub fn ends_turn(&self) -> bool {
        matches!(
            self,
            ChatMessage::Text(_) | ChatMessage::MultiModal(_) | ChatMessage::Handoff(_)
        )
    }

    /// Free-text view of the payload, used for sentinel matching and
    /// transcript rendering. Tool events and stop notices yield nothing.
    pub fn content_text(&self) -> Option<String> {
        match self {
            ChatMessage::Text(m) => Some(m.content.clone()),
            ChatMessage::Handoff(m) => Some(m.content.clone()),
            ChatMessage::MultiModal(m) => {
                let text: Vec<&str> = m
                    .content
                    .iter()
                    .filter_map(|p| match p {
                        MultiModalPart::Text { text } => Some(text.as_str()),
                        MultiModalPart::Image { .. } => None,
                    })
                    .collect();
                Some(text.join("\n"))
            }
            ChatMessage::ToolCallRequest(_)
            | ChatMessage::ToolCallResult(_)
            | ChatMessage::Stop(_) => None,
        }
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        match self {
            ChatMessage::Text(m) => m.usage.as_ref(),
            ChatMessage::MultiModal(m) => m.usage.as_ref(),
            ChatMessage::ToolCallRequest(m) => m.usage.as_ref(),
            ChatMessage::Handoff(m) => m.usage.as_ref(),
            ChatMessage::ToolCallResult(_) | ChatMessage::Stop(_) => None,
        }
    }
}
