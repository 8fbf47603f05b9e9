//! Wire-format conversion between the provider-neutral [`ChatRequest`] /
//! [`ChatResponse`] types and the two JSON dialects we speak: the Anthropic
//! Messages API and OpenAI-style chat completions (OpenAI, Azure, Gemini's
//! compatibility endpoint).

use serde_json::{json, Value};

use quarry_core::errors::ProviderError;
use quarry_core::ids::ToolCallId;
use quarry_core::llm::{
    AssistantContent, AssistantMessage, ChatRequest, ChatResponse, FinishReason, LlmMessage,
    ToolCallBlock, ToolResultMessage, UserContent, UserMessage,
};
use quarry_core::tokens::TokenUsage;

/// Build the Anthropic Messages API request body.
pub fn build_anthropic_body(request: &ChatRequest, model: &str) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens,
    });

    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    if !request.system.is_empty() {
        body["system"] = json!(request.system);
    }

    body["messages"] = json!(request
        .messages
        .iter()
        .map(anthropic_message)
        .collect::<Vec<_>>());

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters_schema,
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    body
}

fn anthropic_message(msg: &LlmMessage) -> Value {
    match msg {
        LlmMessage::User(user) => anthropic_user_message(user),
        LlmMessage::Assistant(asst) => anthropic_assistant_message(asst),
        LlmMessage::ToolResult(tr) => anthropic_tool_result(tr),
    }
}

fn anthropic_user_message(msg: &UserMessage) -> Value {
    let content: Vec<Value> = msg
        .content
        .iter()
        .map(|c| match c {
            UserContent::Text { text } => json!({"type": "text", "text": text}),
            UserContent::Image { mime_type, data } => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": mime_type, "data": data}
            }),
        })
        .collect();

    json!({"role": "user", "content": content})
}

fn anthropic_assistant_message(msg: &AssistantMessage) -> Value {
    let content: Vec<Value> = msg
        .content
        .iter()
        .map(|c| match c {
            AssistantContent::Text { text } => json!({"type": "text", "text": text}),
            AssistantContent::ToolCall(tc) => json!({
                "type": "tool_use",
                "id": tc.id.as_str(),
                "name": tc.name,
                "input": tc.arguments,
            }),
        })
        .collect();

    json!({"role": "assistant", "content": content})
}

// Tool results ride in a user-role message on the Anthropic wire.
fn anthropic_tool_result(msg: &ToolResultMessage) -> Value {
    json!({
        "role": "user",
        "content": [{
            "type": "tool_result",
            "tool_use_id": msg.tool_call_id.as_str(),
            "content": [{"type": "text", "text": msg.content}],
            "is_error": msg.is_error,
        }]
    })
}

/// Parse an Anthropic Messages API response body.
pub fn parse_anthropic_response(body: &Value) -> Result<ChatResponse, ProviderError> {
    let blocks = body["content"].as_array().ok_or_else(|| {
        ProviderError::MalformedResponse("response has no content array".into())
    })?;

    let mut content = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                let text = block["text"].as_str().unwrap_or_default().to_string();
                content.push(AssistantContent::Text { text });
            }
            Some("tool_use") => {
                let id = block["id"].as_str().ok_or_else(|| {
                    ProviderError::MalformedResponse("tool_use block missing id".into())
                })?;
                let name = block["name"].as_str().ok_or_else(|| {
                    ProviderError::MalformedResponse("tool_use block missing name".into())
                })?;
                content.push(AssistantContent::ToolCall(ToolCallBlock {
                    id: ToolCallId::from_raw(id),
                    name: name.to_string(),
                    arguments: block["input"].clone(),
                }));
            }
            // Unknown block kinds (e.g. server-side thinking) are skipped.
            _ => {}
        }
    }

    let usage = TokenUsage::new(
        body["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
        body["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
    );

    let finish_reason = match body["stop_reason"].as_str() {
        Some("tool_use") => FinishReason::ToolUse,
        Some("max_tokens") => FinishReason::MaxTokens,
        _ => FinishReason::EndTurn,
    };

    Ok(ChatResponse {
        content,
        usage,
        finish_reason,
    })
}

/// Build an OpenAI chat-completions request body. The same shape serves
/// OpenAI, Azure OpenAI, and Gemini's compatibility endpoint.
pub fn build_openai_body(request: &ChatRequest, model: &str) -> Value {
    let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.is_empty() {
        messages.push(json!({"role": "system", "content": request.system}));
    }
    for msg in &request.messages {
        messages.push(openai_message(msg));
    }

    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "messages": messages,
    });

    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    body
}

fn openai_message(msg: &LlmMessage) -> Value {
    match msg {
        LlmMessage::User(user) => openai_user_message(user),
        LlmMessage::Assistant(asst) => openai_assistant_message(asst),
        // No error flag on this wire; failure text travels in the content.
        LlmMessage::ToolResult(tr) => json!({
            "role": "tool",
            "tool_call_id": tr.tool_call_id.as_str(),
            "content": tr.content,
        }),
    }
}

fn openai_user_message(msg: &UserMessage) -> Value {
    let plain_text = msg
        .content
        .iter()
        .all(|c| matches!(c, UserContent::Text { .. }));

    if plain_text {
        let text: Vec<&str> = msg
            .content
            .iter()
            .filter_map(|c| match c {
                UserContent::Text { text } => Some(text.as_str()),
                UserContent::Image { .. } => None,
            })
            .collect();
        return json!({"role": "user", "content": text.join("\n")});
    }

    let parts: Vec<Value> = msg
        .content
        .iter()
        .map(|c| match c {
            UserContent::Text { text } => json!({"type": "text", "text": text}),
            UserContent::Image { mime_type, data } => json!({
                "type": "image_url",
                "image_url": {"url": format!("data:{mime_type};base64,{data}")}
            }),
        })
        .collect();

    json!({"role": "user", "content": parts})
}

fn openai_assistant_message(msg: &AssistantMessage) -> Value {
    let text: Vec<&str> = msg
        .content
        .iter()
        .filter_map(|c| match c {
            AssistantContent::Text { text } => Some(text.as_str()),
            AssistantContent::ToolCall(_) => None,
        })
        .collect();

    let tool_calls: Vec<Value> = msg
        .content
        .iter()
        .filter_map(|c| match c {
            AssistantContent::ToolCall(tc) => Some(json!({
                "id": tc.id.as_str(),
                "type": "function",
                "function": {
                    "name": tc.name,
                    "arguments": tc.arguments.to_string(),
                }
            })),
            AssistantContent::Text { .. } => None,
        })
        .collect();

    let mut out = json!({"role": "assistant"});
    out["content"] = if text.is_empty() {
        Value::Null
    } else {
        json!(text.join("\n"))
    };
    if !tool_calls.is_empty() {
        out["tool_calls"] = json!(tool_calls);
    }
    out
}

/// Parse an OpenAI chat-completions response body.
pub fn parse_openai_response(body: &Value) -> Result<ChatResponse, ProviderError> {
    let choice = body["choices"].get(0).ok_or_else(|| {
        ProviderError::MalformedResponse("response has no choices".into())
    })?;
    let message = &choice["message"];

    let mut content = Vec::new();
    if let Some(text) = message["content"].as_str() {
        if !text.is_empty() {
            content.push(AssistantContent::Text {
                text: text.to_string(),
            });
        }
    }
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"].as_str().ok_or_else(|| {
                ProviderError::MalformedResponse("tool call missing id".into())
            })?;
            let name = call["function"]["name"].as_str().ok_or_else(|| {
                ProviderError::MalformedResponse("tool call missing function name".into())
            })?;
            // Arguments arrive as a JSON-encoded string on this wire.
            let raw_args = call["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments = serde_json::from_str(raw_args)
                .unwrap_or_else(|_| Value::String(raw_args.to_string()));
            content.push(AssistantContent::ToolCall(ToolCallBlock {
                id: ToolCallId::from_raw(id),
                name: name.to_string(),
                arguments,
            }));
        }
    }

    let usage = TokenUsage::new(
        body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    );

    let finish_reason = match choice["finish_reason"].as_str() {
        Some("tool_calls") => FinishReason::ToolUse,
        Some("length") => FinishReason::MaxTokens,
        _ => FinishReason::EndTurn,
    };

    Ok(ChatResponse {
        content,
        usage,
        finish_reason,
    })
}
