//! The conversation agent: one name, one system prompt, one provider, one
//! tool surface. An agent keeps a private LLM context across turns; the
//! orchestrator only ever sees team-level [`ChatMessage`]s.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{error, instrument, warn};

use quarry_core::llm::{
    ChatProvider, ChatRequest, LlmMessage, ToolCallBlock, UserContent, UserMessage,
};
use quarry_core::messages::{ChatMessage, MultiModalPart, ToolCall, ToolCallOutcome, USER_TARGET};
use quarry_core::tools::{ToolContext, ToolDefinition};
use quarry_sandbox::CodeExecutor;

use crate::error::EngineError;
use crate::prompts;
use crate::registry::ToolRegistry;
use crate::tools::{analysis_registry, ideation_registry};

/// Longer than the sandbox's own execution timeout so code failures surface
/// with their specific message instead of a generic tool timeout.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_MAX_TOOL_ROUNDS: u32 = 30;
const DEFAULT_MAX_TOKENS: u32 = 4096;
const TRANSFER_PREFIX: &str = "transfer_to_";

/// Everything one agent produced during a single turn.
#[derive(Debug)]
pub struct AgentTurn {
    /// Intra-turn tool events, in emission order.
    pub events: Vec<ChatMessage>,
    /// The message that ended the turn: plain text or a handoff.
    pub terminal: ChatMessage,
}

pub struct Agent {
    name: String,
    system_prompt: String,
    provider: Arc<dyn ChatProvider>,
    tools: ToolRegistry,
    handoff_targets: Vec<String>,
    max_tokens: u32,
    tool_timeout: Duration,
    max_tool_rounds: u32,
    context: Vec<LlmMessage>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        provider: Arc<dyn ChatProvider>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            provider,
            tools,
            handoff_targets: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            context: Vec::new(),
        }
    }

    /// Peers (or "user") this agent may hand the conversation to. Each target
    /// becomes a `transfer_to_<target>` pseudo-tool.
    pub fn with_handoff_targets(mut self, targets: Vec<String>) -> Self {
        self.handoff_targets = targets;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The private LLM context accumulated so far.
    pub fn context(&self) -> &[LlmMessage] {
        &self.context
    }

    /// Take a turn: fold `incoming` team messages into the private context,
    /// then loop provider calls and tool executions until the model produces
    /// a message with no tool calls or asks for a handoff. Every produced
    /// message is mirrored onto `stream` as it happens.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub async fn respond(
        &mut self,
        incoming: &[ChatMessage],
        ctx: &ToolContext,
        stream: &mpsc::Sender<ChatMessage>,
    ) -> Result<AgentTurn, EngineError> {
        self.fold_incoming(incoming);

        let mut events: Vec<ChatMessage> = Vec::new();

        for _ in 0..self.max_tool_rounds {
            let request = ChatRequest::new(self.system_prompt.clone(), self.context.clone())
                .with_tools(self.tool_definitions())
                .with_max_tokens(self.max_tokens);
            let response = self.provider.complete(&request).await?;
            let usage = response.usage;

            if !response.has_tool_calls() {
                let text = response.text();
                self.context.push(response.into_assistant_message());
                let terminal = ChatMessage::text(&self.name, text).with_usage(usage);
                send(stream, terminal.clone()).await;
                return Ok(AgentTurn { events, terminal });
            }

            let calls: Vec<ToolCallBlock> = response.tool_calls().into_iter().cloned().collect();
            self.context.push(response.into_assistant_message());

            let request_msg = ChatMessage::tool_call_request(
                &self.name,
                calls
                    .iter()
                    .map(|c| ToolCall {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    })
                    .collect(),
            )
            .with_usage(usage);
            send(stream, request_msg.clone()).await;
            events.push(request_msg);

            // The first transfer in the round wins; nothing else executes.
            let transfer: Option<(usize, String)> = calls
                .iter()
                .enumerate()
                .find_map(|(i, c)| self.transfer_target(c).map(|t| (i, t.to_string())));
            if let Some((idx, target)) = transfer {
                let payload = calls[idx]
                    .arguments
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();

                let mut outcomes = Vec::with_capacity(calls.len());
                for (i, call) in calls.iter().enumerate() {
                    let content = if i == idx {
                        format!("Transferring to {target}")
                    } else {
                        format!("Skipped: turn ended with a transfer to {target}")
                    };
                    self.context
                        .push(LlmMessage::tool_result(call.id.clone(), content.clone(), false));
                    outcomes.push(ToolCallOutcome {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        content,
                        is_error: false,
                    });
                }
                let result_msg = ChatMessage::tool_call_result(&self.name, outcomes);
                send(stream, result_msg.clone()).await;
                events.push(result_msg);

                let terminal = ChatMessage::handoff(&self.name, &target, payload);
                send(stream, terminal.clone()).await;
                return Ok(AgentTurn { events, terminal });
            }

            // Plain tools run sequentially, in request order.
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in &calls {
                let outcome = self.run_tool(call, ctx).await;
                let context_content = if outcome.is_error {
                    format!("[error] {}", outcome.content)
                } else {
                    outcome.content.clone()
                };
                self.context.push(LlmMessage::tool_result(
                    call.id.clone(),
                    context_content,
                    outcome.is_error,
                ));
                outcomes.push(outcome);
            }
            let result_msg = ChatMessage::tool_call_result(&self.name, outcomes);
            send(stream, result_msg.clone()).await;
            events.push(result_msg);
        }

        Err(EngineError::ToolRoundsExceeded {
            agent: self.name.clone(),
            limit: self.max_tool_rounds,
        })
    }

    /// Fold team messages produced since this agent's previous turn into its
    /// private context, as user-role messages prefixed with their source.
    /// Other agents' tool traffic and stop notices stay out.
    fn fold_incoming(&mut self, incoming: &[ChatMessage]) {
        for msg in incoming {
            if msg.source() == self.name {
                continue;
            }
            match msg {
                ChatMessage::Text(m) => {
                    self.context
                        .push(LlmMessage::user_text(format!("{}: {}", m.source, m.content)));
                }
                ChatMessage::Handoff(h) => {
                    if !h.content.is_empty() {
                        self.context
                            .push(LlmMessage::user_text(format!("{}: {}", h.source, h.content)));
                    }
                }
                ChatMessage::MultiModal(m) => {
                    let content = m
                        .content
                        .iter()
                        .map(|part| match part {
                            MultiModalPart::Text { text } => UserContent::Text {
                                text: format!("{}: {}", m.source, text),
                            },
                            MultiModalPart::Image { mime_type, data } => UserContent::Image {
                                mime_type: mime_type.clone(),
                                data: data.clone(),
                            },
                        })
                        .collect();
                    self.context.push(LlmMessage::User(UserMessage { content }));
                }
                ChatMessage::ToolCallRequest(_)
                | ChatMessage::ToolCallResult(_)
                | ChatMessage::Stop(_) => {}
            }
        }
    }

    /// Registered tools plus one `transfer_to_<target>` definition per
    /// handoff target.
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.tools.definitions();
        for target in &self.handoff_targets {
            defs.push(ToolDefinition {
                name: format!("{TRANSFER_PREFIX}{target}"),
                description: format!(
                    "Hand the conversation off to {target}. Optionally include a \
                     message describing what you need from them."
                ),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "Message passed along with the handoff"
                        }
                    }
                }),
            });
        }
        defs
    }

    fn transfer_target(&self, call: &ToolCallBlock) -> Option<&str> {
        let target = call.name.strip_prefix(TRANSFER_PREFIX)?;
        self.handoff_targets
            .iter()
            .find(|t| t.as_str() == target)
            .map(|t| t.as_str())
    }

    /// Run one tool call. Failures, panics, and timeouts all come back as
    /// error-flagged outcomes; nothing here ends the turn.
    async fn run_tool(&self, call: &ToolCallBlock, ctx: &ToolContext) -> ToolCallOutcome {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolCallOutcome {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content: format!("Unknown tool: {}", call.name),
                is_error: true,
            };
        };

        let result = tokio::time::timeout(
            self.tool_timeout,
            std::panic::AssertUnwindSafe(tool.execute(call.arguments.clone(), ctx)).catch_unwind(),
        )
        .await;

        let (content, is_error) = match result {
            Ok(Ok(Ok(output))) => (output.content, output.is_error),
            Ok(Ok(Err(e))) => (e.to_string(), true),
            Ok(Err(panic)) => {
                error!(tool = %call.name, panic = %panic_message(panic.as_ref()), "tool panicked");
                ("Internal error: tool crashed".to_string(), true)
            }
            Err(_) => {
                warn!(tool = %call.name, timeout_secs = self.tool_timeout.as_secs(), "tool timed out");
                (
                    format!("Tool timed out after {}s", self.tool_timeout.as_secs()),
                    true,
                )
            }
        };

        ToolCallOutcome {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content,
            is_error,
        }
    }
}

async fn send(stream: &mpsc::Sender<ChatMessage>, msg: ChatMessage) {
    if stream.send(msg).await.is_err() {
        warn!("message stream closed, dropping message");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    }
}

/// The analysis agent: explores the data with sandboxed Python, inspects
/// charts, and writes the four analysis deliverables.
pub fn analysis_agent(
    provider: Arc<dyn ChatProvider>,
    executor: Arc<dyn CodeExecutor>,
    max_tokens: u32,
) -> Agent {
    Agent::new(
        prompts::ANALYSIS_AGENT,
        prompts::ANALYSIS_SYSTEM_PROMPT,
        provider.clone(),
        analysis_registry(executor, provider),
    )
    .with_handoff_targets(vec![
        prompts::IDEATION_AGENT.to_string(),
        USER_TARGET.to_string(),
    ])
    .with_max_tokens(max_tokens)
}

/// The ideation agent: reads the analysis deliverables and writes the
/// technical approaches and the business report.
pub fn ideation_agent(provider: Arc<dyn ChatProvider>, max_tokens: u32) -> Agent {
    Agent::new(
        prompts::IDEATION_AGENT,
        prompts::IDEATION_SYSTEM_PROMPT,
        provider,
        ideation_registry(),
    )
    .with_handoff_targets(vec![
        prompts::ANALYSIS_AGENT.to_string(),
        USER_TARGET.to_string(),
    ])
    .with_max_tokens(max_tokens)
}
