//! Live console rendering of the run's message stream.

use std::fmt::Write as _;

use tokio::sync::mpsc;

use quarry_core::messages::{ChatMessage, MultiModalPart};
use quarry_core::tokens::TokenTotals;

const RESULT_PREVIEW_CHARS: usize = 100;

/// Drains the stream the controller feeds and prints each message in
/// arrival order. Nothing is filtered or reordered; tool traffic is just
/// rendered more compactly unless `verbose_tools` is set.
pub struct ConsoleRenderer {
    verbose_tools: bool,
}

impl ConsoleRenderer {
    pub fn new(verbose_tools: bool) -> Self {
        Self { verbose_tools }
    }

    /// Print until the sending side closes the channel, then return the
    /// token totals accumulated from every message that carried usage.
    pub async fn render(self, mut stream: mpsc::Receiver<ChatMessage>) -> TokenTotals {
        let mut totals = TokenTotals::default();
        while let Some(msg) = stream.recv().await {
            if let Some(usage) = msg.usage() {
                totals.add(usage);
            }
            println!("{}", self.format(&msg));
        }
        totals
    }

    fn format(&self, msg: &ChatMessage) -> String {
        match msg {
            ChatMessage::Text(m) => {
                format!("\n---------- {} ----------\n{}", m.source, m.content)
            }
            ChatMessage::MultiModal(m) => {
                let mut out = format!("\n---------- {} ----------", m.source);
                for part in &m.content {
                    match part {
                        MultiModalPart::Text { text } => {
                            let _ = write!(out, "\n{text}");
                        }
                        MultiModalPart::Image { mime_type, .. } => {
                            let _ = write!(out, "\n[image: {mime_type}]");
                        }
                    }
                }
                out
            }
            ChatMessage::ToolCallRequest(m) => {
                let mut out = String::new();
                for call in &m.calls {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    if self.verbose_tools {
                        let _ = write!(out, "  -> {} {}", call.name, call.arguments);
                    } else {
                        let _ = write!(out, "  -> {}", call.name);
                    }
                }
                out
            }
            ChatMessage::ToolCallResult(m) => {
                let mut out = String::new();
                for result in &m.results {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    let marker = if result.is_error { "[error] " } else { "" };
                    if self.verbose_tools {
                        let _ = write!(out, "  <- {}: {}{}", result.name, marker, result.content);
                    } else {
                        let _ = write!(
                            out,
                            "  <- {}: {}{}",
                            result.name,
                            marker,
                            preview(&result.content)
                        );
                    }
                }
                out
            }
            ChatMessage::Handoff(m) => {
                format!(
                    "\n---------- {} -> {} ----------\n{}",
                    m.source, m.target, m.content
                )
            }
            ChatMessage::Stop(m) => format!("\n========== {} ==========", m.content),
        }
    }
}

/// First line of the content, capped so a large file dump stays one line.
fn preview(content: &str) -> String {
    let first = content.lines().next().unwrap_or("");
    let mut out: String = first.chars().take(RESULT_PREVIEW_CHARS).collect();
    if out.len() < first.len() || content.lines().nth(1).is_some() {
        out.push_str("...");
    }
    out
}
