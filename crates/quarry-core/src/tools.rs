use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::ids::RunId;

/// The only two filesystem roots agents may touch. Every file tool takes a
/// `root` argument naming one of them; anything else is rejected at
/// resolution, before any I/O happens.
#[derive(Clone, Debug)]
pub struct WorkspaceRoots {
    pub data: PathBuf,
    pub outputs: PathBuf,
}

impl WorkspaceRoots {
    pub fn new(data: impl Into<PathBuf>, outputs: impl Into<PathBuf>) -> Self {
        Self {
            data: data.into(),
            outputs: outputs.into(),
        }
    }

    pub fn dir_for(&self, root: &str) -> Result<&Path, ToolError> {
        match root {
            "data" => Ok(&self.data),
            "outputs" => Ok(&self.outputs),
            other => Err(ToolError::InvalidArguments(format!(
                "unknown root '{other}' (expected 'data' or 'outputs')"
            ))),
        }
    }

    /// Resolve a relative path inside a named root. Absolute paths and any
    /// path that would escape the root are rejected.
    pub fn resolve(&self, root: &str, path: &str) -> Result<PathBuf, ToolError> {
        let base = self.dir_for(root)?;
        let relative = Path::new(path);
        if relative.is_absolute() {
            return Err(ToolError::InvalidArguments(format!(
                "path must be relative to the {root} root, got absolute path '{path}'"
            )));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(ToolError::InvalidArguments(format!(
                        "path '{path}' escapes the {root} root"
                    )))
                }
            }
        }
        Ok(base.join(relative))
    }
}

/// Per-run context handed to every tool execution.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub run_id: RunId,
    pub agent: String,
    pub roots: WorkspaceRoots,
    pub abort: CancellationToken,
}

/// Tool definition sent to the LLM.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Result of one tool execution. Failures an agent can react to are encoded
/// as `is_error = true` output, not as `ToolError`.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>, duration: Duration) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            duration,
        }
    }

    pub fn error(content: impl Into<String>, duration: Duration) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            duration,
        }
    }
}

/// Trait all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the LLM.
    fn name(&self) -> &str;

    /// Human-readable description for the LLM.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext)
        -> Result<ToolOutput, ToolError>;

    /// Definition to send to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
