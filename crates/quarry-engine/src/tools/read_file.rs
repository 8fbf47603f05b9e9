use std::fmt::Write as _;
use std::time::Instant;

use async_trait::async_trait;

use quarry_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

use crate::tools::strip_mount_prefix;

/// Most lines a single call returns.
const MAX_LINES: usize = 1000;
/// Longest line returned before truncation.
const MAX_LINE_CHARS: usize = 2000;

/// Reads a text file from a workspace root with line numbers, supporting
/// offset/limit windows over large files.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from a workspace root. Returns numbered lines; use \
         offset and limit to page through files longer than 1000 lines."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["root", "path"],
            "properties": {
                "root": {
                    "type": "string",
                    "enum": ["data", "outputs"],
                    "description": "Workspace root to read from"
                },
                "path": {
                    "type": "string",
                    "description": "File path relative to the root"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-based line number to start from (default 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum lines to return (default and cap 1000)"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let root = args["root"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("root is required".to_string()))?;
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("path is required".to_string()))?;
        let offset = args["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = (args["limit"].as_u64().unwrap_or(MAX_LINES as u64) as usize).min(MAX_LINES);

        let path = strip_mount_prefix(root, path);
        let full = ctx.roots.resolve(root, path)?;

        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolOutput::error(
                    format!("Failed to read {root}/{path}: {e}"),
                    start.elapsed(),
                ))
            }
        };

        if content.is_empty() {
            return Ok(ToolOutput::ok("(empty file)", start.elapsed()));
        }

        let lines: Vec<&str> = content.lines().collect();
        let begin = (offset - 1).min(lines.len());
        let end = (begin + limit).min(lines.len());

        let mut out = String::new();
        for (idx, line) in lines[begin..end].iter().enumerate() {
            let shown: String = if line.chars().count() > MAX_LINE_CHARS {
                let mut truncated: String = line.chars().take(MAX_LINE_CHARS).collect();
                truncated.push_str("...");
                truncated
            } else {
                (*line).to_string()
            };
            let _ = writeln!(out, "{:>6}\t{}", begin + idx + 1, shown);
        }
        if end < lines.len() {
            let _ = write!(out, "({} more lines; continue with offset {})", lines.len() - end, end + 1);
        }

        Ok(ToolOutput::ok(out, start.elapsed()))
    }
}
