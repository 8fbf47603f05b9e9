use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use quarry_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

use crate::tools::strip_mount_prefix;

/// Appends to a text file in a workspace root, creating it if absent. Used
/// for building reports incrementally.
pub struct AppendFileTool;

#[async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &str {
        "append_file"
    }

    fn description(&self) -> &str {
        "Append text to a file inside a workspace root, creating the file if \
         it does not exist yet."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["root", "path", "content"],
            "properties": {
                "root": {
                    "type": "string",
                    "enum": ["data", "outputs"],
                    "description": "Workspace root containing the file"
                },
                "path": {
                    "type": "string",
                    "description": "File path relative to the root"
                },
                "content": {
                    "type": "string",
                    "description": "Text to append"
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
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("content is required".to_string()))?;

        let path = strip_mount_prefix(root, path);
        let full = ctx.roots.resolve(root, path)?;

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&full)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await
        }
        .await;

        match result {
            Ok(()) => Ok(ToolOutput::ok(
                format!("Appended {} bytes to {root}/{path}", content.len()),
                start.elapsed(),
            )),
            Err(e) => Ok(ToolOutput::error(
                format!("Failed to append to {root}/{path}: {e}"),
                start.elapsed(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tools::test_support::test_ctx;

    #[tokio::test]
    async fn appends_to_existing_file() {
        let (ctx, _data, outputs) = test_ctx("append");
        std::fs::write(outputs.join("log.md"), "first\n").unwrap();
        let tool = AppendFileTool;

        let output = tool
            .execute(
                serde_json::json!({"root": "outputs", "path": "log.md", "content": "second\n"}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(output.content, "Appended 7 bytes to outputs/log.md");
        assert_eq!(
            std::fs::read_to_string(outputs.join("log.md")).unwrap(),
            "first\nsecond\n"
        );
    }

    #[tokio::test]
    async fn creates_file_when_missing() {
        let (ctx, _data, outputs) = test_ctx("append-new");
        let tool = AppendFileTool;

        let output = tool
            .execute(
                serde_json::json!({"root": "outputs", "path": "fresh.md", "content": "hello"}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!output.is_error);
        assert_eq!(
            std::fs::read_to_string(outputs.join("fresh.md")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn rejects_unknown_root() {
        let (ctx, ..) = test_ctx("append-root");
        let tool = AppendFileTool;

        let err = tool
            .execute(
                serde_json::json!({"root": "scratch", "path": "a.md", "content": "x"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown root"));
    }
}
